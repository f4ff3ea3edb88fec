//! Fallback chain construction.
//!
//! Records point at each other through `fallback_id`, which makes the record
//! set an untrusted directed graph: authors can (and do) build self-loops and
//! mutual cycles. The builder walks that graph iteratively from a start id and
//! materializes the candidates eligible for one document into an immutable
//! [`ChainDescriptor`].
//!
//! ```text
//! start ─▶ [A] ─fallback─▶ [B] ─fallback─▶ [A]   (already visited: stop)
//!           │               │
//!           ▼               ▼
//!        entry 0         entry 1           => chain [A, B]
//! ```
//!
//! ## Stop conditions
//!
//! Checked on every hop, in this order:
//!
//! 1. no next id (end of chain)
//! 2. next id already visited (cycle, including self-reference)
//! 3. chain already holds `max_depth` entries
//! 4. record missing or inactive
//! 5. record rejected by targeting
//!
//! None of these is an error. A truncated chain is a valid chain, and a
//! rejected record ends the walk instead of being skipped: the chain is scoped
//! to a single document, so nothing behind an ineligible node is reachable.

use super::condition;
use super::store::RecordLookup;
use super::targeting::{self, TargetingVerdict};
use crate::model::{CtaId, CtaRecord, Direction, DocumentContext, OverflowPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default bound on chain length.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// One candidate of a chain, in the form the orchestrator consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub cta_id: CtaId,
    pub content: String,
    pub compiled_condition_expr: String,
    pub has_conditions: bool,
    pub insertion_direction: Direction,
    pub insertion_position: u32,
    pub overflow_policy: OverflowPolicy,
}

impl ChainEntry {
    /// Derive the entry for `record`, compiling its storage conditions.
    pub fn from_record(record: &CtaRecord) -> Self {
        let expr = condition::compile(&record.storage_conditions);
        ChainEntry {
            cta_id: record.id,
            content: record.content.clone(),
            compiled_condition_expr: expr.to_string(),
            has_conditions: !record.storage_conditions.is_empty(),
            insertion_direction: record.insertion_direction,
            insertion_position: record.insertion_position,
            overflow_policy: record.overflow_policy,
        }
    }
}

/// Materialized fallback chain for one document view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    entries: Vec<ChainEntry>,
    content_container_selector: String,
    chain_length: usize,
}

impl ChainDescriptor {
    pub fn new(entries: Vec<ChainEntry>, content_container_selector: impl Into<String>) -> Self {
        let chain_length = entries.len();
        Self { entries, content_container_selector: content_container_selector.into(), chain_length }
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn content_container_selector(&self) -> &str {
        &self.content_container_selector
    }

    pub fn chain_length(&self) -> usize {
        self.chain_length
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the declared length agrees with the entries (payloads from
    /// the wire are checked with this).
    pub fn is_consistent(&self) -> bool {
        self.chain_length == self.entries.len()
    }

    pub fn ids(&self) -> Vec<CtaId> {
        self.entries.iter().map(|e| e.cta_id).collect()
    }
}

/// Knobs for [`build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub max_depth: usize,
    pub container_selector: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH, container_selector: crate::config::DEFAULT_CONTAINER_SELECTOR.to_string() }
    }
}

/// Why the walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfChain,
    Cycle(CtaId),
    DepthExhausted,
    Missing(CtaId),
    Inactive(CtaId),
    Rejected(CtaId, TargetingVerdict),
}

impl StopReason {
    pub fn describe(&self) -> String {
        match self {
            StopReason::EndOfChain => "end of chain".to_string(),
            StopReason::Cycle(id) => format!("cycle back to {id}"),
            StopReason::DepthExhausted => "max depth reached".to_string(),
            StopReason::Missing(id) => format!("record {id} missing"),
            StopReason::Inactive(id) => format!("record {id} inactive"),
            StopReason::Rejected(id, verdict) => format!("record {id} rejected: {}", verdict.describe()),
        }
    }
}

/// Build output plus the diagnostics the walk produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub chain: ChainDescriptor,
    pub stop: StopReason,
    /// Number of lookups performed.
    pub lookups: usize,
}

/// Build the chain starting at `start` for `doc`.
pub fn build<L>(start: CtaId, lookup: &L, doc: &DocumentContext, options: &BuildOptions) -> ChainDescriptor
where
    L: RecordLookup + ?Sized,
{
    build_with_report(start, lookup, doc, options).chain
}

/// Like [`build`], also returning the stop reason.
pub fn build_with_report<L>(start: CtaId, lookup: &L, doc: &DocumentContext, options: &BuildOptions) -> BuildReport
where
    L: RecordLookup + ?Sized,
{
    let mut visited: HashSet<CtaId> = HashSet::new();
    let mut entries: Vec<ChainEntry> = Vec::new();
    let mut lookups = 0;
    let mut current = Some(start);

    let stop = loop {
        let Some(id) = current else {
            break StopReason::EndOfChain;
        };
        if visited.contains(&id) {
            break StopReason::Cycle(id);
        }
        if entries.len() >= options.max_depth {
            break StopReason::DepthExhausted;
        }

        lookups += 1;
        let Some(record) = lookup.lookup(id) else {
            break StopReason::Missing(id);
        };
        if !record.is_active() {
            break StopReason::Inactive(id);
        }
        let verdict = targeting::evaluate(&record, doc);
        if !verdict.is_match() {
            break StopReason::Rejected(id, verdict);
        }

        tracing::debug!(cta_id = %id, index = entries.len(), fallback = ?record.fallback_id, "chain hop");
        entries.push(ChainEntry::from_record(&record));
        visited.insert(id);
        current = record.fallback_id;
    };

    tracing::debug!(start = %start, length = entries.len(), stop = %stop.describe(), "chain built");

    BuildReport { chain: ChainDescriptor::new(entries, options.container_selector.clone()), stop, lookups }
}

#[cfg(test)]
#[path = "tests/chain.rs"]
mod tests;
