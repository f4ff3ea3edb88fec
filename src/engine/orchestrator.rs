//! View-time orchestration.
//!
//! The orchestrator is the only component that touches the live document. It
//! consumes one [`ChainDescriptor`] and performs at most one insertion:
//!
//! ```text
//! Idle ──resolve container──▶ ContainerResolved ──enumerate blocks──▶ ElementsParsed
//!   │ no match                    │ zero blocks                         │
//!   ▼                             ▼                                     ▼ pick candidate
//! Aborted ◀───────────────────────┴──────────── empty chain ◀── CandidateSelected
//!   ▲                                                                   │
//!   └──────────────────── placement = skip ◀────────────────────────────┤
//!                                                                       ▼
//!                                                                    Inserted
//! ```
//!
//! Work is split in two: [`Orchestrator::plan`] decides container, blocks,
//! candidate and placement without mutating anything, and `apply` performs the
//! splice. Planning is a pure function of the descriptor, the storage snapshot,
//! the reference time and the document, so planning twice yields the same
//! result.
//!
//! ## Candidate selection
//!
//! Candidates are tried in chain order. An unconditional candidate wins at
//! once; otherwise its expression is evaluated against storage. An expression
//! that cannot be parsed counts as failed. When every candidate fails, the
//! last one is used anyway (the terminal fallback).

use super::chain::{ChainDescriptor, ChainEntry};
use super::condition::{EvalContext, Expr};
use super::content;
use super::events::{EventBus, Listener, NoPresenter, Notification, Presenter, wants_highlight};
use super::metrics::{CandidateOutcome, CandidateTrace, RunMetrics};
use super::position::{self, Placement};
use super::storage::StorageReader;
use crate::config::EngineConfig;
use crate::dom::{self, Document, NodeId};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    ContainerResolved,
    ElementsParsed,
    CandidateSelected,
    Inserted,
    Aborted,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::ContainerResolved => "container-resolved",
            State::ElementsParsed => "elements-parsed",
            State::CandidateSelected => "candidate-selected",
            State::Inserted => "inserted",
            State::Aborted => "aborted",
        }
    }
}

/// Why nothing was inserted. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    /// The chain payload was missing or unreadable.
    NoPayload,
    NoContainer,
    NoElements,
    EmptyChain,
    /// The selected candidate's placement resolved to skip.
    Skipped,
    /// This orchestrator already ran.
    AlreadyRan,
    /// The wrapper element could not be built from its markup.
    NoWrapper,
}

impl AbortReason {
    pub fn describe(self) -> &'static str {
        match self {
            AbortReason::NoPayload => "no usable chain payload",
            AbortReason::NoContainer => "no content container matched",
            AbortReason::NoElements => "container has no content blocks",
            AbortReason::EmptyChain => "chain is empty",
            AbortReason::Skipped => "placement overflowed with skip policy",
            AbortReason::AlreadyRan => "orchestrator already ran",
            AbortReason::NoWrapper => "wrapper element could not be built",
        }
    }
}

/// The candidate picked from the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    /// Selected only because every candidate failed.
    pub terminal_fallback: bool,
}

/// Node the wrapper is spliced next to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Before(NodeId),
    After(NodeId),
}

/// Everything decided before the document is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub container: NodeId,
    pub container_selector: String,
    pub elements: Vec<NodeId>,
    pub selection: Selection,
    pub placement: Placement,
    pub anchor: Anchor,
}

impl Plan {
    /// Position of the CTA within the block sequence.
    pub fn insertion_index(&self) -> Option<usize> {
        self.placement.index(self.elements.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub entry: ChainEntry,
    pub chain_index: usize,
    pub chain_length: usize,
    pub wrapper: NodeId,
    pub placement: Placement,
    pub terminal_fallback: bool,
    /// The inserted content was handed to the presenter.
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Inserted(Insertion),
    Aborted(AbortReason),
}

impl Outcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Outcome::Inserted(_))
    }

    pub fn insertion(&self) -> Option<&Insertion> {
        match self {
            Outcome::Inserted(insertion) => Some(insertion),
            Outcome::Aborted(_) => None,
        }
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Outcome::Aborted(reason) => Some(*reason),
            Outcome::Inserted(_) => None,
        }
    }
}

/// One-shot inserter for a single page view.
pub struct Orchestrator<'a> {
    chain: ChainDescriptor,
    storage: &'a dyn StorageReader,
    now: DateTime<Utc>,
    config: EngineConfig,
    events: EventBus<'a>,
    presenter: Box<dyn Presenter + 'a>,
    state: State,
}

impl<'a> Orchestrator<'a> {
    pub fn new(chain: ChainDescriptor, storage: &'a dyn StorageReader, config: EngineConfig) -> Self {
        Self {
            chain,
            storage,
            now: Utc::now(),
            config,
            events: EventBus::new(),
            presenter: Box::new(NoPresenter),
            state: State::Idle,
        }
    }

    /// Reference time for date conditions.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_listener(mut self, listener: impl Listener + 'a) -> Self {
        self.events.attach(listener);
        self
    }

    pub fn with_presenter(mut self, presenter: impl Presenter + 'a) -> Self {
        self.presenter = Box::new(presenter);
        self
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Decide what `run` would do, without touching `doc`.
    pub fn plan(&self, doc: &Document) -> Result<Plan, AbortReason> {
        self.plan_traced(doc, &mut RunMetrics::default(), false)
    }

    /// Plan and insert. Runs at most once; later calls abort with
    /// [`AbortReason::AlreadyRan`] and leave `doc` alone.
    pub fn run(&mut self, doc: &mut Document) -> Outcome {
        self.run_inner(doc, &mut RunMetrics::default(), false)
    }

    /// [`run`](Self::run), also returning timings and the candidate trace.
    pub fn run_with_metrics(&mut self, doc: &mut Document) -> (Outcome, RunMetrics) {
        let mut metrics = RunMetrics::default();
        let outcome = self.run_inner(doc, &mut metrics, true);
        (outcome, metrics)
    }

    /// Wait for the configured start delay, then [`run`](Self::run). The
    /// delay gives late client-side rendering a chance to finish.
    pub fn run_deferred(&mut self, doc: &mut Document) -> Outcome {
        self.wait_for_start();
        self.run(doc)
    }

    /// [`run_deferred`](Self::run_deferred) with metrics; the time spent
    /// waiting is reported as `delay`.
    pub fn run_deferred_with_metrics(&mut self, doc: &mut Document) -> (Outcome, RunMetrics) {
        let delay = self.wait_for_start();
        let (outcome, mut metrics) = self.run_with_metrics(doc);
        metrics.delay = delay;
        (outcome, metrics)
    }

    /// Sleep for the start delay, but only before the first run.
    fn wait_for_start(&self) -> Duration {
        let delay: Duration = self.config.start_delay();
        if self.state != State::Idle || delay.is_zero() {
            return Duration::ZERO;
        }
        tracing::trace!(?delay, "deferring orchestrator start");
        std::thread::sleep(delay);
        delay
    }

    fn run_inner(&mut self, doc: &mut Document, metrics: &mut RunMetrics, trace: bool) -> Outcome {
        if self.state != State::Idle {
            tracing::debug!(state = self.state.name(), "orchestrator already ran");
            return Outcome::Aborted(AbortReason::AlreadyRan);
        }
        let started = Instant::now();

        let outcome = match self.plan_traced(doc, metrics, trace) {
            Ok(plan) => {
                let insert_started = Instant::now();
                let applied = self.apply(doc, &plan);
                metrics.insert = insert_started.elapsed();
                match applied {
                    Some(insertion) => Outcome::Inserted(insertion),
                    None => {
                        tracing::warn!(class = %self.config.wrapper_class, "wrapper element could not be built");
                        Outcome::Aborted(AbortReason::NoWrapper)
                    }
                }
            }
            Err(reason) => {
                tracing::debug!(reason = reason.describe(), "orchestrator aborted");
                Outcome::Aborted(reason)
            }
        };

        self.state = if outcome.is_inserted() { State::Inserted } else { State::Aborted };
        metrics.transitions.push(self.state);
        metrics.total = started.elapsed();
        outcome
    }

    fn plan_traced(&self, doc: &Document, metrics: &mut RunMetrics, trace: bool) -> Result<Plan, AbortReason> {
        metrics.transitions.push(State::Idle);

        let phase = Instant::now();
        let resolved = self.resolve_container(doc);
        metrics.resolve = phase.elapsed();
        let (container, container_selector) = resolved.ok_or(AbortReason::NoContainer)?;
        metrics.container_selector = Some(container_selector.clone());
        metrics.transitions.push(State::ContainerResolved);
        tracing::trace!(selector = %container_selector, "container resolved");

        let phase = Instant::now();
        let elements = content::block_elements(doc, container);
        metrics.parse = phase.elapsed();
        metrics.element_count = elements.len();
        if elements.is_empty() {
            return Err(AbortReason::NoElements);
        }
        metrics.transitions.push(State::ElementsParsed);
        tracing::trace!(count = elements.len(), "content blocks parsed");

        let phase = Instant::now();
        let selection = self.select(if trace { Some(&mut metrics.candidates) } else { None });
        metrics.select = phase.elapsed();
        let selection = selection.ok_or(AbortReason::EmptyChain)?;
        metrics.transitions.push(State::CandidateSelected);

        // Each entry carries its own placement settings.
        let entry = &self.chain.entries()[selection.index];
        let placement =
            position::compute(elements.len(), entry.insertion_direction, entry.insertion_position, entry.overflow_policy);
        tracing::trace!(cta_id = %entry.cta_id, ?placement, "placement computed");
        let anchor = match placement {
            Placement::Before(idx) => elements.get(idx).copied().map(Anchor::Before),
            // Append goes after the last block, ahead of any trailing non-content nodes.
            Placement::Append => elements.last().copied().map(Anchor::After),
            Placement::Skip => None,
        };
        let anchor = anchor.ok_or(AbortReason::Skipped)?;

        Ok(Plan { container, container_selector, elements, selection, placement, anchor })
    }

    /// Primary selector first (the descriptor's, else the configured one),
    /// then the generic fallbacks. Unparseable selectors are skipped.
    fn resolve_container(&self, doc: &Document) -> Option<(NodeId, String)> {
        let primary = match self.chain.content_container_selector().trim() {
            "" => self.config.container_selector.as_str(),
            selector => selector,
        };
        std::iter::once(primary).chain(self.config.fallback_selectors.iter().map(String::as_str)).find_map(|raw| {
            match dom::parse_selector(raw) {
                Ok(selector) => doc.select_first(&selector).map(|node| (node, raw.to_string())),
                Err(err) => {
                    tracing::warn!(selector = raw, error = %err, "ignoring malformed container selector");
                    None
                }
            }
        })
    }

    fn select(&self, mut trace: Option<&mut Vec<CandidateTrace>>) -> Option<Selection> {
        let entries = self.chain.entries();
        let ctx = EvalContext::new(self.storage, self.now);

        for (index, entry) in entries.iter().enumerate() {
            let outcome = evaluate_candidate(entry, &ctx);
            tracing::debug!(cta_id = %entry.cta_id, index, ?outcome, "candidate evaluated");
            let selected = outcome.selects();
            if let Some(trace) = trace.as_deref_mut() {
                trace.push(CandidateTrace {
                    index,
                    cta_id: entry.cta_id,
                    expr: entry.compiled_condition_expr.clone(),
                    outcome,
                });
            }
            if selected {
                return Some(Selection { index, terminal_fallback: false });
            }
        }

        let last = entries.len().checked_sub(1)?;
        tracing::debug!(cta_id = %entries[last].cta_id, "every candidate failed, using terminal fallback");
        Some(Selection { index: last, terminal_fallback: true })
    }

    fn apply(&mut self, doc: &mut Document, plan: &Plan) -> Option<Insertion> {
        let entry = self.chain.entries()[plan.selection.index].clone();
        let chain_length = self.chain.chain_length();
        let chain_index = plan.selection.index;

        let markup = format!(
            r#"<div class="{}" data-cta-id="{}" data-chain-index="{}" data-chain-length="{}"></div>"#,
            dom::escape_attr(&self.config.wrapper_class),
            entry.cta_id,
            chain_index,
            chain_length
        );
        let wrapper = doc.build_element(&markup)?;
        doc.append_fragment(wrapper, &entry.content);

        match plan.anchor {
            Anchor::Before(node) => doc.insert_before(node, wrapper),
            Anchor::After(node) => doc.insert_after(node, wrapper),
        }
        tracing::debug!(cta_id = %entry.cta_id, chain_index, chain_length, placement = ?plan.placement, "cta inserted");

        let highlighted = wants_highlight(doc, wrapper);
        if highlighted {
            self.presenter.present(doc, wrapper);
        }

        self.events.emit(Notification::Shown { cta_id: entry.cta_id, chain_index, chain_length });
        if chain_index > 0 {
            self.events.emit(Notification::FallbackUsed { cta_id: entry.cta_id, chain_index, chain_length });
        }

        Some(Insertion {
            entry,
            chain_index,
            chain_length,
            wrapper,
            placement: plan.placement,
            terminal_fallback: plan.selection.terminal_fallback,
            highlighted,
        })
    }
}

impl std::fmt::Debug for Orchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("chain", &self.chain)
            .field("now", &self.now)
            .field("state", &self.state)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

fn evaluate_candidate(entry: &ChainEntry, ctx: &EvalContext<'_>) -> CandidateOutcome {
    if !entry.has_conditions {
        return CandidateOutcome::Unconditional;
    }
    match Expr::parse(&entry.compiled_condition_expr) {
        Ok(expr) if expr.evaluate(ctx) => CandidateOutcome::Passed,
        Ok(_) => CandidateOutcome::Failed,
        Err(err) => {
            tracing::warn!(cta_id = %entry.cta_id, error = %err, "corrupt condition expression");
            CandidateOutcome::Fault(err.to_string())
        }
    }
}

#[cfg(test)]
#[path = "tests/orchestrator.rs"]
mod tests;
