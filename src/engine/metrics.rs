//! Run metrics.
//!
//! Small structs used to observe a render/view cycle.
//!
//! The intended usage is:
//!
//! - `Orchestrator::run` / `run_deferred` for normal operation.
//! - `Orchestrator::run_deferred_with_metrics` (and `api::view_document_verbose`) for
//!   debugging a page that did not show what it should have.
//!
//! Metrics are opt-in: the plain path never builds the candidate trace.

use super::orchestrator::State;
use crate::model::CtaId;
use std::time::Duration;

/// How a single chain candidate fared during selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// No conditions; selected without evaluation.
    Unconditional,
    Passed,
    Failed,
    /// The expression could not be parsed; counts as failed.
    Fault(String),
}

impl CandidateOutcome {
    pub fn selects(&self) -> bool {
        matches!(self, CandidateOutcome::Unconditional | CandidateOutcome::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTrace {
    pub index: usize,
    pub cta_id: CtaId,
    pub expr: String,
    pub outcome: CandidateOutcome,
}

#[derive(Debug, Default, Clone)]
pub struct RunMetrics {
    /// Total elapsed time for the run, excluding the start delay.
    pub total: Duration,
    /// Start delay waited before a deferred run.
    pub delay: Duration,
    /// Chain construction, when the run included a render step.
    pub build: Duration,
    /// Container lookup.
    pub resolve: Duration,
    /// Block element enumeration.
    pub parse: Duration,
    /// Candidate evaluation.
    pub select: Duration,
    /// Placement and the DOM splice.
    pub insert: Duration,
    /// Selector that located the container.
    pub container_selector: Option<String>,
    /// Countable block elements found.
    pub element_count: usize,
    /// One entry per candidate evaluated, in chain order.
    pub candidates: Vec<CandidateTrace>,
    /// States entered, starting with `Idle`.
    pub transitions: Vec<State>,
}
