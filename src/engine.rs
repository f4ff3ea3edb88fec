//! Auto-insertion engine.
//!
//! This module is the entry point for everything between "a record graph and a
//! document context" and "one CTA spliced into a rendered page". It is split
//! into focused submodules under `src/engine/` while keeping public paths
//! short (for example `crate::engine::Orchestrator`).
//!
//! ## How the parts work together
//!
//! Two phases, connected only by the serialized chain payload:
//!
//! ```text
//!   render time                                   view time
//!   ───────────                                   ─────────
//! records ─ RecordLookup (store.rs)
//!               │
//!               v
//!   chain::build (chain.rs)                   payload::extract
//!     - targeting::evaluate per hop                 │
//!     - condition::compile per entry                v
//!     - visited set + max_depth            Orchestrator (orchestrator.rs)
//!               │                             - resolve container (dom selectors)
//!               v                             - content::block_elements
//!      ChainDescriptor ── payload::embed ──▶  - select candidate (Expr::evaluate
//!                        (<script> JSON)          over a StorageReader)
//!                                             - position::compute
//!                                             - splice wrapper, notify EventBus,
//!                                               hand off to Presenter
//! ```
//!
//! Nothing on either side raises a user-visible error. Missing records,
//! cycles and targeting rejections truncate the chain; missing containers,
//! empty content, corrupt payloads and overflowing positions abort the view
//! without touching the page.
//!
//! ## Responsibilities by module
//!
//! - `condition.rs`: compiles storage conditions into an [`Expr`], its textual
//!   form, and the interpreter that evaluates it.
//! - `targeting.rs`: opt-out, content-type and taxonomy checks.
//! - `store.rs`: the [`RecordLookup`] seam and an in-memory [`RecordStore`].
//! - `chain.rs`: cycle-safe, depth-bounded chain construction.
//! - `position.rs`: the single insertion-point formula.
//! - `content.rs`: which container children count as content blocks.
//! - `storage.rs`: client storage readers.
//! - `events.rs`: listeners, notifications and the presenter hand-off.
//! - `payload.rs`: descriptor embedding/extraction.
//! - `markers.rs`: manual `[cta id="N"]` placement.
//! - `orchestrator.rs`: the view-time state machine.
//! - `metrics.rs`: optional timing/trace data for runs.
//!
//! ## Debugging
//!
//! Everything logs through `tracing`; run the CLI with `CTAFLOW_LOG=ctaflow=trace`
//! to see every chain hop, candidate evaluation and state transition.

#[path = "engine/chain.rs"]
pub mod chain;
#[path = "engine/condition.rs"]
pub mod condition;
#[path = "engine/content.rs"]
pub mod content;
#[path = "engine/events.rs"]
pub mod events;
#[path = "engine/markers.rs"]
pub mod markers;
#[path = "engine/metrics.rs"]
pub mod metrics;
#[path = "engine/orchestrator.rs"]
pub mod orchestrator;
#[path = "engine/payload.rs"]
pub mod payload;
#[path = "engine/position.rs"]
pub mod position;
#[path = "engine/storage.rs"]
pub mod storage;
#[path = "engine/store.rs"]
pub mod store;
#[path = "engine/targeting.rs"]
pub mod targeting;

pub use chain::{BuildOptions, BuildReport, ChainDescriptor, ChainEntry, StopReason};
pub use condition::{ConditionError, EvalContext, Expr};
pub use events::{EventBus, Listener, NoPresenter, Notification, Presenter, RecordingPresenter};
pub use markers::{Expansion, ManualMarker};
pub use metrics::{CandidateOutcome, CandidateTrace, RunMetrics};
pub use orchestrator::{AbortReason, Orchestrator, Outcome, Plan, State};
pub use payload::PayloadError;
pub use position::Placement;
pub use storage::{LayeredStorage, MemoryStorage, StorageReader};
pub use store::{RecordLookup, RecordStore, StoreError};
pub use targeting::TargetingVerdict;
