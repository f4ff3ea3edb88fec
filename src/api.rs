use crate::config::EngineConfig;
use crate::dom::Document;
use crate::engine::chain::{self, ChainDescriptor, StopReason};
use crate::engine::events::Notification;
use crate::engine::markers;
use crate::engine::metrics::RunMetrics;
use crate::engine::orchestrator::{AbortReason, Orchestrator, Outcome};
use crate::engine::payload::{self, PayloadError};
use crate::engine::storage::StorageReader;
use crate::engine::store::RecordLookup;
use crate::model::{CtaId, DocumentContext};
use chrono::{DateTime, TimeZone, Utc};
use std::time::{Duration, Instant};

/// View context.
///
/// Holds the environment needed to evaluate relative date conditions (like
/// `"7 days ago"`).
#[derive(Debug, Clone)]
pub struct Context {
    /// Reference time for date conditions.
    pub now: DateTime<Utc>,
}

impl Default for Context {
    fn default() -> Self {
        if cfg!(test) {
            Self { now: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or(DateTime::UNIX_EPOCH) }
        } else {
            Self { now: Utc::now() }
        }
    }
}

/// Result from [`render_document`].
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// Rendered HTML with manual markers expanded and the payload embedded.
    pub html: String,
    /// The embedded chain; `None` when no payload was written.
    pub chain: Option<ChainDescriptor>,
    /// Why chain construction stopped, when it ran.
    pub stop: Option<StopReason>,
    /// CTAs placed through manual markers.
    pub manual: Vec<CtaId>,
    pub elapsed: Duration,
}

/// Result from [`view_document`].
#[derive(Debug, Clone)]
pub struct ViewResult {
    /// The document after the orchestrator ran.
    pub html: String,
    pub outcome: Outcome,
    /// Notifications emitted during the run, in order.
    pub notifications: Vec<Notification>,
    pub elapsed: Duration,
}

/// Additional details returned by [`view_document_verbose`].
#[derive(Debug, Clone)]
pub struct ViewDetails {
    /// The chain read from the payload, when it could be read.
    pub chain: Option<ChainDescriptor>,
    /// Why the payload could not be read.
    pub payload_error: Option<String>,
    pub metrics: RunMetrics,
}

#[derive(Debug, Clone)]
pub struct ViewResultVerbose {
    pub html: String,
    pub outcome: Outcome,
    pub notifications: Vec<Notification>,
    pub elapsed: Duration,
    pub details: ViewDetails,
}

/// Render-time pipeline: expand manual markers, build the fallback chain
/// starting at `start`, and embed it as the payload.
///
/// When `start` was already placed by a manual marker, or the chain comes out
/// empty, no payload is written and the view will do nothing.
///
/// # Errors
///
/// Only if the descriptor cannot be serialized.
pub fn render_document<L>(
    html: &str,
    start: Option<CtaId>,
    lookup: &L,
    doc: &DocumentContext,
    config: &EngineConfig,
) -> Result<RenderOutput, PayloadError>
where
    L: RecordLookup + ?Sized,
{
    let started = Instant::now();
    let expansion = markers::expand_manual_markers(html, lookup, doc);
    let mut document = Document::parse(&expansion.html);

    let report = match start {
        Some(id) if expansion.placed.contains(&id) => {
            tracing::debug!(cta_id = %id, "start CTA placed manually, skipping auto-insertion");
            None
        }
        Some(id) => Some(chain::build_with_report(id, lookup, doc, &config.build_options())),
        None => None,
    };

    let stop = report.as_ref().map(|r| r.stop);
    let chain = match report {
        Some(report) if !report.chain.is_empty() => {
            payload::embed(&mut document, &report.chain, &config.payload_id)?;
            Some(report.chain)
        }
        _ => None,
    };

    Ok(RenderOutput { html: document.to_html(), chain, stop, manual: expansion.placed, elapsed: started.elapsed() })
}

/// View-time pipeline: read the payload out of `html`, run the orchestrator
/// once against it after the configured start delay, and serialize the
/// result.
pub fn view_document(html: &str, storage: &dyn StorageReader, context: &Context, config: &EngineConfig) -> ViewResult {
    let res = view_document_verbose(html, storage, context, config);
    ViewResult { html: res.html, outcome: res.outcome, notifications: res.notifications, elapsed: res.elapsed }
}

/// Like [`view_document`], also returning the chain, metrics and candidate
/// trace.
pub fn view_document_verbose(
    html: &str,
    storage: &dyn StorageReader,
    context: &Context,
    config: &EngineConfig,
) -> ViewResultVerbose {
    let started = Instant::now();
    let mut document = Document::parse(html);

    let chain = match payload::extract(&document, &config.payload_id) {
        Ok(chain) => chain,
        Err(err) => {
            tracing::warn!(error = %err, "no usable chain payload");
            return ViewResultVerbose {
                html: html.to_string(),
                outcome: Outcome::Aborted(AbortReason::NoPayload),
                notifications: Vec::new(),
                elapsed: started.elapsed(),
                details: ViewDetails { chain: None, payload_error: Some(err.to_string()), metrics: RunMetrics::default() },
            };
        }
    };

    let mut notifications = Vec::new();
    let (outcome, metrics) = {
        let mut orchestrator = Orchestrator::new(chain.clone(), storage, config.clone())
            .with_now(context.now)
            .with_listener(|n: &Notification| notifications.push(*n));
        orchestrator.run_deferred_with_metrics(&mut document)
    };

    // Untouched pages are returned byte for byte.
    let html = if outcome.is_inserted() { document.to_html() } else { html.to_string() };

    ViewResultVerbose {
        html,
        outcome,
        notifications,
        elapsed: started.elapsed(),
        details: ViewDetails { chain: Some(chain), payload_error: None, metrics },
    }
}
