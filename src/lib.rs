//! CTA auto-insertion engine.
//!
//! Render time turns a graph of authored [`CtaRecord`]s into a cycle-safe
//! fallback chain for one document and embeds it in the page. View time reads
//! the chain back, picks the first candidate whose storage conditions hold
//! (or the last one), and splices it into the content exactly once.
//!
//! Most callers only need [`render_document`] and [`view_document`]; the
//! building blocks live under [`engine`].

#[macro_use]
mod macros;
mod api;
pub mod config;
pub mod dom;
pub mod engine;
pub mod model;

pub use api::{
    Context, RenderOutput, ViewDetails, ViewResult, ViewResultVerbose, render_document, view_document,
    view_document_verbose,
};
pub use config::{ConfigError, EngineConfig};
pub use model::{
    CtaId, CtaRecord, Datatype, Direction, DocumentContext, Operator, OverflowPolicy, Role, Status, StorageCondition,
    TaxonomyMode, TermId,
};
