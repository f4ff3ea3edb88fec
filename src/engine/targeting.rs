//! Targeting: may a CTA run on this document at all?
//!
//! Targeting only looks at what is known at render time (content type,
//! taxonomy, the per-document opt-out flag). Client-side storage conditions
//! are deferred to view time and are not consulted here.
//!
//! ```text
//! opt-out? ──yes──▶ OptedOut
//!    │no
//! content type listed (or list empty)? ──no──▶ ContentType
//!    │yes
//! taxonomy include/exclude satisfied? ──no──▶ Taxonomy
//!    │yes
//!  Match
//! ```

use crate::model::{CtaRecord, DocumentContext, TaxonomyMode};

/// Outcome of a targeting check, with the reason for rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetingVerdict {
    Match,
    OptedOut,
    ContentType,
    Taxonomy,
}

impl TargetingVerdict {
    pub fn is_match(self) -> bool {
        self == TargetingVerdict::Match
    }

    pub fn describe(self) -> &'static str {
        match self {
            TargetingVerdict::Match => "match",
            TargetingVerdict::OptedOut => "document opted out",
            TargetingVerdict::ContentType => "content type not targeted",
            TargetingVerdict::Taxonomy => "taxonomy rule rejected",
        }
    }
}

/// Full targeting check. The opt-out flag dominates everything else.
pub fn evaluate(cta: &CtaRecord, doc: &DocumentContext) -> TargetingVerdict {
    if doc.opt_out {
        return TargetingVerdict::OptedOut;
    }
    if !content_type_matches(cta, doc) {
        return TargetingVerdict::ContentType;
    }
    if !taxonomy_matches(cta, doc) {
        return TargetingVerdict::Taxonomy;
    }
    TargetingVerdict::Match
}

pub fn matches(cta: &CtaRecord, doc: &DocumentContext) -> bool {
    evaluate(cta, doc).is_match()
}

/// Empty target set means "every content type".
pub fn content_type_matches(cta: &CtaRecord, doc: &DocumentContext) -> bool {
    cta.content_type_targets.is_empty() || cta.content_type_targets.contains(&doc.content_type)
}

pub fn taxonomy_matches(cta: &CtaRecord, doc: &DocumentContext) -> bool {
    if cta.taxonomy_targets.is_empty() {
        return true;
    }
    let tagged = cta.taxonomy_targets.iter().any(|term| doc.taxonomy_terms.contains(term));
    match cta.taxonomy_mode {
        TaxonomyMode::Include => tagged,
        TaxonomyMode::Exclude => !tagged,
    }
}
