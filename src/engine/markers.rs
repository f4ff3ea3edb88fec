//! Manual placement markers.
//!
//! Authors can pin a CTA at an exact spot with a `[cta id="N"]` marker in the
//! content. Expansion happens at render time, before the auto-insertion chain
//! is built, so a CTA placed by hand is known and can be kept out of the chain.

use super::store::RecordLookup;
use super::targeting;
use crate::model::{CtaId, DocumentContext};
use std::ops::Range;

/// Class of the wrapper around a manually placed CTA.
pub const MANUAL_CLASS: &str = "cta-manual";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualMarker {
    pub cta_id: CtaId,
    /// Byte range of the marker text in the content.
    pub range: Range<usize>,
}

/// Result of [`expand_manual_markers`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expansion {
    pub html: String,
    /// CTAs actually rendered, in order of appearance.
    pub placed: Vec<CtaId>,
    /// Markers removed because their record was missing, inactive or rejected.
    pub dropped: Vec<CtaId>,
}

/// Every marker in `content`, in order.
pub fn find_manual_markers(content: &str) -> Vec<ManualMarker> {
    regex!(r#"\[cta\s+id\s*=\s*(?:"(\d+)"|'(\d+)'|(\d+))\s*/?\]"#)
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let digits = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
            let id = digits.as_str().parse::<u64>().ok()?;
            Some(ManualMarker { cta_id: CtaId(id), range: whole.range() })
        })
        .collect()
}

/// Replace every marker with its CTA's content, or with nothing when the CTA
/// cannot be shown on this document.
pub fn expand_manual_markers<L>(content: &str, lookup: &L, doc: &DocumentContext) -> Expansion
where
    L: RecordLookup + ?Sized,
{
    let mut out = Expansion { html: String::with_capacity(content.len()), ..Expansion::default() };
    let mut last = 0;
    for marker in find_manual_markers(content) {
        out.html.push_str(&content[last..marker.range.start]);
        last = marker.range.end;

        let record = lookup.lookup(marker.cta_id).filter(|r| r.is_active() && targeting::matches(r, doc));
        match record {
            Some(record) => {
                out.html.push_str(&format!(
                    r#"<div class="{MANUAL_CLASS}" data-cta-id="{}">{}</div>"#,
                    record.id, record.content
                ));
                out.placed.push(record.id);
            }
            None => {
                tracing::debug!(cta_id = %marker.cta_id, "manual marker dropped");
                out.dropped.push(marker.cta_id);
            }
        }
    }
    out.html.push_str(&content[last..]);
    out
}
