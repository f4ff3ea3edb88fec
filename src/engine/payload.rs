//! Chain payload: the only channel between render time and view time.
//!
//! The descriptor is embedded as a JSON data block:
//!
//! ```text
//! <script type="application/json" id="ctaflow-chain">{"entries":[...],...}</script>
//! ```
//!
//! `<` is written as `\u003c` inside the JSON so that no content string can
//! terminate the script element early.

use super::chain::ChainDescriptor;
use crate::dom::{self, Document, NodeId};
use thiserror::Error;

/// Default `id` of the payload element.
pub const DEFAULT_PAYLOAD_ID: &str = "ctaflow-chain";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("no chain payload `#{0}` in document")]
    Missing(String),
    #[error("chain payload is empty")]
    Empty,
    #[error("chain payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("chain payload declares length {declared} but carries {actual} entries")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Serialize `chain` into the JSON text of a payload block.
pub fn encode(chain: &ChainDescriptor) -> Result<String, PayloadError> {
    Ok(serde_json::to_string(chain)?.replace('<', "\\u003c"))
}

/// Decode payload JSON, checking the declared length.
pub fn decode(json: &str) -> Result<ChainDescriptor, PayloadError> {
    if json.trim().is_empty() {
        return Err(PayloadError::Empty);
    }
    let chain: ChainDescriptor = serde_json::from_str(json)?;
    if !chain.is_consistent() {
        return Err(PayloadError::LengthMismatch { declared: chain.chain_length(), actual: chain.entries().len() });
    }
    Ok(chain)
}

/// Render the complete `<script>` element.
pub fn script_tag(chain: &ChainDescriptor, payload_id: &str) -> Result<String, PayloadError> {
    Ok(format!(r#"<script type="application/json" id="{}">{}</script>"#, dom::escape_attr(payload_id), encode(chain)?))
}

/// Append the payload element to `doc`: inside `<body>` when there is one,
/// at the top level otherwise. An existing payload with the same id is
/// replaced.
pub fn embed(doc: &mut Document, chain: &ChainDescriptor, payload_id: &str) -> Result<NodeId, PayloadError> {
    let tag = script_tag(chain, payload_id)?;
    if let Some(existing) = find(doc, payload_id) {
        doc.detach(existing);
    }
    let host = doc.query("body").ok().flatten().unwrap_or(doc.root());
    let script = doc.build_element(&tag).ok_or_else(|| PayloadError::Missing(payload_id.to_string()))?;
    doc.append_child(host, script);
    Ok(script)
}

/// Read the payload back out of `doc`.
pub fn extract(doc: &Document, payload_id: &str) -> Result<ChainDescriptor, PayloadError> {
    let node = find(doc, payload_id).ok_or_else(|| PayloadError::Missing(payload_id.to_string()))?;
    decode(&doc.raw_text(node))
}

fn find(doc: &Document, payload_id: &str) -> Option<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .find(|&id| doc.tag_name(id) == Some("script") && doc.attr(id, "id") == Some(payload_id))
}
