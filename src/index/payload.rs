//! Helpers for chunk metadata, digests, and timestamps stored on an index.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Source label recorded on every chunk extracted from an uploaded document.
pub const PDF_SOURCE: &str = "pdf";

/// Build the metadata stored alongside one chunk.
pub fn chunk_metadata(source: &str, chunk_index: usize) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("source".into(), Value::String(source.to_string()));
    metadata.insert("chunk_index".into(), Value::from(chunk_index));
    metadata
}

/// Compute a deterministic SHA-256 digest of the indexed text.
pub fn compute_source_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted as RFC3339.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
