//! Load validation.

use crate::error::{RagError, RagResult};
use crate::models::SourceDocument;

/// Reject an empty load; warn about (but keep) blank documents.
///
/// A blank document still carries provenance, and chunks to nothing
/// downstream, so it is not dropped here.
pub fn validate_documents(source_ref: &str, docs: &[SourceDocument]) -> RagResult<()> {
    if docs.is_empty() {
        return Err(RagError::EmptyResult {
            source_ref: source_ref.to_string(),
        });
    }

    let blank = docs.iter().filter(|d| d.text.trim().is_empty()).count();
    if blank > 0 {
        tracing::warn!(
            source = source_ref,
            blank,
            total = docs.len(),
            "document(s) loaded with empty content"
        );
    }

    Ok(())
}
