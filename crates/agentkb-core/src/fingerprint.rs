//! Content fingerprints used for deduplication and provenance.
//!
//! The fingerprint is computed over the source *reference* string as given
//! by the caller: the URL for web sources, the raw text for text sources,
//! and the file path for PDFs.

use sha2::{Digest, Sha256};

/// SHA-256 of the UTF-8 bytes of `source_content`, as 64 lowercase hex chars.
///
/// ```rust
/// use agentkb_core::fingerprint::fingerprint;
///
/// let fp = fingerprint("The sky is blue.");
/// assert_eq!(fp.len(), 64);
/// assert_eq!(fp, fingerprint("The sky is blue."));
/// ```
pub fn fingerprint(source_content: &str) -> String {
    sha256_hex(source_content.as_bytes())
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
