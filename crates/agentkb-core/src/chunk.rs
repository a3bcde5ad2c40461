//! Fixed-size, overlapping text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters.
//! Consecutive chunks of the same document share exactly `chunk_overlap`
//! characters, so a sentence cut at one boundary is still seen whole by at
//! least one neighbour.
//!
//! # Algorithm
//!
//! 1. If the remaining text fits in `chunk_size`, emit it as the final chunk.
//! 2. Otherwise pick the chunk end inside the window
//!    `(start + overlap, start + chunk_size]`: the last position directly
//!    after a separator, trying the separator levels in order: paragraph
//!    (`"\n\n"`), line (`"\n"`), sentence (`". "`, `"? "`, `"! "`),
//!    word (`" "`).
//! 3. If no level has a separator in the window, hard-cut at
//!    `start + chunk_size`.
//! 4. The next window starts at `end - overlap`.
//!
//! Lengths are counted in `char`s and every cut lands on a UTF-8 boundary.
//! Chunk text is never trimmed; trimming would break the overlap guarantee.
//! Blank documents produce no chunks.
//!
//! # Example
//!
//! ```rust
//! use agentkb_core::chunk::Chunker;
//!
//! let chunker = Chunker::new(1000, 200).unwrap();
//! let pieces = chunker.split_text("The sky is blue.");
//! assert_eq!(pieces, vec!["The sky is blue.".to_string()]);
//! ```

use uuid::Uuid;

use crate::error::{RagError, RagResult};
use crate::fingerprint::sha256_hex;
use crate::models::{Chunk, Metadata, SourceDocument, META_CHUNK_INDEX};

/// Separator levels, most to least preferred.
const SEPARATOR_LEVELS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "? ", "! "], &[" "]];

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Create a chunker.
    ///
    /// Fails with [`RagError::Configuration`] unless `chunk_size > 0` and
    /// `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> RagResult<Self> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunking.chunk_size must be > 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into overlapping pieces.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // bounds[i] is the byte offset of char i; the last entry is text.len().
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        let mut pieces = Vec::new();
        let mut start = 0usize;
        loop {
            if total - start <= self.chunk_size {
                pieces.push(text[bounds[start]..].to_string());
                break;
            }
            let end = self.find_break(text, &bounds, start);
            pieces.push(text[bounds[start]..bounds[end]].to_string());
            start = end - self.chunk_overlap;
        }
        pieces
    }

    /// Char index where the chunk starting at `start` should end.
    ///
    /// Always within `[start + overlap + 1, start + chunk_size]`, so the next
    /// window strictly advances.
    fn find_break(&self, text: &str, bounds: &[usize], start: usize) -> usize {
        let hi = start + self.chunk_size;
        let lo = start + self.chunk_overlap + 1;
        let window = &text[bounds[start]..bounds[hi]];

        for level in SEPARATOR_LEVELS {
            let best = level
                .iter()
                .filter_map(|sep| {
                    let pos = window.rfind(sep)?;
                    let end = start + window[..pos + sep.len()].chars().count();
                    (end >= lo).then_some(end)
                })
                .max();
            if let Some(end) = best {
                return end;
            }
        }
        hi
    }

    /// Split one document into chunks.
    ///
    /// Each chunk's metadata is the document's metadata overlaid with
    /// `extra` (extra wins on key collision). Indices restart at 0; use
    /// [`renumber`] after concatenating several documents.
    pub fn split_document(&self, doc: &SourceDocument, extra: &Metadata) -> Vec<Chunk> {
        let mut metadata = doc.metadata.clone();
        for (k, v) in extra {
            metadata.insert(k.clone(), v.clone());
        }

        self.split_text(&doc.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| make_chunk(i as i64, text, metadata.clone()))
            .collect()
    }

    /// Split every document in order and number the chunks contiguously.
    pub fn split(&self, docs: &[SourceDocument], extra: &Metadata) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = docs
            .iter()
            .flat_map(|doc| self.split_document(doc, extra))
            .collect();
        renumber(&mut chunks);
        chunks
    }
}

/// Assign contiguous indices `0..N` in slice order and record them in metadata.
pub fn renumber(chunks: &mut [Chunk]) {
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.index = i as i64;
        chunk
            .metadata
            .insert(META_CHUNK_INDEX.to_string(), serde_json::json!(i));
    }
}

fn make_chunk(index: i64, text: String, metadata: Metadata) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        index,
        hash: sha256_hex(text.as_bytes()),
        text,
        metadata,
    }
}
