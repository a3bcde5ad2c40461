//! Knowledge-store abstraction.
//!
//! The [`KnowledgeStore`] trait is the per-agent vector collection used by
//! both pipelines: the ingestion pipeline writes chunk batches into it and
//! the answerer searches it. Backends embed text themselves through the
//! [`EmbeddingFunction`](crate::embedding::EmbeddingFunction) they were
//! built with, so callers only ever hand over text.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::RagResult;
use crate::models::{Chunk, CollectionHandle, ScoredChunk};

/// Abstract vector store keyed by collection name.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_or_create_collection`](KnowledgeStore::get_or_create_collection) | Open a collection, creating it if absent |
/// | [`delete_collection`](KnowledgeStore::delete_collection) | Drop a collection and all its chunks (idempotent) |
/// | [`add_chunks`](KnowledgeStore::add_chunks) | Embed and write a batch atomically |
/// | [`search`](KnowledgeStore::search) | Top-k cosine search over a collection |
/// | [`contains_fingerprint`](KnowledgeStore::contains_fingerprint) | Dedup hook |
/// | [`count`](KnowledgeStore::count) | Number of stored chunks |
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn get_or_create_collection(&self, name: &str) -> RagResult<CollectionHandle>;

    async fn delete_collection(&self, name: &str) -> RagResult<()>;

    /// Embed and store a batch. Either every chunk is written or none is.
    ///
    /// Embedding failures surface as [`RagError::Embedding`](crate::error::RagError::Embedding),
    /// write failures as [`RagError::Store`](crate::error::RagError::Store).
    async fn add_chunks(&self, collection: &CollectionHandle, chunks: &[Chunk]) -> RagResult<()>;

    /// Up to `k` chunks ordered by descending similarity to `query`.
    ///
    /// When `score_threshold` is set, chunks scoring below it are dropped.
    async fn search(
        &self,
        collection: &CollectionHandle,
        query: &str,
        k: usize,
        score_threshold: Option<f32>,
    ) -> RagResult<Vec<ScoredChunk>>;

    /// True when any chunk in the collection carries this fingerprint.
    async fn contains_fingerprint(
        &self,
        collection: &CollectionHandle,
        fingerprint: &str,
    ) -> RagResult<bool>;

    async fn count(&self, collection: &CollectionHandle) -> RagResult<usize>;
}

/// Sort by descending score, apply the threshold, keep the top `k`.
///
/// Ties keep insertion order.
pub fn rank(mut candidates: Vec<ScoredChunk>, k: usize, score_threshold: Option<f32>) -> Vec<ScoredChunk> {
    if let Some(min) = score_threshold {
        candidates.retain(|c| c.score >= min);
    }
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(k);
    candidates
}
