//! In-memory [`KnowledgeStore`] for tests and embedded use.
//!
//! Collections are `HashMap` entries behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every vector in the collection.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::{cosine_similarity, EmbeddingFunction};
use crate::error::{RagError, RagResult};
use crate::models::{Chunk, CollectionHandle, ScoredChunk};

use super::{rank, KnowledgeStore};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

type Collections = HashMap<String, Vec<StoredChunk>>;

pub struct InMemoryStore {
    embedder: Arc<dyn EmbeddingFunction>,
    collections: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn EmbeddingFunction>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RagResult<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| RagError::Store(anyhow::anyhow!("in-memory store lock poisoned")))
    }

    fn write(&self) -> RagResult<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| RagError::Store(anyhow::anyhow!("in-memory store lock poisoned")))
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn get_or_create_collection(&self, name: &str) -> RagResult<CollectionHandle> {
        self.write()?.entry(name.to_string()).or_default();
        Ok(CollectionHandle::new(name))
    }

    async fn delete_collection(&self, name: &str) -> RagResult<()> {
        self.write()?.remove(name);
        Ok(())
    }

    async fn add_chunks(&self, collection: &CollectionHandle, chunks: &[Chunk]) -> RagResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(RagError::Embedding)?;
        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(anyhow::anyhow!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let mut guard = self.write()?;
        let stored = guard.get_mut(&collection.name).ok_or_else(|| {
            RagError::Store(anyhow::anyhow!("collection '{}' does not exist", collection.name))
        })?;
        stored.extend(
            chunks
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| StoredChunk { chunk, vector }),
        );
        Ok(())
    }

    async fn search(
        &self,
        collection: &CollectionHandle,
        query: &str,
        k: usize,
        score_threshold: Option<f32>,
    ) -> RagResult<Vec<ScoredChunk>> {
        let query_vec = self
            .embedder
            .embed_query(query)
            .await
            .map_err(RagError::Embedding)?;

        let guard = self.read()?;
        let candidates: Vec<ScoredChunk> = guard
            .get(&collection.name)
            .map(|stored| {
                stored
                    .iter()
                    .map(|sc| ScoredChunk {
                        chunk: sc.chunk.clone(),
                        score: cosine_similarity(&query_vec, &sc.vector),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rank(candidates, k, score_threshold))
    }

    async fn contains_fingerprint(
        &self,
        collection: &CollectionHandle,
        fingerprint: &str,
    ) -> RagResult<bool> {
        Ok(self
            .read()?
            .get(&collection.name)
            .map(|stored| {
                stored
                    .iter()
                    .any(|sc| sc.chunk.fingerprint() == Some(fingerprint))
            })
            .unwrap_or(false))
    }

    async fn count(&self, collection: &CollectionHandle) -> RagResult<usize> {
        Ok(self
            .read()?
            .get(&collection.name)
            .map(|stored| stored.len())
            .unwrap_or(0))
    }
}
