//! SQLite-backed [`KnowledgeStore`].
//!
//! Each collection is a row in `collections`; its chunks live in
//! `kb_chunks` with the embedding stored as a little-endian f32 BLOB.
//! Search loads the collection's vectors and ranks them by cosine
//! similarity in process.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use agentkb_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingFunction};
use agentkb_core::models::{Chunk, CollectionHandle, Metadata, ScoredChunk};
use agentkb_core::store::{rank, KnowledgeStore};
use agentkb_core::{RagError, RagResult};

pub struct SqliteStore {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingFunction>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn EmbeddingFunction>) -> Self {
        Self { pool, embedder }
    }

    async fn insert_batch(
        &self,
        collection: &CollectionHandle,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let model = self.embedder.model_name();
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO kb_chunks (id, collection, chunk_index, text, hash, fingerprint,
                                       metadata_json, model, dims, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&collection.name)
            .bind(chunk.index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(chunk.fingerprint())
            .bind(serde_json::to_string(&chunk.metadata)?)
            .bind(model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_scored(
        &self,
        collection: &CollectionHandle,
        query_vec: &[f32],
    ) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, chunk_index, text, hash, metadata_json, embedding
            FROM kb_chunks
            WHERE collection = ?
            ORDER BY created_at, chunk_index
            "#,
        )
        .bind(&collection.name)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata = serde_json::from_str(&metadata_json)?;
            let blob: Vec<u8> = row.get("embedding");
            scored.push(ScoredChunk {
                score: cosine_similarity(query_vec, &blob_to_vec(&blob)),
                chunk: Chunk {
                    id: row.get("id"),
                    index: row.get("chunk_index"),
                    text: row.get("text"),
                    hash: row.get("hash"),
                    metadata,
                },
            });
        }
        Ok(scored)
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn get_or_create_collection(&self, name: &str) -> RagResult<CollectionHandle> {
        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| RagError::Store(e.into()))?;
        Ok(CollectionHandle::new(name))
    }

    async fn delete_collection(&self, name: &str) -> RagResult<()> {
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| RagError::Store(e.into()))?;
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

        self.insert_batch(collection, chunks, &vectors)
            .await
            .map_err(RagError::Store)
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
        let scored = self
            .load_scored(collection, &query_vec)
            .await
            .map_err(RagError::Store)?;
        Ok(rank(scored, k, score_threshold))
    }

    async fn contains_fingerprint(
        &self,
        collection: &CollectionHandle,
        fingerprint: &str,
    ) -> RagResult<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM kb_chunks WHERE collection = ? AND fingerprint = ?)",
        )
        .bind(&collection.name)
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RagError::Store(e.into()))?;
        Ok(found)
    }

    async fn count(&self, collection: &CollectionHandle) -> RagResult<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kb_chunks WHERE collection = ?")
            .bind(&collection.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RagError::Store(e.into()))?;
        Ok(n as usize)
    }
}
