//! Ingestion pipeline: load → validate → chunk → tag → store.
//!
//! ```text
//! IngestRequest ─▶ fingerprint ─▶ dedup? ─▶ LoaderRegistry ─▶ validate
//!                                                                 │
//!          KnowledgeStore::add_chunks ◀── renumber ◀── Chunker (per document,
//!                                                       on the blocking pool)
//! ```
//!
//! Every chunk carries the caller's metadata plus `source`, `fingerprint`,
//! `source_kind`, and `chunk_index`. The whole batch is handed to the store
//! in one call, so a failure at any step leaves the collection unchanged.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde_json::json;

use agentkb_core::chunk::{renumber, Chunker};
use agentkb_core::fingerprint::fingerprint;
use agentkb_core::models::{
    Chunk, CollectionHandle, IngestRequest, IngestResult, Metadata, SourceDocument, SourceKind,
    META_FINGERPRINT, META_SOURCE, META_SOURCE_KIND,
};
use agentkb_core::store::KnowledgeStore;
use agentkb_core::validate::validate_documents;
use agentkb_core::{RagError, RagResult};

use crate::loader::LoaderRegistry;

pub struct IngestionPipeline {
    loaders: LoaderRegistry,
    chunker: Chunker,
    store: Arc<dyn KnowledgeStore>,
    workers: usize,
    dedup: bool,
}

impl IngestionPipeline {
    pub fn new(
        loaders: LoaderRegistry,
        chunker: Chunker,
        store: Arc<dyn KnowledgeStore>,
        workers: usize,
        dedup: bool,
    ) -> Self {
        Self {
            loaders,
            chunker,
            store,
            workers: workers.max(1),
            dedup,
        }
    }

    /// Ingest one source into `collection`.
    ///
    /// Failures are logged and returned as [`RagError::Ingestion`].
    pub async fn ingest(
        &self,
        collection: &CollectionHandle,
        request: &IngestRequest,
    ) -> RagResult<IngestResult> {
        let fp = fingerprint(&request.source_ref);
        let label = source_label(request, &fp);
        let started = Instant::now();

        match self.run(collection, request, fp, &label).await {
            Ok(result) => {
                tracing::info!(
                    source = %result.source,
                    collection = %collection.name,
                    kind = %request.kind,
                    chunks = result.chunk_count,
                    duplicate = result.duplicate,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "ingested source"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::error!(
                    source = %label,
                    collection = %collection.name,
                    kind = %request.kind,
                    error = %e,
                    "ingestion failed"
                );
                Err(RagError::ingestion(&label, &collection.name, e))
            }
        }
    }

    async fn run(
        &self,
        collection: &CollectionHandle,
        request: &IngestRequest,
        fp: String,
        label: &str,
    ) -> RagResult<IngestResult> {
        let extra = chunk_metadata(request, &fp, label);
        let source = extra
            .get(META_SOURCE)
            .and_then(|v| v.as_str())
            .unwrap_or(label)
            .to_string();

        if self.dedup && self.store.contains_fingerprint(collection, &fp).await? {
            tracing::info!(
                source = %source,
                collection = %collection.name,
                "fingerprint already indexed; skipping"
            );
            return Ok(IngestResult {
                fingerprint: fp,
                chunk_count: 0,
                kind: request.kind,
                source,
                metadata: extra,
                duplicate: true,
            });
        }

        let docs = self.loaders.load(&request.source_ref, request.kind).await?;
        validate_documents(label, &docs)?;
        tracing::debug!(source = %source, documents = docs.len(), "loaded source");

        let chunks = self.chunk_all(docs, &extra).await;
        if chunks.is_empty() {
            tracing::warn!(source = %source, "source produced no chunks");
        } else {
            self.store.add_chunks(collection, &chunks).await?;
        }

        Ok(IngestResult {
            fingerprint: fp,
            chunk_count: chunks.len(),
            kind: request.kind,
            source,
            metadata: extra,
            duplicate: false,
        })
    }

    /// Chunk documents on up to `workers` blocking threads, keeping document order.
    async fn chunk_all(&self, docs: Vec<SourceDocument>, extra: &Metadata) -> Vec<Chunk> {
        let chunker = self.chunker;
        let extra = Arc::new(extra.clone());

        let mut per_doc = stream::iter(docs.into_iter().map(|doc| {
            let extra = Arc::clone(&extra);
            tokio::task::spawn_blocking(move || chunker.split_document(&doc, &extra))
        }))
        .buffered(self.workers);

        let mut chunks = Vec::new();
        while let Some(joined) = per_doc.next().await {
            match joined {
                Ok(doc_chunks) => chunks.extend(doc_chunks),
                Err(e) => std::panic::resume_unwind(e.into_panic()),
            }
        }
        renumber(&mut chunks);
        chunks
    }
}

/// Provenance label for a source.
///
/// Web and PDF sources are labelled by their reference. Text sources are
/// labelled `text-{title}`, or `text-` plus the first 12 fingerprint chars
/// when untitled.
pub fn source_label(request: &IngestRequest, fingerprint: &str) -> String {
    match request.kind {
        SourceKind::Web | SourceKind::Pdf => request.source_ref.clone(),
        SourceKind::Text => match request.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => format!("text-{}", title),
            _ => format!("text-{}", &fingerprint[..12.min(fingerprint.len())]),
        },
    }
}

/// Metadata stamped on every chunk of this request.
///
/// Caller metadata, then defaults for `source` and `title`, then the
/// pipeline-owned `fingerprint` and `source_kind`.
fn chunk_metadata(request: &IngestRequest, fingerprint: &str, label: &str) -> Metadata {
    let mut extra = request.metadata.clone();
    extra
        .entry(META_SOURCE.to_string())
        .or_insert_with(|| json!(label));
    if let Some(title) = &request.title {
        extra
            .entry("title".to_string())
            .or_insert_with(|| json!(title));
    }
    extra.insert(META_FINGERPRINT.to_string(), json!(fingerprint));
    extra.insert(META_SOURCE_KIND.to_string(), json!(request.kind.as_str()));
    extra
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_labels() {
        let fp = fingerprint("The sky is blue.");
        let titled = IngestRequest::new("The sky is blue.", SourceKind::Text).with_title("sky");
        assert_eq!(source_label(&titled, &fp), "text-sky");

        let untitled = IngestRequest::new("The sky is blue.", SourceKind::Text);
        assert_eq!(source_label(&untitled, &fp), format!("text-{}", &fp[..12]));

        let web = IngestRequest::new("https://example.com/a", SourceKind::Web);
        assert_eq!(source_label(&web, "ignored"), "https://example.com/a");
    }

    #[test]
    fn test_pipeline_keys_win_over_caller() {
        let mut caller = Metadata::new();
        caller.insert("fingerprint".into(), json!("spoofed"));
        caller.insert("team".into(), json!("search"));
        let request = IngestRequest::new("x", SourceKind::Text)
            .with_title("t")
            .with_metadata(caller);

        let meta = chunk_metadata(&request, "abc", "text-t");
        assert_eq!(meta["fingerprint"], json!("abc"));
        assert_eq!(meta["source_kind"], json!("text"));
        assert_eq!(meta["source"], json!("text-t"));
        assert_eq!(meta["title"], json!("t"));
        assert_eq!(meta["team"], json!("search"));
    }

    #[test]
    fn test_caller_source_is_kept() {
        let mut caller = Metadata::new();
        caller.insert("source".into(), json!("handbook"));
        let request = IngestRequest::new("x", SourceKind::Text).with_metadata(caller);
        let meta = chunk_metadata(&request, "abc", "text-abc");
        assert_eq!(meta["source"], json!("handbook"));
    }
}
