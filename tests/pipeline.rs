//! End-to-end ingestion and answering over the in-memory store.
//!
//! Loaders, embedder, and model are fakes, so these tests need no network.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use agentkb::ingest::IngestionPipeline;
use agentkb::loader::{LoaderRegistry, SourceLoader, TextLoader};
use agentkb_core::answer::{RetrievalAugmentedAnswerer, RetrievalParams};
use agentkb_core::chunk::Chunker;
use agentkb_core::fingerprint::fingerprint;
use agentkb_core::generation::GenerationParams;
use agentkb_core::models::{
    CollectionHandle, IngestRequest, Metadata, SourceDocument, SourceKind,
};
use agentkb_core::store::memory::InMemoryStore;
use agentkb_core::store::KnowledgeStore;
use agentkb_core::RagError;

use common::{FailingEmbedder, HashEmbedder, RecordingModel};

/// Returns no documents for any reference.
struct NothingLoader;

#[async_trait]
impl SourceLoader for NothingLoader {
    async fn load(&self, _source_ref: &str) -> anyhow::Result<Vec<SourceDocument>> {
        Ok(Vec::new())
    }
}

/// Returns `pages` documents, each long enough to need several chunks.
struct PagedLoader {
    pages: usize,
}

#[async_trait]
impl SourceLoader for PagedLoader {
    async fn load(&self, source_ref: &str) -> anyhow::Result<Vec<SourceDocument>> {
        Ok((0..self.pages)
            .map(|page| {
                let mut metadata = Metadata::new();
                metadata.insert("source".into(), json!(source_ref));
                metadata.insert("page".into(), json!(page));
                let text = format!("Page {page} talks about topic {page}. ").repeat(6);
                SourceDocument::new(text, metadata)
            })
            .collect())
    }
}

fn text_registry() -> LoaderRegistry {
    let mut loaders = LoaderRegistry::empty();
    loaders.register(SourceKind::Text, Box::new(TextLoader));
    loaders
}

async fn setup(
    loaders: LoaderRegistry,
    chunker: Chunker,
    dedup: bool,
) -> (Arc<InMemoryStore>, IngestionPipeline, CollectionHandle) {
    let store = Arc::new(InMemoryStore::new(Arc::new(HashEmbedder)));
    let handle = store.get_or_create_collection("agent-test").await.unwrap();
    let pipeline = IngestionPipeline::new(
        loaders,
        chunker,
        store.clone() as Arc<dyn KnowledgeStore>,
        2,
        dedup,
    );
    (store, pipeline, handle)
}

#[tokio::test]
async fn test_ingest_short_text_is_one_chunk() {
    let (store, pipeline, handle) = setup(text_registry(), Chunker::new(1000, 200).unwrap(), true).await;

    let request = IngestRequest::new("The sky is blue.", SourceKind::Text).with_title("sky");
    let result = pipeline.ingest(&handle, &request).await.unwrap();

    assert_eq!(result.chunk_count, 1);
    assert_eq!(result.source, "text-sky");
    assert_eq!(result.fingerprint, fingerprint("The sky is blue."));
    assert!(!result.duplicate);
    assert_eq!(store.count(&handle).await.unwrap(), 1);

    let hits = store.search(&handle, "sky", 5, None).await.unwrap();
    let chunk = &hits[0].chunk;
    assert_eq!(chunk.text, "The sky is blue.");
    assert_eq!(chunk.metadata["source"], json!("text-sky"));
    assert_eq!(chunk.metadata["title"], json!("sky"));
    assert_eq!(chunk.metadata["source_kind"], json!("text"));
    assert_eq!(chunk.metadata["chunk_index"], json!(0));
    assert_eq!(chunk.metadata["fingerprint"], json!(result.fingerprint));
}

#[tokio::test]
async fn test_ingest_then_ask_cites_source() {
    let (store, pipeline, handle) = setup(text_registry(), Chunker::new(1000, 200).unwrap(), true).await;
    pipeline
        .ingest(
            &handle,
            &IngestRequest::new("The sky is blue.", SourceKind::Text).with_title("sky"),
        )
        .await
        .unwrap();

    let model = RecordingModel::new("The sky is blue.");
    let answerer = RetrievalAugmentedAnswerer::new(
        store.clone(),
        model.clone(),
        RetrievalParams::default(),
        GenerationParams::default(),
    );
    let answer = answerer.answer("What color is the sky?", &handle).await.unwrap();

    assert_eq!(answer.answer, "The sky is blue.");
    assert_eq!(answer.sources, vec!["text-sky".to_string()]);
    assert!(answer.confidence > 0.5 && answer.confidence < 1.0);
    assert_eq!(answer.metadata["model"], json!("recording-model"));
    assert_eq!(answer.metadata["source_count"], json!(1));

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Question: What color is the sky?"));
    assert!(prompts[0].contains("The sky is blue."));
}

#[tokio::test]
async fn test_reingest_with_dedup_is_skipped() {
    let (store, pipeline, handle) = setup(text_registry(), Chunker::new(1000, 200).unwrap(), true).await;
    let request = IngestRequest::new("The sky is blue.", SourceKind::Text);

    let first = pipeline.ingest(&handle, &request).await.unwrap();
    let second = pipeline.ingest(&handle, &request).await.unwrap();

    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(second.chunk_count, 0);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.source, second.source);
    assert_eq!(store.count(&handle).await.unwrap(), 1);
}

#[tokio::test]
async fn test_reingest_without_dedup_is_stable() {
    let (store, pipeline, handle) = setup(text_registry(), Chunker::new(20, 5).unwrap(), false).await;
    let request = IngestRequest::new(
        "Rust is fast. Rust is safe. Rust has great tooling.",
        SourceKind::Text,
    );

    let first = pipeline.ingest(&handle, &request).await.unwrap();
    let second = pipeline.ingest(&handle, &request).await.unwrap();

    assert!(first.chunk_count > 1);
    assert_eq!(first.chunk_count, second.chunk_count);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert!(first.source.starts_with("text-"));
    assert_eq!(first.source.len(), "text-".len() + 12);
    assert_eq!(store.count(&handle).await.unwrap(), first.chunk_count * 2);
}

#[tokio::test]
async fn test_empty_load_is_rejected() {
    let mut loaders = LoaderRegistry::empty();
    loaders.register(SourceKind::Web, Box::new(NothingLoader));
    let (store, pipeline, handle) = setup(loaders, Chunker::new(1000, 200).unwrap(), true).await;

    let err = pipeline
        .ingest(&handle, &IngestRequest::new("https://example.com/empty", SourceKind::Web))
        .await
        .unwrap_err();

    match &err {
        RagError::Ingestion {
            source_ref,
            collection,
            ..
        } => {
            assert_eq!(source_ref, "https://example.com/empty");
            assert_eq!(collection, "agent-test");
        }
        other => panic!("expected ingestion error, got {other:?}"),
    }
    assert!(matches!(err.root(), RagError::EmptyResult { .. }));
    assert_eq!(err.code(), "empty_result");
    assert_eq!(store.count(&handle).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unregistered_kind_is_unsupported() {
    let (_store, pipeline, handle) = setup(text_registry(), Chunker::new(1000, 200).unwrap(), true).await;

    let err = pipeline
        .ingest(&handle, &IngestRequest::new("/tmp/doc.pdf", SourceKind::Pdf))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), RagError::UnsupportedSourceKind(k) if k == "pdf"));

    let err = "docx".parse::<SourceKind>().unwrap_err();
    assert!(matches!(err, RagError::UnsupportedSourceKind(_)));
}

#[tokio::test]
async fn test_multi_document_chunks_keep_document_order() {
    let mut loaders = LoaderRegistry::empty();
    loaders.register(SourceKind::Pdf, Box::new(PagedLoader { pages: 5 }));
    let (store, pipeline, handle) = setup(loaders, Chunker::new(60, 10).unwrap(), true).await;

    let mut tags = Metadata::new();
    tags.insert("team".into(), json!("docs"));
    let request = IngestRequest::new("/srv/manual.pdf", SourceKind::Pdf).with_metadata(tags);
    let result = pipeline.ingest(&handle, &request).await.unwrap();

    assert_eq!(result.source, "/srv/manual.pdf");
    assert!(result.chunk_count > 5);

    let mut chunks: Vec<_> = store
        .search(&handle, "page topic", 1000, None)
        .await
        .unwrap()
        .into_iter()
        .map(|hit| hit.chunk)
        .collect();
    chunks.sort_by_key(|c| c.index);

    assert_eq!(chunks.len(), result.chunk_count);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, i as i64);
        assert_eq!(chunk.metadata["chunk_index"], json!(i));
        assert_eq!(chunk.metadata["team"], json!("docs"));
        assert_eq!(chunk.metadata["source_kind"], json!("pdf"));
        assert_eq!(chunk.metadata["source"], json!("/srv/manual.pdf"));
    }
    let pages: Vec<u64> = chunks
        .iter()
        .map(|c| c.metadata["page"].as_u64().unwrap())
        .collect();
    assert!(pages.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(pages.first(), Some(&0));
    assert_eq!(pages.last(), Some(&4));
}

#[tokio::test]
async fn test_embedding_failure_leaves_collection_unchanged() {
    let store = Arc::new(InMemoryStore::new(Arc::new(FailingEmbedder)));
    let handle = store.get_or_create_collection("agent-test").await.unwrap();
    let pipeline = IngestionPipeline::new(
        text_registry(),
        Chunker::new(1000, 200).unwrap(),
        store.clone(),
        1,
        true,
    );

    let err = pipeline
        .ingest(&handle, &IngestRequest::new("The sky is blue.", SourceKind::Text))
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::Ingestion { .. }));
    assert!(matches!(err.root(), RagError::Embedding(_)));
    assert_eq!(store.count(&handle).await.unwrap(), 0);
}

#[tokio::test]
async fn test_blank_question_is_rejected_before_generation() {
    let (store, _pipeline, handle) = setup(text_registry(), Chunker::new(1000, 200).unwrap(), true).await;
    let model = RecordingModel::new("unused");
    let answerer = RetrievalAugmentedAnswerer::new(
        store,
        model.clone(),
        RetrievalParams::default(),
        GenerationParams::default(),
    );

    let err = answerer.answer("   \n", &handle).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyQuery));
    assert!(model.prompts().is_empty());
}
