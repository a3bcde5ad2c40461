//! PDF loading from disk, and PDF ingestion through the pipeline.

mod common;

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use agentkb::ingest::IngestionPipeline;
use agentkb::loader::{LoaderRegistry, PdfLoader, SourceLoader};
use agentkb_core::chunk::Chunker;
use agentkb_core::models::{IngestRequest, SourceKind};
use agentkb_core::store::memory::InMemoryStore;
use agentkb_core::store::KnowledgeStore;
use agentkb_core::RagError;

use common::HashEmbedder;

/// One-page PDF whose content stream draws `phrase` in Helvetica.
fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn write_pdf(dir: &Path, name: &str, phrase: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, minimal_pdf(phrase)).unwrap();
    path.to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_pdf_loader_one_document_per_page() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = write_pdf(tmp.path(), "sky.pdf", "the sky is blue");

    let docs = PdfLoader::new(1024 * 1024).load(&path).await.unwrap();

    assert_eq!(docs.len(), 1);
    assert!(docs[0].text.contains("the sky is blue"));
    assert_eq!(docs[0].metadata["source"], json!(path));
    assert_eq!(docs[0].metadata["page"], json!(0));
}

#[tokio::test]
async fn test_corrupt_pdf_is_load_failure() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("broken.pdf");
    std::fs::write(&path, b"%PDF-1.4\nthis is not really a pdf").unwrap();

    let mut loaders = LoaderRegistry::empty();
    loaders.register(SourceKind::Pdf, Box::new(PdfLoader::new(1024 * 1024)));
    let err = loaders
        .load(path.to_str().unwrap(), SourceKind::Pdf)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::LoadFailure { .. }));
}

#[tokio::test]
async fn test_pdf_ingest_labels_chunks_with_path() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = write_pdf(tmp.path(), "notes.pdf", "rust ownership rules");

    let store = Arc::new(InMemoryStore::new(Arc::new(HashEmbedder)));
    let handle = store.get_or_create_collection("agent-pdf").await.unwrap();
    let mut loaders = LoaderRegistry::empty();
    loaders.register(SourceKind::Pdf, Box::new(PdfLoader::new(1024 * 1024)));
    let pipeline = IngestionPipeline::new(
        loaders,
        Chunker::new(1000, 200).unwrap(),
        store.clone(),
        2,
        true,
    );

    let result = pipeline
        .ingest(&handle, &IngestRequest::new(path.clone(), SourceKind::Pdf))
        .await
        .unwrap();
    assert_eq!(result.source, path);
    assert_eq!(result.chunk_count, 1);

    let hits = store.search(&handle, "ownership", 1, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].chunk.text.contains("rust ownership rules"));
    assert_eq!(hits[0].chunk.metadata["page"], json!(0));
    assert_eq!(hits[0].chunk.metadata["source_kind"], json!("pdf"));
}
