//! Provider wire-format, retry, and web loader tests against a local mock
//! server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::HeaderMap,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use agentkb::config::{EmbeddingConfig, GenerationConfig, IngestionConfig};
use agentkb::embedding::create_embedder;
use agentkb::generation::create_model;
use agentkb::loader::{LoaderRegistry, SourceLoader, WebLoader};
use agentkb_core::generation::GenerationParams;
use agentkb_core::models::{SourceKind, META_SOURCE};
use agentkb_core::RagError;

#[derive(Default)]
struct Mock {
    calls: AtomicUsize,
    /// Number of initial calls answered with `fail_status`.
    failures: usize,
    fail_status: u16,
    dims: usize,
    last_body: Mutex<Option<Value>>,
    last_auth: Mutex<Option<String>>,
}

type Shared = Arc<Mock>;

fn record(mock: &Mock, headers: &HeaderMap, body: &Value) -> Result<(), StatusCode> {
    let n = mock.calls.fetch_add(1, Ordering::SeqCst);
    *mock.last_body.lock().unwrap() = Some(body.clone());
    *mock.last_auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if n < mock.failures {
        return Err(StatusCode::from_u16(mock.fail_status).unwrap());
    }
    Ok(())
}

async fn ollama_embed(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    record(&mock, &headers, &body)?;
    let inputs = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
    let embeddings: Vec<Vec<f32>> = (0..inputs)
        .map(|i| (0..mock.dims).map(|d| (i + d) as f32).collect())
        .collect();
    Ok(Json(json!({ "embeddings": embeddings })))
}

async fn chat_completions(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    record(&mock, &headers, &body)?;
    Ok(Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": " The sky is blue. " } }]
    })))
}

async fn ollama_generate(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    record(&mock, &headers, &body)?;
    Ok(Json(json!({ "response": "Blue.\n", "done": true })))
}

async fn spawn(mock: Mock) -> (String, Shared) {
    let mock = Arc::new(mock);
    let app = Router::new()
        .route("/api/embed", post(ollama_embed))
        .route("/api/generate", post(ollama_generate))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), mock)
}

fn ollama_embedding_config(url: &str, dims: usize) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: "ollama".to_string(),
        model: Some("nomic-embed-text".to_string()),
        dims: Some(dims),
        url: Some(url.to_string()),
        batch_size: 2,
        max_attempts: 3,
        backoff_ms: 1,
        ..EmbeddingConfig::default()
    }
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("text {i}")).collect()
}

#[tokio::test]
async fn test_ollama_embed_batches() {
    let (url, mock) = spawn(Mock {
        dims: 4,
        ..Mock::default()
    })
    .await;
    let embedder = create_embedder(&ollama_embedding_config(&url, 4)).unwrap();

    let vectors = embedder.embed(&texts(5)).await.unwrap();
    assert_eq!(vectors.len(), 5);
    assert!(vectors.iter().all(|v| v.len() == 4));
    // batch_size 2 → 3 requests
    assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
    let last = mock.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(last["model"], "nomic-embed-text");
    assert_eq!(last["input"], json!(["text 4"]));
}

#[tokio::test]
async fn test_ollama_embed_retries_server_errors() {
    let (url, mock) = spawn(Mock {
        failures: 2,
        fail_status: 500,
        dims: 4,
        ..Mock::default()
    })
    .await;
    let embedder = create_embedder(&ollama_embedding_config(&url, 4)).unwrap();

    let vectors = embedder.embed(&texts(1)).await.unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_ollama_embed_gives_up_after_max_attempts() {
    let (url, mock) = spawn(Mock {
        failures: 10,
        fail_status: 503,
        dims: 4,
        ..Mock::default()
    })
    .await;
    let embedder = create_embedder(&ollama_embedding_config(&url, 4)).unwrap();

    let err = embedder.embed(&texts(1)).await.unwrap_err();
    assert!(err.to_string().contains("503"));
    assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (url, mock) = spawn(Mock {
        failures: 10,
        fail_status: 400,
        dims: 4,
        ..Mock::default()
    })
    .await;
    let embedder = create_embedder(&ollama_embedding_config(&url, 4)).unwrap();

    assert!(embedder.embed(&texts(1)).await.is_err());
    assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let (url, mock) = spawn(Mock {
        failures: 1,
        fail_status: 429,
        dims: 4,
        ..Mock::default()
    })
    .await;
    let embedder = create_embedder(&ollama_embedding_config(&url, 4)).unwrap();

    assert!(embedder.embed(&texts(1)).await.is_ok());
    assert_eq!(mock.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dimension_mismatch_is_rejected() {
    let (url, _mock) = spawn(Mock {
        dims: 3,
        ..Mock::default()
    })
    .await;
    let embedder = create_embedder(&ollama_embedding_config(&url, 4)).unwrap();

    let err = embedder.embed(&texts(1)).await.unwrap_err();
    assert!(err.to_string().contains("dimensions"));
}

#[tokio::test]
async fn test_openai_compatible_chat_completion() {
    let (url, mock) = spawn(Mock::default()).await;
    let config = GenerationConfig {
        provider: "openai".to_string(),
        model: Some("gpt-4o-mini".to_string()),
        url: Some(format!("{url}/v1")),
        api_key_env: "AGENTKB_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
        ..GenerationConfig::default()
    };
    let model = create_model(&config).unwrap();

    let params = GenerationParams {
        max_tokens: 64,
        temperature: 0.2,
        top_p: 0.9,
    };
    let answer = model.complete("What color is the sky?", &params).await.unwrap();
    assert_eq!(answer, "The sky is blue.");

    let body = mock.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["max_tokens"], 64);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "What color is the sky?");
    assert!(mock.last_auth.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_generation_is_not_retried() {
    let (url, mock) = spawn(Mock {
        failures: 1,
        fail_status: 500,
        ..Mock::default()
    })
    .await;
    let config = GenerationConfig {
        provider: "ollama".to_string(),
        model: Some("llama3".to_string()),
        url: Some(url),
        ..GenerationConfig::default()
    };
    let model = create_model(&config).unwrap();

    assert!(model
        .complete("hi", &GenerationParams::default())
        .await
        .is_err());
    assert_eq!(mock.calls.load(Ordering::SeqCst), 1);

    let answer = model
        .complete("hi", &GenerationParams::default())
        .await
        .unwrap();
    assert_eq!(answer, "Blue.");
    let body = mock.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["num_predict"], 512);
}

// ============ Web loader ============

const PLAIN_BODY: &str = "raw <notes>\n\n  keep   spacing";

async fn spawn_site() -> String {
    let app = Router::new()
        .route(
            "/page",
            get(|| async {
                Html(
                    "<html><head><title> Pricing  Guide </title><style>p{}</style></head>\
                     <body><h1>Plans</h1><p>Pro costs &amp; more.</p></body></html>",
                )
            }),
        )
        .route("/notes.txt", get(|| async { PLAIN_BODY }))
        .route("/gone", get(|| async { StatusCode::NOT_FOUND }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_web_loader_reduces_html_and_records_metadata() {
    let base = spawn_site().await;
    let loader = WebLoader::new(&IngestionConfig::default()).unwrap();
    let url = format!("{}/page", base);

    let docs = loader.load(&url).await.unwrap();
    assert_eq!(docs.len(), 1);
    let doc = &docs[0];
    assert!(doc.text.contains("Plans"));
    assert!(doc.text.contains("Pro costs & more."));
    assert!(!doc.text.contains('<'));
    assert!(!doc.text.contains("p{}"));
    assert_eq!(doc.metadata[META_SOURCE], json!(url));
    assert_eq!(doc.metadata["title"], json!("Pricing Guide"));
    assert!(doc.metadata["content_type"]
        .as_str()
        .unwrap()
        .starts_with("text/html"));
}

#[tokio::test]
async fn test_web_loader_passes_non_html_through() {
    let base = spawn_site().await;
    let loader = WebLoader::new(&IngestionConfig::default()).unwrap();

    let docs = loader.load(&format!("{}/notes.txt", base)).await.unwrap();
    assert_eq!(docs[0].text, PLAIN_BODY);
    assert!(docs[0].metadata.get("title").is_none());
    assert!(docs[0].metadata["content_type"]
        .as_str()
        .unwrap()
        .starts_with("text/plain"));
}

#[tokio::test]
async fn test_web_loader_error_status_is_load_failure() {
    let base = spawn_site().await;
    let mut registry = LoaderRegistry::empty();
    registry.register(
        SourceKind::Web,
        Box::new(WebLoader::new(&IngestionConfig::default()).unwrap()),
    );
    let url = format!("{}/gone", base);

    let err = registry.load(&url, SourceKind::Web).await.unwrap_err();
    assert!(matches!(err, RagError::LoadFailure { ref source_ref, .. } if *source_ref == url));
}
