//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/v1/agents` | Create an agent |
//! | `GET`  | `/api/v1/agents` | List agents |
//! | `GET`, `PATCH`, `DELETE` | `/api/v1/agents/{agent_id}` | Fetch, update, or delete an agent |
//! | `POST`, `GET` | `/api/v1/agents/{agent_id}/chats` | Create or list chats |
//! | `GET`, `PATCH`, `DELETE` | `/api/v1/agents/{agent_id}/chats/{chat_id}` | Fetch (with turns), update, or delete a chat |
//! | `POST` | `/api/v1/agents/{agent_id}/ingest` | Ingest a web, pdf, or text source |
//! | `POST` | `/api/v1/agents/{agent_id}/ask` | Ask a question |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "empty_query", "message": "query must not be empty" } }
//! ```
//!
//! Client errors (unsupported kind, empty query, empty load, invalid input,
//! malformed request bodies) are 400, missing agents and chats 404, upstream failures (loading,
//! embedding, generation) 502, and everything else 500.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use agentkb_core::models::{Agent, Chat, IngestRequest, Metadata, SourceKind};
use agentkb_core::RagError;

use crate::config::Config;
use crate::service::RagService;

/// Build the router over a shared service.
pub fn router(service: Arc<RagService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/agents", post(create_agent).get(list_agents))
        .route(
            "/api/v1/agents/{agent_id}",
            get(get_agent).patch(update_agent).delete(delete_agent),
        )
        .route(
            "/api/v1/agents/{agent_id}/chats",
            post(create_chat).get(list_chats),
        )
        .route(
            "/api/v1/agents/{agent_id}/chats/{chat_id}",
            get(get_chat).patch(update_chat).delete(delete_chat),
        )
        .route("/api/v1/agents/{agent_id}/ingest", post(ingest))
        .route("/api/v1/agents/{agent_id}/ask", post(ask))
        .layer(cors)
        .with_state(service)
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(RagService::from_config(config).await?);
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "HTTP server listening");
    println!("agentkb server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

type AppState = State<Arc<RagService>>;

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match err.root() {
            RagError::UnsupportedSourceKind(_)
            | RagError::EmptyQuery
            | RagError::EmptyResult { .. }
            | RagError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RagError::AgentNotFound(_) | RagError::ChatNotFound(_) => StatusCode::NOT_FOUND,
            RagError::LoadFailure { .. } | RagError::Embedding(_) | RagError::Generation(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request".to_string(),
            message: rejection.body_text(),
        }
    }
}

/// A JSON request body whose rejection renders as the standard error body.
type Body<T> = Result<Json<T>, JsonRejection>;

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Agents ============

#[derive(Deserialize)]
struct CreateAgentBody {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

async fn create_agent(
    State(service): AppState,
    body: Body<CreateAgentBody>,
) -> Result<(StatusCode, Json<Agent>), AppError> {
    let Json(body) = body?;
    let agent = service
        .create_agent(&body.name, body.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn list_agents(State(service): AppState) -> Result<Json<Vec<Agent>>, AppError> {
    Ok(Json(service.list_agents().await?))
}

async fn get_agent(
    State(service): AppState,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(service.get_agent(&agent_id).await?))
}

#[derive(Deserialize)]
struct UpdateAgentBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

async fn update_agent(
    State(service): AppState,
    Path(agent_id): Path<String>,
    body: Body<UpdateAgentBody>,
) -> Result<Json<Agent>, AppError> {
    let Json(body) = body?;
    let agent = service
        .update_agent(&agent_id, body.name.as_deref(), body.description.as_deref())
        .await?;
    Ok(Json(agent))
}

async fn delete_agent(
    State(service): AppState,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, AppError> {
    service.delete_agent(&agent_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Chats ============

#[derive(Deserialize)]
struct CreateChatBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

async fn create_chat(
    State(service): AppState,
    Path(agent_id): Path<String>,
    body: Body<CreateChatBody>,
) -> Result<(StatusCode, Json<Chat>), AppError> {
    let Json(body) = body?;
    let chat = service
        .create_chat(&agent_id, body.title.as_deref(), body.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn list_chats(
    State(service): AppState,
    Path(agent_id): Path<String>,
) -> Result<Json<Vec<Chat>>, AppError> {
    Ok(Json(service.list_chats(&agent_id).await?))
}

async fn get_chat(
    State(service): AppState,
    Path((agent_id, chat_id)): Path<(String, String)>,
) -> Result<Json<Chat>, AppError> {
    Ok(Json(service.get_chat(&agent_id, &chat_id).await?))
}

#[derive(Deserialize)]
struct UpdateChatBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

async fn update_chat(
    State(service): AppState,
    Path((agent_id, chat_id)): Path<(String, String)>,
    body: Body<UpdateChatBody>,
) -> Result<Json<Chat>, AppError> {
    let Json(body) = body?;
    let chat = service
        .update_chat(&agent_id, &chat_id, body.title.as_deref(), body.metadata)
        .await?;
    Ok(Json(chat))
}

async fn delete_chat(
    State(service): AppState,
    Path((agent_id, chat_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    service.delete_chat(&agent_id, &chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestBody {
    source: String,
    source_type: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Serialize)]
struct IngestResponse {
    success: bool,
    source: String,
    document_fingerprint: String,
    chunk_count: usize,
    duplicate: bool,
}

async fn ingest(
    State(service): AppState,
    Path(agent_id): Path<String>,
    body: Body<IngestBody>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(body) = body?;
    let kind: SourceKind = body.source_type.parse()?;
    let mut request = IngestRequest::new(body.source, kind).with_metadata(body.metadata);
    if let Some(title) = body.title {
        request = request.with_title(title);
    }

    let result = service.ingest(&agent_id, request).await?;
    Ok(Json(IngestResponse {
        success: true,
        source: result.source,
        document_fingerprint: result.fingerprint,
        chunk_count: result.chunk_count,
        duplicate: result.duplicate,
    }))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskBody {
    question: String,
    #[serde(default)]
    chat_id: Option<String>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<String>,
    metadata: Metadata,
    confidence: f64,
}

async fn ask(
    State(service): AppState,
    Path(agent_id): Path<String>,
    body: Body<AskBody>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(body) = body?;
    let answer = service
        .ask(&agent_id, body.chat_id.as_deref(), &body.question)
        .await?;
    Ok(Json(AskResponse {
        answer: answer.answer,
        sources: answer.sources,
        metadata: answer.metadata,
        confidence: answer.confidence,
    }))
}
