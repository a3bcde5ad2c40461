//! Error taxonomy for the ingestion and answering pipelines.
//!
//! Collaborators (loaders, embedders, stores, language models) report
//! failures as [`anyhow::Error`]; the pipeline wraps them into the typed
//! variant for the step that failed, adding the source reference and the
//! collection so callers can tell what broke and where.

use thiserror::Error;

/// Result alias used by the pipeline-level APIs.
pub type RagResult<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// The requested source kind has no loader (or is not a known kind at all).
    #[error("unsupported source kind: '{0}'. Must be web, pdf, or text")]
    UnsupportedSourceKind(String),

    /// Network or file I/O failed while loading a source.
    #[error("failed to load '{source_ref}': {cause}")]
    LoadFailure {
        source_ref: String,
        #[source]
        cause: anyhow::Error,
    },

    /// A loader completed but produced zero documents.
    #[error("no documents were loaded from '{source_ref}'")]
    EmptyResult { source_ref: String },

    /// Invalid static configuration (chunk size, overlap, provider settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding collaborator failed after exhausting its retries.
    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),

    /// The knowledge store failed to read or write.
    #[error("knowledge store error: {0}")]
    Store(#[source] anyhow::Error),

    /// The agent/chat database failed.
    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),

    /// The generation collaborator failed.
    #[error("generation failed: {0}")]
    Generation(#[source] anyhow::Error),

    /// The question (after chat-history augmentation) was blank.
    #[error("query must not be empty")]
    EmptyQuery,

    /// Any failure during ingestion, carrying the step's error.
    #[error("ingestion of '{source_ref}' into '{collection}' failed: {cause}")]
    Ingestion {
        source_ref: String,
        collection: String,
        #[source]
        cause: Box<RagError>,
    },

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("chat not found: {0}")]
    ChatNotFound(String),

    /// A request field failed validation (bad role, empty name, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RagError {
    /// Wrap a step failure as an [`RagError::Ingestion`].
    ///
    /// Already-wrapped errors are returned unchanged so the cause chain
    /// never nests two ingestion layers.
    pub fn ingestion(source_ref: &str, collection: &str, cause: RagError) -> Self {
        match cause {
            already @ RagError::Ingestion { .. } => already,
            cause => RagError::Ingestion {
                source_ref: source_ref.to_string(),
                collection: collection.to_string(),
                cause: Box::new(cause),
            },
        }
    }

    /// The innermost pipeline error, looking through [`RagError::Ingestion`].
    pub fn root(&self) -> &RagError {
        match self {
            RagError::Ingestion { cause, .. } => cause.root(),
            other => other,
        }
    }

    /// Short machine-readable code, used by the HTTP error body.
    pub fn code(&self) -> &'static str {
        match self.root() {
            RagError::UnsupportedSourceKind(_) => "unsupported_source_kind",
            RagError::LoadFailure { .. } => "load_failure",
            RagError::EmptyResult { .. } => "empty_result",
            RagError::Configuration(_) => "configuration",
            RagError::Embedding(_) => "embedding_failure",
            RagError::Store(_) => "store_failure",
            RagError::Database(_) => "database_failure",
            RagError::Generation(_) => "generation_failure",
            RagError::EmptyQuery => "empty_query",
            RagError::AgentNotFound(_) => "agent_not_found",
            RagError::ChatNotFound(_) => "chat_not_found",
            RagError::InvalidInput(_) => "bad_request",
            RagError::Ingestion { .. } => "ingestion_failure",
        }
    }
}
