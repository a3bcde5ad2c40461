//! Core data models shared by the ingestion and answering pipelines.
//!
//! These types are plain data: documents produced by loaders, chunks handed
//! to the knowledge store, chat turns fed to the context builder, and the
//! result objects returned to the endpoint layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Free-form JSON metadata attached to documents and chunks.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the provenance label of a chunk.
pub const META_SOURCE: &str = "source";
/// Metadata key holding the document fingerprint.
pub const META_FINGERPRINT: &str = "fingerprint";
/// Metadata key holding the source kind (`web`, `pdf`, `text`).
pub const META_SOURCE_KIND: &str = "source_kind";
/// Metadata key holding the chunk's position within its ingestion batch.
pub const META_CHUNK_INDEX: &str = "chunk_index";

/// The kind of source an ingestion request points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// An HTTP(S) URL to fetch and reduce to text.
    Web,
    /// A local PDF file path.
    Pdf,
    /// The raw text itself.
    Text,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Web => "web",
            SourceKind::Pdf => "pdf",
            SourceKind::Text => "text",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(SourceKind::Web),
            "pdf" => Ok(SourceKind::Pdf),
            "text" => Ok(SourceKind::Text),
            _ => Err(RagError::UnsupportedSourceKind(s.to_string())),
        }
    }
}

/// A loaded document before chunking. Never persisted as a unit.
#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub text: String,
    pub metadata: Metadata,
}

impl SourceDocument {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// A bounded slice of document text plus merged metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Position within the ingestion batch (contiguous from 0).
    pub index: i64,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    pub metadata: Metadata,
}

impl Chunk {
    /// The `source` metadata value, if present and a string.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE).and_then(|v| v.as_str())
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.metadata.get(META_FINGERPRINT).and_then(|v| v.as_str())
    }
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity (higher is more similar).
    pub score: f32,
}

/// Handle to one agent's vector collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionHandle {
    pub name: String,
}

impl CollectionHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            "system" => Ok(ChatRole::System),
            other => Err(RagError::InvalidInput(format!(
                "role must be one of user, assistant, system (got '{}')",
                other
            ))),
        }
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A tenant with its own knowledge base and chats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Knowledge-base handle: the vector collection name.
    pub collection: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Collection name for an agent id. Stable for the agent's lifetime.
    pub fn collection_for(agent_id: &str) -> String {
        format!("agent-{}", agent_id)
    }
}

/// A conversation scoped to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub agent_id: String,
    pub title: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub turns: Vec<ChatTurn>,
}

/// An ingestion request for one source.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source_ref: String,
    pub kind: SourceKind,
    /// Caller-supplied tags merged into every chunk.
    pub metadata: Metadata,
    /// Optional human title; used to label raw-text sources.
    pub title: Option<String>,
}

impl IngestRequest {
    pub fn new(source_ref: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            source_ref: source_ref.into(),
            kind,
            metadata: Metadata::new(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Outcome of one ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub fingerprint: String,
    pub chunk_count: usize,
    pub kind: SourceKind,
    /// Provenance label stamped on every chunk.
    pub source: String,
    pub metadata: Metadata,
    /// True when the dedup hook found the fingerprint already indexed.
    pub duplicate: bool,
}

/// Answer produced by the retrieval-augmented answerer.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalAnswer {
    pub answer: String,
    pub sources: Vec<String>,
    pub metadata: Metadata,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}
