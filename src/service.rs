//! The application context: one [`RagService`] per process.
//!
//! Owns the database pool, the shared knowledge store, the ingestion
//! pipeline, the answerer, and the agent/chat repositories. The HTTP
//! handlers and CLI commands call into it; nothing else holds global state.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::RwLock;

use agentkb_core::answer::RetrievalAugmentedAnswerer;
use agentkb_core::chunk::Chunker;
use agentkb_core::context::build_context;
use agentkb_core::generation::GenerationModel;
use agentkb_core::models::{
    Agent, Chat, ChatRole, ChatTurn, CollectionHandle, IngestRequest, IngestResult, Metadata,
    RetrievalAnswer,
};
use agentkb_core::store::KnowledgeStore;
use agentkb_core::{RagError, RagResult};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::generation::create_model;
use crate::ingest::IngestionPipeline;
use crate::loader::LoaderRegistry;
use crate::migrate::migrate;
use crate::repository::{AgentRepository, ChatRepository};
use crate::sqlite_store::SqliteStore;

const DEFAULT_CHAT_TITLE: &str = "New chat";

pub struct RagService {
    store: Arc<dyn KnowledgeStore>,
    pipeline: IngestionPipeline,
    answerer: RetrievalAugmentedAnswerer,
    agents: AgentRepository,
    chats: ChatRepository,
    /// Agent id → collection handle, filled lazily.
    collections: RwLock<HashMap<String, CollectionHandle>>,
}

impl RagService {
    /// Build the production service: SQLite pool and store, configured
    /// embedding and generation providers, and the built-in loaders.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let pool = db::connect(config).await?;
        migrate(&pool).await?;

        let embedder = create_embedder(&config.embedding)?;
        let model = create_model(&config.generation)?;
        let store: Arc<dyn KnowledgeStore> = Arc::new(SqliteStore::new(pool.clone(), embedder));
        let loaders = LoaderRegistry::with_defaults(&config.ingestion)?;

        Ok(Self::new(config, pool, store, model, loaders)?)
    }

    /// Assemble a service from explicit collaborators.
    ///
    /// The pool must already be migrated. Fails with
    /// [`RagError::Configuration`] on invalid chunking parameters.
    pub fn new(
        config: &Config,
        pool: SqlitePool,
        store: Arc<dyn KnowledgeStore>,
        model: Arc<dyn GenerationModel>,
        loaders: LoaderRegistry,
    ) -> RagResult<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let pipeline = IngestionPipeline::new(
            loaders,
            chunker,
            Arc::clone(&store),
            config.chunking.workers,
            config.ingestion.dedup,
        );
        let answerer = RetrievalAugmentedAnswerer::new(
            Arc::clone(&store),
            model,
            config.retrieval.params(),
            config.generation.params(),
        );

        Ok(Self {
            store,
            pipeline,
            answerer,
            agents: AgentRepository::new(pool.clone()),
            chats: ChatRepository::new(pool),
            collections: RwLock::new(HashMap::new()),
        })
    }

    // ============ Agents ============

    pub async fn create_agent(&self, name: &str, description: Option<&str>) -> RagResult<Agent> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RagError::InvalidInput("agent name must not be empty".to_string()));
        }
        let agent = self
            .agents
            .create(name, description)
            .await
            .map_err(RagError::Database)?;
        self.collection(&agent).await?;
        tracing::info!(agent_id = %agent.id, name = %agent.name, "created agent");
        Ok(agent)
    }

    pub async fn list_agents(&self) -> RagResult<Vec<Agent>> {
        self.agents.list().await.map_err(RagError::Database)
    }

    pub async fn get_agent(&self, agent_id: &str) -> RagResult<Agent> {
        self.agents
            .get(agent_id)
            .await
            .map_err(RagError::Database)?
            .ok_or_else(|| RagError::AgentNotFound(agent_id.to_string()))
    }

    /// Delete an agent, its chats, and its knowledge base.
    ///
    /// The agent row goes first, so a failure leaves the agent intact. If
    /// the knowledge base cannot be dropped afterwards, its collection is
    /// left orphaned and the error is returned.
    pub async fn delete_agent(&self, agent_id: &str) -> RagResult<()> {
        let agent = self.get_agent(agent_id).await?;
        self.agents
            .delete(&agent.id)
            .await
            .map_err(RagError::Database)?;
        self.collections.write().await.remove(&agent.id);
        if let Err(err) = self.store.delete_collection(&agent.collection).await {
            tracing::error!(
                agent_id = %agent.id,
                collection = %agent.collection,
                error = %err,
                "agent deleted but its collection was not; collection is orphaned"
            );
            return Err(err);
        }
        tracing::info!(agent_id = %agent.id, "deleted agent");
        Ok(())
    }

    /// Rename an agent or change its description. Fields left `None`
    /// keep their current value.
    pub async fn update_agent(
        &self,
        agent_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> RagResult<Agent> {
        let agent = self.get_agent(agent_id).await?;
        let name = match name.map(str::trim) {
            Some("") => {
                return Err(RagError::InvalidInput("agent name must not be empty".to_string()))
            }
            Some(n) => n,
            None => agent.name.as_str(),
        };
        let description = description.or(agent.description.as_deref());
        let updated = self
            .agents
            .update(&agent.id, name, description)
            .await
            .map_err(RagError::Database)?
            .ok_or_else(|| RagError::AgentNotFound(agent_id.to_string()))?;
        tracing::info!(agent_id = %updated.id, "updated agent");
        Ok(updated)
    }

    /// Number of chunks in the agent's knowledge base.
    pub async fn knowledge_size(&self, agent_id: &str) -> RagResult<usize> {
        let agent = self.get_agent(agent_id).await?;
        let handle = self.collection(&agent).await?;
        self.store.count(&handle).await
    }

    // ============ Chats ============

    pub async fn create_chat(
        &self,
        agent_id: &str,
        title: Option<&str>,
        metadata: Metadata,
    ) -> RagResult<Chat> {
        let agent = self.get_agent(agent_id).await?;
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CHAT_TITLE);
        self.chats
            .create(&agent.id, title, metadata)
            .await
            .map_err(RagError::Database)
    }

    pub async fn list_chats(&self, agent_id: &str) -> RagResult<Vec<Chat>> {
        let agent = self.get_agent(agent_id).await?;
        self.chats
            .list_for_agent(&agent.id)
            .await
            .map_err(RagError::Database)
    }

    /// The chat with its turns. Chats of other agents are not found.
    pub async fn get_chat(&self, agent_id: &str, chat_id: &str) -> RagResult<Chat> {
        let agent = self.get_agent(agent_id).await?;
        self.chats
            .get(chat_id)
            .await
            .map_err(RagError::Database)?
            .filter(|c| c.agent_id == agent.id)
            .ok_or_else(|| RagError::ChatNotFound(chat_id.to_string()))
    }

    /// Retitle a chat and optionally replace its metadata. A blank title
    /// falls back to the default.
    pub async fn update_chat(
        &self,
        agent_id: &str,
        chat_id: &str,
        title: Option<&str>,
        metadata: Option<Metadata>,
    ) -> RagResult<Chat> {
        let chat = self.get_chat(agent_id, chat_id).await?;
        let title = match title.map(str::trim) {
            Some("") => DEFAULT_CHAT_TITLE,
            Some(t) => t,
            None => chat.title.as_str(),
        };
        self.chats
            .update(&chat.id, title, metadata.as_ref())
            .await
            .map_err(RagError::Database)?
            .ok_or_else(|| RagError::ChatNotFound(chat_id.to_string()))
    }

    pub async fn delete_chat(&self, agent_id: &str, chat_id: &str) -> RagResult<()> {
        let chat = self.get_chat(agent_id, chat_id).await?;
        self.chats
            .delete(&chat.id)
            .await
            .map_err(RagError::Database)?;
        Ok(())
    }

    // ============ Ingest / Ask ============

    pub async fn ingest(&self, agent_id: &str, request: IngestRequest) -> RagResult<IngestResult> {
        let agent = self.get_agent(agent_id).await?;
        let handle = self.collection(&agent).await?;
        let result = self.pipeline.ingest(&handle, &request).await?;
        if result.chunk_count > 0 {
            // Chunks are already committed.
            if let Err(err) = self.agents.touch(&agent.id).await {
                tracing::warn!(agent_id = %agent.id, error = %err, "failed to update agent timestamp");
            }
        }
        Ok(result)
    }

    /// Answer `question` from the agent's knowledge base.
    ///
    /// With a chat id, the chat's prior turns condition retrieval, and the
    /// question and answer are appended to the chat afterwards.
    pub async fn ask(
        &self,
        agent_id: &str,
        chat_id: Option<&str>,
        question: &str,
    ) -> RagResult<RetrievalAnswer> {
        if question.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        let agent = self.get_agent(agent_id).await?;
        let chat = match chat_id {
            Some(id) => Some(self.get_chat(&agent.id, id).await?),
            None => None,
        };

        let history = chat.as_ref().map(|c| c.turns.as_slice());
        let context = build_context(question, history);
        let handle = self.collection(&agent).await?;
        let answer = self.answerer.answer(&context, &handle).await?;

        if let Some(chat) = chat {
            let turns = [
                ChatTurn::new(ChatRole::User, question),
                ChatTurn::new(ChatRole::Assistant, answer.answer.clone()),
            ];
            self.chats
                .append_turns(&chat.id, &turns)
                .await
                .map_err(RagError::Database)?;
        }

        Ok(answer)
    }

    async fn collection(&self, agent: &Agent) -> RagResult<CollectionHandle> {
        if let Some(handle) = self.collections.read().await.get(&agent.id) {
            return Ok(handle.clone());
        }
        let handle = self.store.get_or_create_collection(&agent.collection).await?;
        self.collections
            .write()
            .await
            .insert(agent.id.clone(), handle.clone());
        Ok(handle)
    }
}
