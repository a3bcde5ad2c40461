//! Retrieval-augmented answering.
//!
//! [`RetrievalAugmentedAnswerer::answer`] searches an agent's collection for
//! the (history-augmented) question, fills the fixed QA prompt with the
//! retrieved chunk texts, asks the [`GenerationModel`] for a completion, and
//! assembles a [`RetrievalAnswer`] with deduplicated sources and a
//! confidence score.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::error::{RagError, RagResult};
use crate::generation::{GenerationModel, GenerationParams};
use crate::models::{CollectionHandle, Metadata, RetrievalAnswer, ScoredChunk};
use crate::scoring::{ConfidenceScorer, SourceCoverageScorer};
use crate::store::KnowledgeStore;

/// Fixed question-answering prompt. `{context}` and `{question}` are filled in.
pub const RAG_PROMPT: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.\n\
Question: {question} \nContext: {context} \nAnswer:";

/// How many chunks to retrieve and the minimum similarity to keep one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub score_threshold: Option<f32>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 3,
            score_threshold: None,
        }
    }
}

pub struct RetrievalAugmentedAnswerer {
    store: Arc<dyn KnowledgeStore>,
    model: Arc<dyn GenerationModel>,
    retrieval: RetrievalParams,
    generation: GenerationParams,
    scorer: Box<dyn ConfidenceScorer>,
}

impl RetrievalAugmentedAnswerer {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        model: Arc<dyn GenerationModel>,
        retrieval: RetrievalParams,
        generation: GenerationParams,
    ) -> Self {
        Self {
            store,
            model,
            retrieval,
            generation,
            scorer: Box::new(SourceCoverageScorer::default()),
        }
    }

    /// Replace the default [`SourceCoverageScorer`].
    pub fn with_scorer(mut self, scorer: Box<dyn ConfidenceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn retrieval(&self) -> RetrievalParams {
        self.retrieval
    }

    pub async fn answer(
        &self,
        context: &str,
        collection: &CollectionHandle,
    ) -> RagResult<RetrievalAnswer> {
        if context.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let hits = self
            .store
            .search(
                collection,
                context,
                self.retrieval.top_k,
                self.retrieval.score_threshold,
            )
            .await?;
        if hits.is_empty() {
            tracing::warn!(
                collection = %collection.name,
                "no chunks retrieved; answering without context"
            );
        }

        let prompt = render_prompt(context, &hits);
        let answer = self
            .model
            .complete(&prompt, &self.generation)
            .await
            .map_err(RagError::Generation)?;

        let sources = collect_sources(&hits);
        let confidence = self.scorer.score(sources.len(), self.retrieval.top_k);
        let timestamp = Utc::now();

        let mut metadata = Metadata::new();
        metadata.insert("model".into(), json!(self.model.model_name()));
        metadata.insert(
            "retrieval".into(),
            json!({
                "k": self.retrieval.top_k,
                "score_threshold": self.retrieval.score_threshold,
            }),
        );
        metadata.insert("source_count".into(), json!(sources.len()));
        metadata.insert("chunk_count".into(), json!(hits.len()));
        metadata.insert("timestamp".into(), json!(timestamp.to_rfc3339()));

        tracing::info!(
            collection = %collection.name,
            chunks = hits.len(),
            sources = sources.len(),
            confidence,
            "answered question"
        );

        Ok(RetrievalAnswer {
            answer,
            sources,
            metadata,
            confidence,
            timestamp,
        })
    }
}

/// Fill [`RAG_PROMPT`] with the question and the retrieved chunk texts.
pub fn render_prompt(question: &str, hits: &[ScoredChunk]) -> String {
    let context = hits
        .iter()
        .map(|h| h.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    RAG_PROMPT
        .replace("{context}", &context)
        .replace("{question}", question)
}

/// `source` metadata of the hits, deduplicated in first-seen order.
fn collect_sources(hits: &[ScoredChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for source in hits.iter().filter_map(|h| h.chunk.source()) {
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
    }
    sources
}
