//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to defaults.
//! [`load_config`] parses and validates; invalid chunking parameters are
//! reported as [`RagError::Configuration`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use agentkb_core::answer::RetrievalParams;
use agentkb_core::generation::GenerationParams;
use agentkb_core::{RagError, RagResult};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Parallel chunking workers for multi-document loads.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            workers: default_workers(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_workers() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub similarity_top_k: usize,
    #[serde(default)]
    pub score_threshold: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: default_top_k(),
            score_threshold: None,
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.similarity_top_k,
            score_threshold: self.score_threshold,
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    4000
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL. Defaults to the provider's public endpoint.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the bearer token (OpenAI-compatible only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationConfig {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    1.0
}
fn default_generation_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Skip sources whose fingerprint is already in the collection.
    #[serde(default = "default_dedup")]
    pub dedup: bool,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_web_timeout")]
    pub web_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            dedup: default_dedup(),
            max_file_size: default_max_file_size(),
            web_timeout_secs: default_web_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_dedup() -> bool {
    true
}
fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}
fn default_web_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("agentkb/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// A config with every section at its default, storing the database at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            ingestion: IngestionConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> RagResult<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunking.chunk_size must be > 0".to_string(),
            ));
        }
        if c.chunk_overlap == 0 || c.chunk_overlap >= c.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunking.chunk_overlap must satisfy 0 < overlap < chunk_size (got {} with chunk_size {})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if c.workers == 0 {
            return Err(RagError::Configuration(
                "chunking.workers must be >= 1".to_string(),
            ));
        }

        if self.retrieval.similarity_top_k == 0 {
            return Err(RagError::Configuration(
                "retrieval.similarity_top_k must be >= 1".to_string(),
            ));
        }

        let e = &self.embedding;
        match e.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => {
                return Err(RagError::Configuration(format!(
                    "unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local",
                    other
                )))
            }
        }
        if e.is_enabled() && e.provider != "local" {
            if e.model.is_none() {
                return Err(RagError::Configuration(format!(
                    "embedding.model must be specified when provider is '{}'",
                    e.provider
                )));
            }
            if e.dims.unwrap_or(0) == 0 {
                return Err(RagError::Configuration(format!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    e.provider
                )));
            }
        }
        if e.max_attempts == 0 {
            return Err(RagError::Configuration(
                "embedding.max_attempts must be >= 1".to_string(),
            ));
        }

        let g = &self.generation;
        match g.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => {
                return Err(RagError::Configuration(format!(
                    "unknown generation provider: '{}'. Must be disabled, openai, or ollama",
                    other
                )))
            }
        }
        if g.provider != "disabled" && g.model.is_none() {
            return Err(RagError::Configuration(format!(
                "generation.model must be specified when provider is '{}'",
                g.provider
            )));
        }
        if !(0.0..=2.0).contains(&g.temperature) {
            return Err(RagError::Configuration(
                "generation.temperature must be in [0.0, 2.0]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&g.top_p) {
            return Err(RagError::Configuration(
                "generation.top_p must be in [0.0, 1.0]".to_string(),
            ));
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
