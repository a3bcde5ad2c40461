//! Language-model trait used by the answerer.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sampling parameters passed with every completion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
            top_p: 1.0,
        }
    }
}

/// Turns a prompt into generated text.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    /// Model identifier reported in answer metadata.
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}
