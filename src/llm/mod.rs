//! LLM integration module.
//!
//! Provides an OpenAI-compatible client for chat and embedding calls, the
//! prompts used by the retrieval strategies, and the two traits the rest of
//! the crate programs against.

mod client;
mod prompts;

use crate::error::Result;
use async_trait::async_trait;

pub use client::{LlmClient, LlmResponse, Message, Role, TokenUsage};
pub use prompts::Prompts;

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single user prompt with an optional system prompt.
    async fn generate(&self, system: Option<&str>, prompt: &str) -> Result<String>;
}

/// Anything that can turn text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed several texts; output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            crate::error::CompassError::LlmApi("Embedding response was empty".to_string())
        })
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, system: Option<&str>, prompt: &str) -> Result<String> {
        self.complete(system, prompt).await
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embeddings(texts).await
    }
}
