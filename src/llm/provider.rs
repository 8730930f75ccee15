use async_trait::async_trait;

use super::types::{ChatRequest, Completion};
use crate::core::errors::RagError;

/// Text completion backend used for drafting and verifying answers.
#[async_trait]
pub trait Generator: Send + Sync {
    /// provider name for logs (e.g. "openai", "lmstudio")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn complete(&self, request: ChatRequest) -> Result<Completion, RagError>;
}

/// Embedding backend. Implementations return unit-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(vector) if vectors.is_empty() => Ok(vector),
            _ => Err(RagError::Embedding(
                "expected exactly one vector for a single input".to_string(),
            )),
        }
    }
}
