pub mod cache;
pub mod openai;
pub mod provider;
pub mod rerank;
pub mod types;

pub use cache::CachedEmbedder;
pub use openai::OpenAiCompatibleProvider;
pub use provider::{Embedder, Generator};
pub use rerank::HttpRelevanceScorer;
pub use types::{ChatMessage, ChatRequest, Completion};
