//! Typed view over the merged YAML configuration.
//!
//! Every section is optional in the file; missing keys fall back to the
//! defaults below.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub reranker: RerankerSettings,
    pub retrieval: RetrievalSettings,
    pub context: ContextSettings,
    pub verification: VerificationSettings,
    pub ingestion: IngestionSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: None,
            temperature: 0.3,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
    /// Number of query embeddings kept in memory.
    pub cache_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: None,
            timeout_secs: 30,
            cache_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            api_key: None,
            model: Some("cross-encoder/ms-marco-MiniLM-L-6-v2".to_string()),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub k: usize,
    pub score_threshold: f32,
    pub filter_enabled: bool,
    pub filter_threshold: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            k: 20,
            score_threshold: 0.7,
            filter_enabled: true,
            filter_threshold: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Character budget for the assembled context.
    pub max_context_length: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_context_length: 16_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub enabled: bool,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    pub docs_dir: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_length: usize,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            docs_dir: None,
            chunk_size: 512,
            chunk_overlap: 128,
            min_chunk_length: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Empty means local development origins only.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_allowed_origins: Vec::new(),
        }
    }
}
