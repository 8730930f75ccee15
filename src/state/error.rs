use thiserror::Error;

use crate::core::errors::RagError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] RagError),

    #[error("Failed to initialize model provider: {0}")]
    Provider(#[source] RagError),

    #[error("Failed to ingest documents: {0}")]
    Ingestion(#[source] RagError),

    #[error("Failed to build vector index: {0}")]
    Index(#[source] RagError),
}
