//! Retrieval-augmented question answering.
//!
//! - `VectorIndex` / `BaseRetriever`: nearest-neighbour search over chunk embeddings
//! - `CompressionFilter` and `Reranker`: optional second-stage scoring
//! - `ContextAssembler`: budgeted, cited prompt context
//! - `QueryOrchestrator`: runs the whole pipeline for one question

pub mod context;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod orchestrator;
pub mod prompts;
pub mod reranker;
pub mod retriever;
pub mod strategy;
pub mod types;
pub mod verification;

pub use context::{AssembledContext, ContextAssembler, ContextAssemblerConfig};
pub use generation::AnswerGenerator;
pub use index::{BuildStrategy, IndexSnapshot, IndexStats, VectorIndex};
pub use ingest::{ChunkerConfig, Document, DocumentIngestor};
pub use orchestrator::{QueryConfig, QueryOrchestrator, QueryOutcome};
pub use reranker::{KeywordOverlapScorer, RelevanceScorer, Reranker};
pub use retriever::{BaseRetriever, CompressionFilter, Retriever};
pub use strategy::{first_successful, Built};
pub use types::{Chunk, DialogTurn, ScoredChunk, Stage, StageDegraded};
pub use verification::{extract_answer, Extraction, VerificationLoop, VerificationOutcome, VerificationState};
