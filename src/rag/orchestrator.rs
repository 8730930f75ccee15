//! Query pipeline.
//!
//! retrieve -> filter -> rerank -> assemble -> draft -> verify -> extract
//!
//! Every stage failure maps to a fixed user-facing sentence or a logged
//! degradation, so `query` always yields a string.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;

use super::context::{AssembledContext, ContextAssembler, ContextAssemblerConfig};
use super::generation::AnswerGenerator;
use super::reranker::Reranker;
use super::retriever::{CompressionFilter, Retriever};
use super::types::{Chunk, DialogTurn, ScoredChunk, Stage, StageDegraded};
use super::verification::{VerificationLoop, VerificationOutcome};
use crate::core::errors::{
    RagError, MSG_CONTEXT_EMPTY, MSG_CONTEXT_FAILED, MSG_CRITICAL, MSG_EMPTY_QUESTION,
    MSG_NOTHING_FOUND, MSG_NOT_READY, MSG_RETRIEVAL_FAILED,
};
use crate::llm::Generator;

/// Per-query knobs, read once at construction.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub k: usize,
    pub score_threshold: f32,
    pub filter_threshold: f32,
    /// Bound for each retrieval, filter, rerank and generator call.
    pub stage_timeout: Duration,
    pub temperature: Option<f64>,
    pub verification_enabled: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            k: 20,
            score_threshold: 0.7,
            filter_threshold: 0.75,
            stage_timeout: Duration::from_secs(60),
            temperature: Some(0.3),
            verification_enabled: true,
        }
    }
}

/// What one query went through. `answer` is what the caller sees.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub answer: String,
    /// Chunks handed to the assembler, in final order.
    pub chunks: Vec<Chunk>,
    pub context: Option<String>,
    pub draft: Option<String>,
    pub verification: Option<VerificationOutcome>,
    pub degraded: Vec<StageDegraded>,
}

impl QueryOutcome {
    fn stopped(mut self, message: &str) -> Self {
        self.answer = message.to_string();
        self
    }
}

pub struct QueryOrchestrator {
    retriever: Arc<dyn Retriever>,
    filter: Option<CompressionFilter>,
    reranker: Option<Reranker>,
    assembler: ContextAssembler,
    generator: Arc<AnswerGenerator>,
    verifier: VerificationLoop,
    config: QueryConfig,
}

impl QueryOrchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        config: QueryConfig,
    ) -> Self {
        let mut answer_generator = AnswerGenerator::new(generator, config.stage_timeout);
        if let Some(temperature) = config.temperature {
            answer_generator = answer_generator.with_temperature(temperature);
        }
        let answer_generator = Arc::new(answer_generator);
        let verifier = VerificationLoop::new(answer_generator.clone(), config.verification_enabled);

        Self {
            retriever,
            filter: None,
            reranker: None,
            assembler: ContextAssembler::new(ContextAssemblerConfig::default()),
            generator: answer_generator,
            verifier,
            config,
        }
    }

    pub fn with_filter(mut self, filter: CompressionFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_context(mut self, config: ContextAssemblerConfig) -> Self {
        self.assembler = ContextAssembler::new(config);
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Answers `question`. Never fails.
    pub async fn query(&self, question: &str) -> String {
        self.query_detailed(question).await.answer
    }

    /// Like [`query`](Self::query), keeping the intermediate results.
    pub async fn query_detailed(&self, question: &str) -> QueryOutcome {
        match AssertUnwindSafe(self.run(question)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    "{}",
                    RagError::Critical(format!("query {:?} aborted: {}", question, reason))
                );
                QueryOutcome::default().stopped(MSG_CRITICAL)
            }
        }
    }

    async fn run(&self, question: &str) -> QueryOutcome {
        let mut outcome = QueryOutcome::default();
        let question = question.trim();
        if question.is_empty() {
            tracing::warn!("{}", RagError::EmptyQuestion);
            return outcome.stopped(MSG_EMPTY_QUESTION);
        }
        tracing::info!("Processing query: {}", question);

        // Base retrieval
        let retrieved = match self
            .bounded(self.retriever.retrieve(
                question,
                self.config.k,
                self.config.score_threshold,
            ))
            .await
        {
            Ok(found) => found,
            Err(RagError::IndexNotReady) => {
                tracing::error!("Query rejected: index not built");
                return outcome.stopped(MSG_NOT_READY);
            }
            Err(err) => {
                tracing::error!("Retrieval failed: {}", err);
                return outcome.stopped(MSG_RETRIEVAL_FAILED);
            }
        };
        if retrieved.is_empty() {
            tracing::info!("No chunks cleared threshold {:.2}", self.config.score_threshold);
            return outcome.stopped(MSG_NOTHING_FOUND);
        }
        tracing::info!("Retrieved {} chunks", retrieved.len());

        let candidates = self.compress(question, retrieved, &mut outcome).await;
        if candidates.is_empty() {
            tracing::info!("Compression filter left no chunks");
            return outcome.stopped(MSG_NOTHING_FOUND);
        }

        let chunks: Vec<Chunk> = candidates.into_iter().map(|sc| sc.chunk).collect();
        let chunks = self.rerank(question, chunks, &mut outcome).await;

        let assembled = self.assemble(&chunks);
        outcome.chunks = chunks;
        let context = match assembled {
            Ok(context) => context,
            Err(message) => return outcome.stopped(message),
        };
        outcome.context = Some(context.text.clone());

        let draft = match self.generator.draft(&context.text, question).await {
            Ok(draft) => draft,
            Err(err) => {
                tracing::error!("Answer generation failed: {}", err);
                return outcome.stopped(err.user_message());
            }
        };
        tracing::info!("Draft answer generated ({} chars)", draft.chars().count());
        outcome.draft = Some(draft.clone());

        let turn = DialogTurn {
            question: question.to_string(),
            draft_answer: draft,
            context: context.text,
        };
        let verification = self.verifier.run(&turn).await;
        if let Some(degraded) = verification.degraded.clone() {
            outcome.degraded.push(degraded);
        }
        tracing::info!(
            "Verification {}: {} answer",
            verification.decision,
            verification.answer.label()
        );

        outcome.answer = verification.answer.text().to_string();
        outcome.verification = Some(verification);
        outcome
    }

    /// Assembled context, or the sentence to answer with when there is none.
    fn assemble(&self, chunks: &[Chunk]) -> Result<AssembledContext, &'static str> {
        match self.assembler.assemble(chunks) {
            Ok(assembled) if !assembled.text.is_empty() => Ok(assembled),
            Ok(_) => {
                tracing::warn!("First context block exceeds the budget");
                Err(MSG_CONTEXT_EMPTY)
            }
            Err(err) => {
                tracing::error!("Context assembly failed: {}", err);
                Err(MSG_CONTEXT_FAILED)
            }
        }
    }

    /// Filtered candidates, or `retrieved` unchanged when the filter is
    /// absent or fails.
    async fn compress(
        &self,
        question: &str,
        retrieved: Vec<ScoredChunk>,
        outcome: &mut QueryOutcome,
    ) -> Vec<ScoredChunk> {
        let Some(filter) = &self.filter else {
            return retrieved;
        };
        match self
            .bounded(filter.filter(question, &retrieved, self.config.filter_threshold))
            .await
        {
            Ok(kept) => {
                tracing::info!("Compression filter kept {}/{} chunks", kept.len(), retrieved.len());
                kept
            }
            Err(err) => {
                outcome
                    .degraded
                    .push(StageDegraded::new(Stage::CompressionFilter, err.to_string()));
                retrieved
            }
        }
    }

    /// Reranked chunks, or the incoming order when scoring fails.
    async fn rerank(
        &self,
        question: &str,
        chunks: Vec<Chunk>,
        outcome: &mut QueryOutcome,
    ) -> Vec<Chunk> {
        let Some(reranker) = &self.reranker else {
            return chunks;
        };
        match self.bounded(reranker.rerank(question, &chunks)).await {
            Ok(reranked) => {
                tracing::info!("Reranked {} chunks", reranked.len());
                reranked
            }
            Err(err) => {
                outcome
                    .degraded
                    .push(StageDegraded::new(Stage::Reranker, err.to_string()));
                chunks
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RagError>>,
    ) -> Result<T, RagError> {
        match tokio::time::timeout(self.config.stage_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Transport(format!(
                "stage timed out after {:?}",
                self.config.stage_timeout
            ))),
        }
    }
}
