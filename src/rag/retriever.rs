//! First-stage retrieval and the optional embedding-based compression filter.

use std::sync::Arc;

use async_trait::async_trait;

use super::index::VectorIndex;
use super::types::ScoredChunk;
use crate::core::errors::RagError;
use crate::llm::Embedder;
use crate::vector_math;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` candidates whose similarity is at least `score_threshold`,
    /// most similar first. An empty result is not an error.
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredChunk>, RagError>;
}

/// Nearest-neighbour search over the shared vector index with a score cutoff.
pub struct BaseRetriever {
    index: Arc<VectorIndex>,
}

impl BaseRetriever {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Retriever for BaseRetriever {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let snapshot = self.index.snapshot().ok_or(RagError::IndexNotReady)?;
        let query_embedding = self.index.query_embedder().embed_query(query).await?;

        let candidates = snapshot.search(&query_embedding, k)?;
        let total = candidates.len();
        let kept: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter(|sc| sc.score >= score_threshold)
            .collect();

        tracing::debug!(
            "Base retriever kept {}/{} candidates at threshold {:.2}",
            kept.len(),
            total,
            score_threshold
        );
        Ok(kept)
    }
}

/// Re-scores candidates with its own embedder and drops weak matches.
pub struct CompressionFilter {
    embedder: Arc<dyn Embedder>,
}

impl CompressionFilter {
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Result<Self, RagError> {
        let embedder = embedder.ok_or_else(|| {
            RagError::Config("compression filter needs an embedder".to_string())
        })?;
        Ok(Self { embedder })
    }

    /// Survivors keep their input order and carry the recomputed cosine score.
    pub async fn filter(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
        similarity_threshold: f32,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut inputs = Vec::with_capacity(chunks.len() + 1);
        inputs.push(query.to_string());
        inputs.extend(chunks.iter().map(|sc| sc.chunk.content.clone()));

        let embeddings = self.embedder.embed(&inputs).await?;
        if embeddings.len() != inputs.len() {
            return Err(RagError::Embedding(format!(
                "embedding size mismatch: {} != {}",
                embeddings.len(),
                inputs.len()
            )));
        }

        let query_embedding = &embeddings[0];
        let mut kept = Vec::with_capacity(chunks.len());
        for (sc, embedding) in chunks.iter().zip(&embeddings[1..]) {
            let similarity = vector_math::cosine_similarity(query_embedding, embedding)?;
            if similarity >= similarity_threshold {
                kept.push(ScoredChunk::new(sc.chunk.clone(), similarity));
            }
        }

        tracing::debug!(
            "Compression filter kept {}/{} chunks at threshold {:.2}",
            kept.len(),
            chunks.len(),
            similarity_threshold
        );
        Ok(kept)
    }
}
