//! In-memory flat L2 vector index with atomic snapshot replacement.
//!
//! Queries clone the current `Arc<IndexSnapshot>` and search it without
//! holding the lock, so a rebuild never blocks or disturbs in-flight queries.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, RwLock};

use futures_util::FutureExt;
use ndarray::{Array2, ArrayView1};

use super::strategy::{first_successful, Built};
use super::types::{Chunk, ScoredChunk};
use crate::core::errors::RagError;
use crate::llm::Embedder;
use crate::vector_math;

const EMBED_BATCH_SIZE: usize = 64;

/// How chunk embeddings were obtained during a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStrategy {
    /// Chunks embedded in batches of `EMBED_BATCH_SIZE`.
    Batched,
    /// One request per chunk; slower, but tolerates servers with small batch limits.
    PerChunk,
}

impl BuildStrategy {
    pub const ORDER: [BuildStrategy; 2] = [BuildStrategy::Batched, BuildStrategy::PerChunk];
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStrategy::Batched => f.write_str("batched"),
            BuildStrategy::PerChunk => f.write_str("per-chunk"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub chunks: usize,
    pub dimension: usize,
}

/// Immutable view of one successful build.
pub struct IndexSnapshot {
    chunks: Vec<Chunk>,
    embeddings: Array2<f32>,
}

impl IndexSnapshot {
    fn from_parts(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self, RagError> {
        if chunks.len() != vectors.len() {
            return Err(RagError::IndexBuild(format!(
                "embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(RagError::IndexBuild("embeddings are empty".to_string()));
        }

        let mut flat = Vec::with_capacity(vectors.len() * dimension);
        for (idx, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(RagError::IndexBuild(format!(
                    "chunk {} has dimension {}, expected {}",
                    idx,
                    vector.len(),
                    dimension
                )));
            }
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(RagError::IndexBuild(format!(
                    "chunk {} has a non-finite embedding",
                    idx
                )));
            }
            flat.extend(vector_math::normalize(vector));
        }

        let embeddings = Array2::from_shape_vec((vectors.len(), dimension), flat)
            .map_err(|e| RagError::IndexBuild(e.to_string()))?;

        Ok(Self { chunks, embeddings })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            chunks: self.len(),
            dimension: self.dimension(),
        }
    }

    /// The `k` nearest chunks by L2 distance, closest first.
    ///
    /// Equal distances keep corpus order.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        if query_embedding.len() != self.dimension() {
            return Err(RagError::Embedding(format!(
                "query dimension {} does not match index dimension {}",
                query_embedding.len(),
                self.dimension()
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = vector_math::normalize(query_embedding);
        let query_view = ArrayView1::from(&query);

        let mut distances: Vec<(usize, f32)> = self
            .embeddings
            .rows()
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                let diff = &row - &query_view;
                (idx, diff.dot(&diff).sqrt())
            })
            .collect();

        distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        Ok(distances
            .into_iter()
            .take(k)
            .map(|(idx, distance)| {
                ScoredChunk::new(
                    self.chunks[idx].clone(),
                    vector_math::similarity_from_l2(distance),
                )
            })
            .collect())
    }
}

pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    query_embedder: Arc<dyn Embedder>,
    current: RwLock<Option<Arc<IndexSnapshot>>>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            query_embedder: embedder.clone(),
            embedder,
            current: RwLock::new(None),
        }
    }

    /// Embeds queries with `embedder` while builds keep the one given to
    /// [`new`](Self::new). Both must produce vectors in the same space.
    pub fn with_query_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.query_embedder = embedder;
        self
    }

    pub fn query_embedder(&self) -> &Arc<dyn Embedder> {
        &self.query_embedder
    }

    /// Current snapshot, if a build has completed.
    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Embeds and indexes `chunks`, replacing any previous snapshot.
    ///
    /// The swap happens only after every chunk is embedded and validated; on
    /// error the previously live snapshot (if any) stays in place.
    pub async fn build(
        &self,
        chunks: Vec<Chunk>,
    ) -> Result<Built<BuildStrategy, IndexStats>, RagError> {
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embedded = first_successful(&BuildStrategy::ORDER, |strategy| {
            self.embed_with(strategy, &texts).boxed()
        })
        .await
        .map_err(|failures| {
            let detail = failures
                .iter()
                .map(|(strategy, err)| format!("{}: {}", strategy, err))
                .collect::<Vec<_>>()
                .join("; ");
            RagError::IndexBuild(detail)
        })?;

        let snapshot = Arc::new(IndexSnapshot::from_parts(chunks, embedded.value)?);
        let stats = snapshot.stats();

        match self.current.write() {
            Ok(mut guard) => *guard = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }

        tracing::info!(
            "Vector index built: {} chunks, dimension {}, strategy {}",
            stats.chunks,
            stats.dimension,
            embedded.strategy_used
        );

        Ok(Built {
            strategy_used: embedded.strategy_used,
            value: stats,
        })
    }

    async fn embed_with(
        &self,
        strategy: BuildStrategy,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, RagError> {
        let batch_size = match strategy {
            BuildStrategy::Batched => EMBED_BATCH_SIZE,
            BuildStrategy::PerChunk => 1,
        };

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let embedded = self.embedder.embed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "embedding count mismatch: {} != {}",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}
