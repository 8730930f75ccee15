use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use super::types::{Chunk, ScoredChunk};
use crate::core::errors::RagError;

/// Pairwise (question, passage) relevance model. Higher means more relevant;
/// no fixed range is assumed.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// One score per entry of `contents`, in the same order.
    async fn score(&self, question: &str, contents: &[String]) -> Result<Vec<f32>, RagError>;
}

pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    /// Orders `chunks` by descending relevance to `question`.
    ///
    /// The sort is stable: equal scores keep their incoming order.
    pub async fn rerank(&self, question: &str, chunks: &[Chunk]) -> Result<Vec<Chunk>, RagError> {
        if chunks.is_empty() {
            return Err(RagError::EmptyInput("reranker"));
        }

        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let scores = self.scorer.score(question, &contents).await?;
        if scores.len() != chunks.len() {
            return Err(RagError::Scoring(format!(
                "score count mismatch: {} != {}",
                scores.len(),
                chunks.len()
            )));
        }

        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .cloned()
            .zip(scores)
            .map(|(chunk, score)| {
                let score = if score.is_nan() { f32::NEG_INFINITY } else { score };
                ScoredChunk::new(chunk, score)
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        tracing::debug!("Reranked {} chunks", scored.len());

        Ok(scored.into_iter().map(|sc| sc.chunk).collect())
    }
}

/// Term-overlap scorer used when no cross-encoder endpoint is configured.
///
/// Score is the share of question terms found in the passage.
pub struct KeywordOverlapScorer;

#[async_trait]
impl RelevanceScorer for KeywordOverlapScorer {
    async fn score(&self, question: &str, contents: &[String]) -> Result<Vec<f32>, RagError> {
        let question_lower = question.to_lowercase();
        let terms: Vec<&str> = question_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(contents
            .iter()
            .map(|content| {
                let content_lower = content.to_lowercase();
                terms
                    .iter()
                    .filter(|term| content_lower.contains(*term))
                    .count() as f32
                    / terms.len().max(1) as f32
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScorer(Vec<f32>);

    #[async_trait]
    impl RelevanceScorer for FixedScorer {
        async fn score(&self, _question: &str, _contents: &[String]) -> Result<Vec<f32>, RagError> {
            Ok(self.0.clone())
        }
    }

    fn chunks(names: &[&str]) -> Vec<Chunk> {
        names
            .iter()
            .map(|name| Chunk::new(format!("Passage about {}.", name), *name))
            .collect()
    }

    fn sources(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().filter_map(Chunk::source).collect()
    }

    #[tokio::test]
    async fn orders_by_descending_score() {
        let reranker = Reranker::new(Arc::new(FixedScorer(vec![0.1, 2.5, -1.0])));
        let out = reranker.rerank("q", &chunks(&["a", "b", "c"])).await.expect("rerank");
        assert_eq!(sources(&out), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn equal_scores_keep_original_order() {
        let reranker = Reranker::new(Arc::new(FixedScorer(vec![0.5; 4])));
        let out = reranker
            .rerank("q", &chunks(&["a", "b", "c", "d"]))
            .await
            .expect("rerank");
        assert_eq!(sources(&out), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn ties_are_stable_among_mixed_scores() {
        let reranker = Reranker::new(Arc::new(FixedScorer(vec![1.0, 3.0, 1.0, f32::NAN])));
        let out = reranker
            .rerank("q", &chunks(&["a", "b", "c", "d"]))
            .await
            .expect("rerank");
        assert_eq!(sources(&out), vec!["b", "a", "c", "d"]);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let reranker = Reranker::new(Arc::new(FixedScorer(vec![])));
        let err = reranker.rerank("q", &[]).await.expect_err("empty");
        assert!(matches!(err, RagError::EmptyInput(_)));
    }

    #[tokio::test]
    async fn score_count_mismatch_is_a_scoring_error() {
        let reranker = Reranker::new(Arc::new(FixedScorer(vec![1.0])));
        let err = reranker.rerank("q", &chunks(&["a", "b"])).await.expect_err("mismatch");
        assert!(matches!(err, RagError::Scoring(_)));
    }

    #[tokio::test]
    async fn keyword_overlap_prefers_passages_sharing_terms() {
        let scores = KeywordOverlapScorer
            .score(
                "blue sky",
                &[
                    "The sky is blue.".to_string(),
                    "Blue whales are large.".to_string(),
                    "Red roses are beautiful.".to_string(),
                ],
            )
            .await
            .expect("score");
        assert_eq!(scores, vec![1.0, 0.5, 0.0]);
    }
}
