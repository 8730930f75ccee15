use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::RagError;
use crate::rag::reranker::RelevanceScorer;

/// Cross-encoder served over HTTP (`POST /v1/rerank`, llama.cpp / TEI shape).
#[derive(Clone)]
pub struct HttpRelevanceScorer {
    base_url: String,
    api_key: Option<String>,
    model: Option<String>,
    client: Client,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl HttpRelevanceScorer {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, RagError> {
        if base_url.trim().is_empty() {
            return Err(RagError::Config("reranker base_url cannot be empty".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            client,
        })
    }
}

#[async_trait]
impl RelevanceScorer for HttpRelevanceScorer {
    async fn score(&self, question: &str, contents: &[String]) -> Result<Vec<f32>, RagError> {
        let url = format!("{}/v1/rerank", self.base_url);
        let mut body = json!({
            "query": question,
            "documents": contents,
        });
        if let (Some(model), Some(obj)) = (&self.model, body.as_object_mut()) {
            obj.insert("model".to_string(), json!(model));
        }

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request
            .send()
            .await
            .map_err(|e| RagError::Scoring(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Scoring(format!("{} {}: {}", url, status, text)));
        }

        let payload: RerankResponse = res
            .json()
            .await
            .map_err(|e| RagError::Scoring(e.to_string()))?;

        scores_in_input_order(payload.results, contents.len())
    }
}

fn scores_in_input_order(results: Vec<RerankResult>, expected: usize) -> Result<Vec<f32>, RagError> {
    let mut scores: Vec<Option<f32>> = vec![None; expected];
    for result in results {
        match scores.get_mut(result.index) {
            Some(slot) => *slot = Some(result.relevance_score),
            None => {
                return Err(RagError::Scoring(format!(
                    "score index {} out of range for {} documents",
                    result.index, expected
                )))
            }
        }
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(idx, score)| {
            score.ok_or_else(|| RagError::Scoring(format!("no score returned for document {}", idx)))
        })
        .collect()
}
