use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{Embedder, Generator};
use super::types::{ChatRequest, Completion};
use crate::core::errors::RagError;
use crate::vector_math;

/// Client for any server speaking the OpenAI chat/embeddings wire format
/// (OpenAI, LM Studio, llama.cpp server, vLLM, ...).
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, RagError> {
        if base_url.trim().is_empty() {
            return Err(RagError::Config("base_url cannot be empty".to_string()));
        }
        if model.trim().is_empty() {
            return Err(RagError::Config("model cannot be empty".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            client,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, RagError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(RagError::transport)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            // 5xx and 429 are worth a retry, everything else is a hard failure
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(RagError::Transport(format!("{} {}: {}", url, status, text)));
            }
            return Err(RagError::Generation(format!("{} {}: {}", url, status, text)));
        }

        res.json().await.map_err(RagError::transport)
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: ChatRequest) -> Result<Completion, RagError> {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
        }

        let payload = self.post_json("/v1/chat/completions", &body).await?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(Completion { content })
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleProvider {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let payload = self
            .post_json("/v1/embeddings", &body)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let embeddings = parse_embeddings(&payload)?;
        if embeddings.len() != inputs.len() {
            return Err(RagError::Embedding(format!(
                "embedding count mismatch: {} != {}",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embeddings)
    }
}

fn parse_embeddings(payload: &Value) -> Result<Vec<Vec<f32>>, RagError> {
    let data = payload["data"]
        .as_array()
        .ok_or_else(|| RagError::Embedding("response has no data array".to_string()))?;

    // servers may answer out of order; "index" is authoritative when present
    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let Some(vals) = item["embedding"].as_array() else {
            return Err(RagError::Embedding(format!("item {} has no embedding", position)));
        };
        let vector: Vec<f32> = vals
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        let index = item["index"]
            .as_u64()
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vector_math::normalize(&vector)));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_embeddings_orders_by_index_and_normalizes() {
        let payload = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 2.0] },
                { "index": 0, "embedding": [3.0, 4.0] }
            ]
        });

        let vectors = parse_embeddings(&payload).expect("payload should parse");

        assert_eq!(vectors.len(), 2);
        assert!((vectors[0][0] - 0.6).abs() < 1e-6);
        assert!((vectors[0][1] - 0.8).abs() < 1e-6);
        assert!((vectors[1][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn parse_embeddings_rejects_missing_data() {
        assert!(parse_embeddings(&json!({ "error": "model not loaded" })).is_err());
    }

    #[test]
    fn constructor_validates_required_fields() {
        let timeout = std::time::Duration::from_secs(1);
        assert!(OpenAiCompatibleProvider::new("", None, "m", timeout).is_err());
        assert!(OpenAiCompatibleProvider::new("http://localhost:1234", None, " ", timeout).is_err());

        let provider =
            OpenAiCompatibleProvider::new("http://localhost:1234/", Some(String::new()), "m", timeout)
                .expect("valid settings");
        assert_eq!(provider.base_url, "http://localhost:1234");
        assert!(provider.api_key.is_none());
    }
}
