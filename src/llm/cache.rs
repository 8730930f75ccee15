//! Bounded memoization of embeddings keyed by a SHA-256 digest of the text.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::provider::Embedder;
use crate::core::errors::RagError;

pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    capacity: usize,
    entries: Mutex<CacheEntries>,
}

#[derive(Default)]
struct CacheEntries {
    vectors: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
}

impl CacheEntries {
    fn insert(&mut self, key: String, vector: Vec<f32>, capacity: usize) {
        if self.vectors.contains_key(&key) {
            return;
        }
        while self.order.len() >= capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.vectors.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.vectors.insert(key, vector);
    }
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            entries: Mutex::new(CacheEntries::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.vectors.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if self.capacity == 0 {
            return self.inner.embed(inputs).await;
        }

        let keys: Vec<String> = inputs.iter().map(|text| cache_key(text)).collect();
        let mut results: Vec<Option<Vec<f32>>> = {
            let entries = self
                .entries
                .lock()
                .map_err(|_| RagError::Critical("embedding cache poisoned".to_string()))?;
            keys.iter().map(|key| entries.vectors.get(key).cloned()).collect()
        };

        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, cached)| cached.is_none())
            .map(|(idx, _)| idx)
            .collect();

        if !missing.is_empty() {
            let to_embed: Vec<String> = missing.iter().map(|&idx| inputs[idx].clone()).collect();
            let fresh = self.inner.embed(&to_embed).await?;
            if fresh.len() != to_embed.len() {
                return Err(RagError::Embedding(format!(
                    "embedding count mismatch: {} != {}",
                    fresh.len(),
                    to_embed.len()
                )));
            }

            let mut entries = self
                .entries
                .lock()
                .map_err(|_| RagError::Critical("embedding cache poisoned".to_string()))?;
            for (&idx, vector) in missing.iter().zip(fresh) {
                entries.insert(keys[idx].clone(), vector.clone(), self.capacity);
                results[idx] = Some(vector);
            }
        } else {
            tracing::debug!("Embedding cache hit for {} input(s)", inputs.len());
        }

        Ok(results.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        texts: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(inputs.len(), Ordering::SeqCst);
            Ok(inputs.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn counting() -> Arc<CountingEmbedder> {
        Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn repeated_queries_hit_the_cache() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 10);

        let first = cached.embed_query("tell me about cats").await.expect("embed");
        let second = cached.embed_query("tell me about cats").await.expect("embed");

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn only_missing_inputs_are_forwarded() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 10);

        cached.embed(&["a".to_string()]).await.expect("embed");
        let vectors = cached
            .embed(&["a".to_string(), "bbb".to_string()])
            .await
            .expect("embed");

        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![3.0, 1.0]]);
        assert_eq!(inner.texts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oldest_entries_are_evicted_at_capacity() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 2);

        for text in ["one", "two", "three"] {
            cached.embed_query(text).await.expect("embed");
        }
        assert_eq!(cached.len(), 2);

        cached.embed_query("one").await.expect("embed");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }
}
