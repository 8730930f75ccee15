#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ragquery_backend::core::errors::RagError;
use ragquery_backend::llm::{ChatRequest, Completion, Embedder, Generator};
use ragquery_backend::rag::{Chunk, RelevanceScorer, VectorIndex};

const VOCABULARY: [&str; 5] = ["cat", "purr", "sleep", "dog", "bark"];

/// Bag-of-words embedder over a tiny fixed vocabulary plus a bias term.
#[derive(Default)]
pub struct VocabularyEmbedder {
    pub calls: AtomicUsize,
}

impl VocabularyEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for VocabularyEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut vector: Vec<f32> = VOCABULARY
                    .iter()
                    .map(|word| lower.matches(word).count() as f32)
                    .collect();
                vector.push(1.0);
                let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
                vector.iter().map(|x| x / norm).collect()
            })
            .collect())
    }
}

pub struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Err(RagError::Embedding("embedding model offline".to_string()))
    }
}

/// Answers drafting and verification prompts from two separate scripts.
pub struct ScriptedGenerator {
    drafts: Mutex<VecDeque<Result<Completion, RagError>>>,
    verdicts: Mutex<VecDeque<Result<Completion, RagError>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedGenerator {
    pub fn new(drafts: Vec<Result<&str, RagError>>, verdicts: Vec<Result<&str, RagError>>) -> Arc<Self> {
        let script = |items: Vec<Result<&str, RagError>>| {
            items
                .into_iter()
                .map(|item| item.map(Completion::new))
                .collect::<VecDeque<_>>()
        };
        Arc::new(Self {
            drafts: Mutex::new(script(drafts)),
            verdicts: Mutex::new(script(verdicts)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn answering(draft: &str) -> Arc<Self> {
        Self::new(vec![Ok(draft)], vec![])
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn first_system_prompt(&self) -> String {
        self.requests.lock().unwrap()[0].messages[0].content.clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<Completion, RagError> {
        let is_verification = request.messages[0].content.contains("Ответ для проверки");
        self.requests.lock().unwrap().push(request);

        let script = if is_verification { &self.verdicts } else { &self.drafts };
        script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RagError::Generation("script exhausted".to_string())))
    }
}

/// Scores passages so that the input order is reversed.
pub struct ReversingScorer;

#[async_trait]
impl RelevanceScorer for ReversingScorer {
    async fn score(&self, _question: &str, contents: &[String]) -> Result<Vec<f32>, RagError> {
        Ok((0..contents.len()).map(|i| i as f32).collect())
    }
}

pub struct FailingScorer;

#[async_trait]
impl RelevanceScorer for FailingScorer {
    async fn score(&self, _question: &str, _contents: &[String]) -> Result<Vec<f32>, RagError> {
        Err(RagError::Scoring("cross-encoder unavailable".to_string()))
    }
}

pub fn cat_chunks() -> Vec<Chunk> {
    vec![
        Chunk::new("Cats are small carnivorous mammals; a cat is a cat.", "cats.txt").with_page("1"),
        Chunk::new("A cat will purr when it is content.", "cats.txt").with_page("2"),
        Chunk::new("Cats sleep up to sixteen hours a day.", "sleep.md"),
    ]
}

pub async fn cat_index(embedder: Arc<VocabularyEmbedder>) -> Arc<VectorIndex> {
    let index = Arc::new(VectorIndex::new(embedder));
    index.build(cat_chunks()).await.expect("cat corpus builds");
    index
}
