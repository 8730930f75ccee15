use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const SOURCE_KEY: &str = "source";
pub const PAGE_KEY: &str = "page";

/// A unit of indexed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Whitespace-normalized text.
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            metadata,
        }
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.metadata.insert(PAGE_KEY.to_string(), page.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn page(&self) -> Option<&str> {
        self.metadata
            .get(PAGE_KEY)
            .map(String::as_str)
            .filter(|p| !p.trim().is_empty())
    }
}

/// A chunk paired with a similarity or relevance score. Higher is better.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

impl ScoredChunk {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }
}

/// The material a verification pass judges. Lives for one query only.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogTurn {
    pub question: String,
    pub draft_answer: String,
    pub context: String,
}

/// Pipeline stages that may be skipped without failing the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CompressionFilter,
    Reranker,
    Verification,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::CompressionFilter => "compression filter",
            Stage::Reranker => "reranker",
            Stage::Verification => "verification",
        };
        f.write_str(name)
    }
}

/// Record of a non-critical stage that failed and was bypassed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDegraded {
    pub stage: Stage,
    pub reason: String,
}

impl StageDegraded {
    pub fn new(stage: Stage, reason: impl Into<String>) -> Self {
        let degraded = Self {
            stage,
            reason: reason.into(),
        };
        tracing::warn!("{} skipped: {}", degraded.stage, degraded.reason);
        degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_metadata_values_read_as_absent() {
        let chunk = Chunk::new("Cats purr when content.", "cats.txt").with_page("  ");
        assert_eq!(chunk.source(), Some("cats.txt"));
        assert_eq!(chunk.page(), None);

        let paged = Chunk::new("Cats purr when content.", "cats.txt").with_page("3");
        assert_eq!(paged.page(), Some("3"));
    }

    #[test]
    fn chunk_ids_are_unique() {
        let a = Chunk::new("same text", "a");
        let b = Chunk::new("same text", "a");
        assert_ne!(a.id, b.id);
    }
}
