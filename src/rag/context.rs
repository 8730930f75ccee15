//! Prompt context assembly.
//!
//! Renders ranked chunks as numbered, cited blocks:
//!
//! ```text
//! Документ 1 [Источник: cats.txt, Страница: 2]:
//! Cats are small carnivores.
//! Документ 2 [Источник: dogs.txt]:
//! Dogs were domesticated from wolves.
//! ```
//!
//! Blocks are concatenated as-is, so the output length is exactly the sum of
//! the included block lengths.

use serde::{Deserialize, Serialize};

use super::types::Chunk;
use crate::core::errors::RagError;

const UNKNOWN_SOURCE: &str = "Неизвестный источник";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextAssemblerConfig {
    /// Maximum total context length in characters
    pub max_context_length: usize,
}

impl Default for ContextAssemblerConfig {
    fn default() -> Self {
        Self {
            max_context_length: 16_000,
        }
    }
}

/// Assembled context plus how many leading chunks made it in.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    pub included: usize,
}

pub struct ContextAssembler {
    config: ContextAssemblerConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextAssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContextAssemblerConfig {
        &self.config
    }

    pub fn format(&self, chunks: &[Chunk]) -> Result<String, RagError> {
        self.assemble(chunks).map(|assembled| assembled.text)
    }

    /// Adds whole blocks in order until the next one would exceed the budget.
    pub fn assemble(&self, chunks: &[Chunk]) -> Result<AssembledContext, RagError> {
        if chunks.is_empty() {
            return Err(RagError::EmptyInput("context assembler"));
        }

        let max_length = self.config.max_context_length;
        let mut context = String::new();
        let mut total_length = 0usize;
        let mut included = 0usize;

        for (i, chunk) in chunks.iter().enumerate() {
            let block = render_block(i + 1, chunk);
            let block_length = block.chars().count();

            if total_length + block_length > max_length {
                tracing::warn!(
                    "Context budget reached ({} chars); kept {} of {} chunks",
                    max_length,
                    included,
                    chunks.len()
                );
                break;
            }

            context.push_str(&block);
            total_length += block_length;
            included += 1;
        }

        tracing::info!("Context assembled: {} chars from {} chunks", total_length, included);
        Ok(AssembledContext {
            text: context,
            included,
        })
    }
}

fn render_block(number: usize, chunk: &Chunk) -> String {
    let cleaned_text = chunk.content.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut metadata_str = String::new();
    if !chunk.metadata.is_empty() {
        metadata_str.push_str(" [Источник: ");
        metadata_str.push_str(chunk.source().unwrap_or(UNKNOWN_SOURCE));
        if let Some(page) = chunk.page() {
            metadata_str.push_str(", Страница: ");
            metadata_str.push_str(page);
        }
        metadata_str.push(']');
    }

    format!("Документ {}{}:\n{}\n", number, metadata_str, cleaned_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn assembler(max_context_length: usize) -> ContextAssembler {
        ContextAssembler::new(ContextAssemblerConfig { max_context_length })
    }

    #[test]
    fn renders_numbered_blocks_with_citations() {
        let chunks = vec![
            Chunk::new("Cats   are\nsmall carnivores.", "cats.txt").with_page("2"),
            Chunk::new("Dogs were domesticated.", "dogs.txt"),
        ];

        let context = assembler(16_000).format(&chunks).expect("format");

        assert_eq!(
            context,
            "Документ 1 [Источник: cats.txt, Страница: 2]:\nCats are small carnivores.\n\
             Документ 2 [Источник: dogs.txt]:\nDogs were domesticated.\n"
        );
    }

    #[test]
    fn missing_source_and_missing_metadata_render_differently() {
        let mut no_source = Chunk::new("Some loose text here.", "x");
        no_source.metadata = BTreeMap::from([("page".to_string(), "4".to_string())]);
        let mut bare = Chunk::new("Text without any metadata.", "x");
        bare.metadata.clear();

        let context = assembler(16_000).format(&[no_source, bare]).expect("format");

        assert!(context.starts_with("Документ 1 [Источник: Неизвестный источник, Страница: 4]:\n"));
        assert!(context.contains("Документ 2:\nText without any metadata.\n"));
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = assembler(100).format(&[]).expect_err("empty");
        assert!(matches!(err, RagError::EmptyInput(_)));
    }

    #[test]
    fn stops_at_first_block_over_budget() {
        let chunks = vec![
            Chunk::new("short one", "a"),
            Chunk::new("x".repeat(500), "b"),
            Chunk::new("short two", "c"),
        ];
        let first_len = render_block(1, &chunks[0]).chars().count();

        let assembled = assembler(first_len + 50).assemble(&chunks).expect("assemble");

        assert_eq!(assembled.included, 1);
        assert_eq!(assembled.text.chars().count(), first_len);
        assert!(!assembled.text.contains("short two"));
    }

    #[test]
    fn output_never_exceeds_budget() {
        let chunks: Vec<Chunk> = (0..20)
            .map(|i| Chunk::new("слово ".repeat(i * 7 + 1), format!("doc{}.txt", i)))
            .collect();

        for budget in [0, 1, 40, 100, 333, 1_000, 5_000] {
            let context = assembler(budget).format(&chunks).expect("format");
            assert!(context.chars().count() <= budget, "budget {} exceeded", budget);
        }
    }

    #[test]
    fn everything_fits_when_blocks_sum_within_budget() {
        let chunks = vec![
            Chunk::new("Первый фрагмент текста.", "a.txt"),
            Chunk::new("Второй фрагмент текста.", "b.txt").with_page("7"),
            Chunk::new("Третий фрагмент текста.", "c.txt"),
        ];
        let total: usize = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| render_block(i + 1, c).chars().count())
            .sum();

        let assembled = assembler(total).assemble(&chunks).expect("assemble");

        assert_eq!(assembled.included, 3);
        assert_eq!(assembled.text.chars().count(), total);
    }

    #[test]
    fn oversized_first_block_yields_empty_context() {
        let chunks = vec![Chunk::new("x".repeat(200), "a")];
        let assembled = assembler(50).assemble(&chunks).expect("assemble");
        assert_eq!(assembled.included, 0);
        assert!(assembled.text.is_empty());
    }
}
