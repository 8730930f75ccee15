//! Document loading and chunking.
//!
//! Reads `.txt` / `.md` files from a directory, splits them into
//! overlapping character windows and drops chunks that are too short or
//! lack a source. Form feeds (`\x0c`) separate pages; the 1-based page
//! number is stored in the chunk metadata.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::Chunk;
use crate::core::errors::RagError;

const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];
const PAGE_BREAK: char = '\x0c';

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
    /// Shorter chunks are dropped
    pub min_chunk_length: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 128,
            min_chunk_length: 10,
        }
    }
}

/// One loaded page of a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    pub source: String,
    pub page: Option<usize>,
}

pub struct DocumentIngestor {
    config: ChunkerConfig,
}

impl DocumentIngestor {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Loads every supported file under `dir` and returns validated chunks.
    ///
    /// Unreadable, unsupported or empty files are skipped with a warning.
    /// Fails with `EmptyCorpus` when no chunk survives.
    pub fn ingest_dir(&self, dir: &Path) -> Result<Vec<Chunk>, RagError> {
        let documents = load_documents(dir)?;
        let chunks = self.split_documents(&documents);
        let chunks = validate_chunks(chunks, self.config.min_chunk_length);

        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        tracing::info!(
            "Ingested {} chunks from {} pages in {}",
            chunks.len(),
            documents.len(),
            dir.display()
        );
        Ok(chunks)
    }

    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_into_chunks(&doc.text)
                    .into_iter()
                    .map(move |text| {
                        let chunk = Chunk::new(text, doc.source.clone());
                        match doc.page {
                            Some(page) => chunk.with_page(page.to_string()),
                            None => chunk,
                        }
                    })
            })
            .collect()
    }

    /// Split text into overlapping windows, preferring sentence ends.
    pub fn split_into_chunks(&self, text: &str) -> Vec<String> {
        let chunk_size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(chunk_size - 1);

        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let mut chunks = Vec::new();

        let mut start = 0;
        while start < total_chars {
            let end = (start + chunk_size).min(total_chars);
            let window = &chars[start..end];

            let taken = if end < total_chars {
                sentence_boundary(window)
            } else {
                window.len()
            };

            let piece: String = window[..taken].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if end == total_chars {
                break;
            }
            // Always advance, even when the boundary cut the window short.
            start += taken.saturating_sub(overlap).max(1);
        }

        chunks
    }
}

/// Length of `window` up to the last sentence end in its final 20%, or the
/// whole window when there is none.
fn sentence_boundary(window: &[char]) -> usize {
    let search_start = window.len() * 80 / 100;
    (search_start..window.len().saturating_sub(1))
        .rev()
        .find(|&i| matches!(window[i], '.' | '!' | '?') && window[i + 1].is_whitespace())
        .map(|i| i + 2)
        .unwrap_or(window.len())
}

/// Reads all supported files directly under `dir`, sorted by file name.
pub fn load_documents(dir: &Path) -> Result<Vec<Document>, RagError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        tracing::error!("Cannot read documents directory {}: {}", dir.display(), e);
        RagError::EmptyCorpus
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        if !is_supported(&path) {
            tracing::warn!("Skipping unsupported file: {}", path.display());
            continue;
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Skipping unreadable file {}: {}", path.display(), e);
                continue;
            }
        };

        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let pages = split_pages(&text, &source);
        if pages.is_empty() {
            tracing::warn!("Skipping empty file: {}", path.display());
            continue;
        }
        tracing::debug!("Loaded {} ({} pages)", source, pages.len());
        documents.extend(pages);
    }

    if documents.is_empty() {
        tracing::error!("No documents loaded from {}", dir.display());
        return Err(RagError::EmptyCorpus);
    }
    Ok(documents)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn split_pages(text: &str, source: &str) -> Vec<Document> {
    let paged = text.contains(PAGE_BREAK);
    text.split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| Document {
            text: page.to_string(),
            source: source.to_string(),
            page: paged.then_some(i + 1),
        })
        .collect()
}

/// Collapses whitespace runs to single spaces and drops chunks that are
/// shorter than `min_length` characters or have no source.
pub fn validate_chunks(chunks: Vec<Chunk>, min_length: usize) -> Vec<Chunk> {
    let total = chunks.len();
    let kept: Vec<Chunk> = chunks
        .into_iter()
        .filter_map(|mut chunk| {
            chunk.content = normalize_whitespace(&chunk.content);
            if chunk.content.chars().count() < min_length {
                tracing::warn!(
                    "Dropping chunk {} from {}: shorter than {} characters",
                    chunk.id,
                    chunk.source().unwrap_or("?"),
                    min_length
                );
                return None;
            }
            if chunk.source().is_none() {
                tracing::warn!("Dropping chunk {}: missing source", chunk.id);
                return None;
            }
            Some(chunk)
        })
        .collect();

    if kept.len() < total {
        tracing::info!("Chunk validation kept {}/{}", kept.len(), total);
    }
    kept
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
