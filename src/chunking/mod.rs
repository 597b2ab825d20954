
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extract::Page;

/// A fixed-size window of extracted page text, carrying its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text.
    pub text: String,
    /// 1-based page number the text was extracted from.
    pub page: usize,
    /// Name of the source document.
    pub source: String,
}

/// Configuration for the sliding-window chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window width in characters.
    pub chunk_size: usize,
    /// Characters shared between adjacent windows.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    /// Window advance per step. Clamped to at least one character so a
    /// degenerate overlap cannot produce a non-advancing window.
    #[inline]
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap).max(1)
    }
}

/// Chunk a single page into overlapping windows.
///
/// Windows are measured in characters, not bytes, so multi-byte text chunks
/// the same way regardless of encoding width. The final window may be shorter
/// than `chunk_size`. Empty page text produces no chunks.
#[inline]
pub fn chunk_page(page: &Page, config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    // Byte offset of each char boundary, plus the end of the string, so
    // windows in char positions map back onto valid slice bounds.
    let bounds: Vec<usize> = page
        .text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(page.text.len()))
        .collect();
    let char_count = bounds.len() - 1;

    let step = config.step();
    let mut start = 0;
    while start < char_count {
        let end = (start + config.chunk_size).min(char_count);
        chunks.push(Chunk {
            text: page.text[bounds[start]..bounds[end]].to_string(),
            page: page.number,
            source: page.source.clone(),
        });
        start += step;
    }

    chunks
}

/// Chunk every page independently, preserving document order.
#[inline]
pub fn chunk_pages(pages: &[Page], config: &ChunkingConfig) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = pages
        .iter()
        .flat_map(|page| chunk_page(page, config))
        .collect();

    debug!(
        "Chunked {} pages into {} chunks (size {}, overlap {})",
        pages.len(),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    chunks
}
