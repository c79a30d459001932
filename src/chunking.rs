use crate::document::Page;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Identifier of the document this chunk belongs to
    pub document_id: String,
    /// 1-based page the chunk was cut from
    pub page_number: usize,
    /// Character offset of the chunk within its page
    pub start_index: usize,
}

/// Sliding window parameters, measured in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(anyhow!("Chunk size must be greater than zero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(anyhow!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap,
                chunk_size
            ));
        }
        Ok(ChunkConfig {
            chunk_size,
            chunk_overlap,
        })
    }
}

/// Split every page of a document, tagging chunks with the document id
pub fn split_pages(pages: &[Page], document_id: &str, config: &ChunkConfig) -> Vec<TextChunk> {
    pages
        .iter()
        .flat_map(|page| split_page(page, document_id, config))
        .collect()
}

/// Split one page into windows of `chunk_size` characters that advance by
/// `chunk_size - chunk_overlap`. Whitespace-only windows are dropped.
pub fn split_page(page: &Page, document_id: &str, config: &ChunkConfig) -> Vec<TextChunk> {
    let text = page.text.as_str();

    // Byte offset of every char boundary, including the end of the text
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;
    let step = config.chunk_size - config.chunk_overlap;

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < char_count {
        let end = (start + config.chunk_size).min(char_count);
        let window = &text[boundaries[start]..boundaries[end]];

        if !window.trim().is_empty() {
            chunks.push(TextChunk {
                text: window.to_string(),
                document_id: document_id.to_string(),
                page_number: page.number,
                start_index: start,
            });
        }

        if end == char_count {
            break;
        }
        start += step;
    }

    chunks
}
