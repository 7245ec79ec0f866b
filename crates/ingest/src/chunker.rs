use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunk::Chunk;
use crate::tokenizer::{BpeTokenizer, Tokenizer};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 20,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be positive");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        Ok(())
    }
}

/// Fixed-size token windows with a fixed overlap between neighbours.
/// Boundaries ignore sentence structure.
pub struct Chunker<T = BpeTokenizer> {
    config: ChunkerConfig,
    tokenizer: T,
}

impl Chunker<BpeTokenizer> {
    /// Chunker counting GPT-2 BPE tokens.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        Self::with_tokenizer(config, BpeTokenizer::gpt2()?)
    }
}

impl<T: Tokenizer> Chunker<T> {
    pub fn with_tokenizer(config: ChunkerConfig, tokenizer: T) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, tokenizer })
    }

    pub fn chunk_text(&self, doc_id: &str, text: &str, source: &str) -> Vec<Chunk> {
        let spans = self.tokenizer.encode(text);
        let mut chunks = Vec::new();

        if spans.is_empty() {
            return chunks;
        }

        let stride = self.config.chunk_size - self.config.chunk_overlap;
        let mut start = 0;

        loop {
            let end = (start + self.config.chunk_size).min(spans.len());
            let byte_start = spans[start].start;
            let byte_end = spans[end - 1].end;

            chunks.push(Chunk::new(
                doc_id.to_string(),
                chunks.len(),
                text[byte_start..byte_end].to_string(),
                source.to_string(),
                (byte_start, byte_end),
                (start, end),
            ));

            if end == spans.len() {
                break;
            }
            start += stride;
        }

        debug!(
            doc_id,
            tokens = spans.len(),
            chunks = chunks.len(),
            "Split text into chunks"
        );

        chunks
    }
}
