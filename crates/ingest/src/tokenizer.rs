use anyhow::{Context, Result};
use std::ops::Range;
use tiktoken_rs::CoreBPE;

/// Splits text into tokens, reported as byte spans into the input.
///
/// Spans must be contiguous and cover the whole input, so slicing any run of
/// consecutive tokens yields the exact original text.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<Range<usize>>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// Byte-pair encoding with OpenAI's ranks (`gpt2` / `r50k_base`).
pub struct BpeTokenizer {
    bpe: CoreBPE,
}

impl BpeTokenizer {
    pub fn gpt2() -> Result<Self> {
        let bpe = tiktoken_rs::r50k_base().context("Failed to load GPT-2 BPE ranks")?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for BpeTokenizer {
    /// A character whose bytes are split across several tokens is reported as
    /// one span covering all of them.
    fn encode(&self, text: &str) -> Vec<Range<usize>> {
        let ids = self.bpe.encode_ordinary(text);
        let mut spans = Vec::with_capacity(ids.len());
        let mut pending = Vec::new();
        let mut cursor = 0;

        for id in ids {
            pending.push(id);
            if let Ok(piece) = self.bpe.decode(pending.clone()) {
                let end = cursor + piece.len();
                spans.push(cursor..end);
                cursor = end;
                pending.clear();
            }
        }
        if cursor < text.len() {
            spans.push(cursor..text.len());
        }

        spans
    }
}
