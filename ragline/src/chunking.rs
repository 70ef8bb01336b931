//! Token-bounded document chunking.
//!
//! This module provides the [`Chunker`] trait and [`TokenChunker`], a sliding
//! window over sub-word tokens: every chunk holds at most `max_tokens`
//! tokens and starts `overlap_tokens` tokens before the previous chunk
//! ended. Chunks are cut straight out of the source text, so no character
//! is ever lost or rewritten.

use std::sync::Arc;

use crate::config::{RagConfig, validate_chunking};
use crate::document::Chunk;
use crate::error::Result;
use crate::tokenizer::{Tokenizer, token_boundaries};

/// A strategy for splitting document text into chunks.
pub trait Chunker: Send + Sync {
    /// Split `text` into ordered chunks.
    ///
    /// Returns an empty `Vec` for empty text.
    fn chunk(&self, text: &str) -> Result<Vec<Chunk>>;
}

/// Splits text into overlapping windows of sub-word tokens.
///
/// Boundaries depend only on the text, the tokenizer and the two window
/// parameters, so re-chunking an unchanged document yields identical chunks.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use ragline::{Chunker, RegexTokenizer, TokenChunker};
///
/// let chunker = TokenChunker::new(Arc::new(RegexTokenizer::new()), 300, 50)?;
/// let chunks = chunker.chunk(&text)?;
/// ```
#[derive(Clone)]
pub struct TokenChunker {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
    overlap_tokens: usize,
}

impl std::fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenChunker")
            .field("tokenizer", &self.tokenizer.name())
            .field("max_tokens", &self.max_tokens)
            .field("overlap_tokens", &self.overlap_tokens)
            .finish()
    }
}

impl TokenChunker {
    /// Create a new `TokenChunker`.
    ///
    /// # Arguments
    ///
    /// * `tokenizer` - measures text in the units used by the embedding model
    /// * `max_tokens` - maximum number of tokens per chunk
    /// * `overlap_tokens` - number of tokens shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`](crate::RagError::Configuration) if
    /// `max_tokens` is zero or `overlap_tokens >= max_tokens`.
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        max_tokens: usize,
        overlap_tokens: usize,
    ) -> Result<Self> {
        validate_chunking(max_tokens, overlap_tokens)?;
        Ok(Self { tokenizer, max_tokens, overlap_tokens })
    }

    /// Create a chunker with the window parameters of `config`.
    pub fn from_config(tokenizer: Arc<dyn Tokenizer>, config: &RagConfig) -> Result<Self> {
        Self::new(tokenizer, config.max_chunk_tokens, config.overlap_tokens)
    }

    /// Maximum number of tokens per chunk.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Number of tokens shared by consecutive chunks.
    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }
}

impl Chunker for TokenChunker {
    fn chunk(&self, text: &str) -> Result<Vec<Chunk>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let bounds = token_boundaries(text, self.tokenizer.token_offsets(text)?);
        let token_count = bounds.len();
        let byte_at = |token: usize| bounds.get(token).copied().unwrap_or(text.len());

        let mut chunks = Vec::new();
        let mut first = 0;

        loop {
            let last = (first + self.max_tokens).min(token_count);
            let (start, end) = (byte_at(first), byte_at(last));
            chunks.push(Chunk {
                index: chunks.len(),
                text: text[start..end].to_string(),
                token_count: last - first,
                start,
                end,
            });

            if last == token_count {
                break;
            }
            // overlap < max, so the window always advances
            first = last - self.overlap_tokens;
        }

        Ok(chunks)
    }
}

/// Reassemble the text that `chunks` were cut from by collapsing overlaps.
///
/// `chunks` must be the ordered output of one [`Chunker::chunk`] call.
pub fn merge_chunks(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start).min(chunk.text.len());
        text.push_str(&chunk.text[skip..]);
        covered = covered.max(chunk.end);
    }
    text
}
