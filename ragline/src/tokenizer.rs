//! Sub-word tokenizers used to measure and cut chunks.
//!
//! A [`Tokenizer`] reports the byte offsets at which tokens begin. The
//! chunker turns those offsets into a partition of the text with
//! [`token_boundaries`], so every byte belongs to exactly one token and
//! chunk text can always be cut back out of the original document.
//!
//! - [`RegexTokenizer`] - built-in, GPT-style pre-tokenization with long
//!   words split into sub-word pieces
//! - [`HuggingFaceTokenizer`] - any `tokenizer.json` (feature `huggingface`)

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::config::RagConfig;
use crate::error::{RagError, Result};

/// Splits text into sub-word tokens.
pub trait Tokenizer: Send + Sync {
    /// Byte offsets at which tokens start, in ascending order.
    ///
    /// Offsets need not cover the whole text; gaps are attached to the
    /// preceding token by [`token_boundaries`].
    fn token_offsets(&self, text: &str) -> Result<Vec<usize>>;

    /// Number of tokens in `text`.
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(token_boundaries(text, self.token_offsets(text)?).len())
    }

    /// A short name for logs.
    fn name(&self) -> &str;
}

/// Normalise raw token offsets into a partition of `text`.
///
/// The first boundary is forced to `0`; offsets that are out of range, not
/// on a char boundary, or duplicated are dropped. Token `i` spans
/// `boundaries[i]..boundaries[i + 1]` (or the end of the text).
pub fn token_boundaries(text: &str, mut offsets: Vec<usize>) -> Vec<usize> {
    if text.is_empty() {
        return Vec::new();
    }
    offsets.retain(|&o| o > 0 && o < text.len() && text.is_char_boundary(o));
    offsets.push(0);
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

/// Longest run of characters kept as a single token.
const MAX_PIECE_CHARS: usize = 4;

static PRE_TOKENIZER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}",
        r"| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+",
    ))
    .expect("pre-tokenizer pattern is valid")
});

/// Deterministic tokenizer approximating byte-pair encodings without a model file.
///
/// Text is pre-tokenized the way GPT-style encoders do (contractions, words
/// with their leading space, digit groups of at most three, punctuation
/// runs, whitespace runs). Pieces longer than four characters are then
/// split, which approximates how BPE breaks uncommon and long words into
/// sub-words and keeps token counts comparable across scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexTokenizer;

impl RegexTokenizer {
    /// Create the tokenizer.
    pub fn new() -> Self {
        Self
    }
}

impl Tokenizer for RegexTokenizer {
    fn token_offsets(&self, text: &str) -> Result<Vec<usize>> {
        let mut offsets = Vec::new();
        for piece in PRE_TOKENIZER.find_iter(text) {
            let piece_text = piece.as_str();
            offsets.push(piece.start());
            if piece_text.chars().all(char::is_whitespace) {
                continue;
            }
            // A one-character prefix (" sky") does not count towards the piece length.
            let mut chars = piece_text.chars();
            let lead = match (chars.next(), chars.next()) {
                (Some(first), Some(second))
                    if !first.is_alphanumeric() && second.is_alphabetic() =>
                {
                    1
                }
                _ => 0,
            };
            for (n, (at, _)) in piece_text.char_indices().enumerate().skip(lead + 1) {
                if (n - lead) % MAX_PIECE_CHARS == 0 {
                    offsets.push(piece.start() + at);
                }
            }
        }
        Ok(offsets)
    }

    fn name(&self) -> &str {
        "regex"
    }
}

/// A tokenizer backed by a HuggingFace `tokenizer.json`.
///
/// This type is only available when the `huggingface` feature is enabled.
#[cfg(feature = "huggingface")]
pub struct HuggingFaceTokenizer {
    inner: tokenizers::Tokenizer,
}

#[cfg(feature = "huggingface")]
impl HuggingFaceTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            RagError::Tokenizer(format!("failed to load {}: {e}", path.display()))
        })?;
        Ok(Self { inner })
    }

    /// Wrap an already constructed tokenizer.
    pub fn from_tokenizer(inner: tokenizers::Tokenizer) -> Self {
        Self { inner }
    }
}

#[cfg(feature = "huggingface")]
impl Tokenizer for HuggingFaceTokenizer {
    fn token_offsets(&self, text: &str) -> Result<Vec<usize>> {
        let encoding =
            self.inner.encode(text, false).map_err(|e| RagError::Tokenizer(e.to_string()))?;
        Ok(encoding
            .get_offsets()
            .iter()
            .filter(|(start, end)| end > start)
            .map(|(start, _)| *start)
            .collect())
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}

/// Build the tokenizer selected by `config`.
///
/// # Errors
///
/// Returns [`RagError::Configuration`] if a tokenizer file is configured but
/// the `huggingface` feature is disabled, or [`RagError::Tokenizer`] if the
/// file cannot be loaded.
pub fn tokenizer_from_config(config: &RagConfig) -> Result<Arc<dyn Tokenizer>> {
    match &config.tokenizer_path {
        None => Ok(Arc::new(RegexTokenizer::new())),
        #[cfg(feature = "huggingface")]
        Some(path) => Ok(Arc::new(HuggingFaceTokenizer::from_file(path)?)),
        #[cfg(not(feature = "huggingface"))]
        Some(path) => Err(RagError::Configuration(format!(
            "tokenizer file {} requires the `huggingface` feature",
            path.display()
        ))),
    }
}
