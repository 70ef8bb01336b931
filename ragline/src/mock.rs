//! Deterministic stand-ins for the embedding and language model services.
//!
//! Useful for tests and offline demos: no network, no model files, and
//! stable outputs for identical inputs.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::inmemory::keyword_terms;
use crate::llm::LanguageModel;

/// Bag-of-words embedding: each lower-cased word is hashed into one of
/// `dimensions` buckets and the resulting vector is L2-normalised.
///
/// Texts that share words get a positive cosine similarity, which is enough
/// for retrieval tests to behave sensibly.
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    output_dimensions: usize,
    fail_on: Vec<String>,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    /// Create a provider producing `dimensions`-long vectors.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            output_dimensions: dimensions,
            fail_on: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every request whose text contains `needle`.
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    /// Return vectors of a different length than
    /// [`dimensions`](EmbeddingProvider::dimensions) reports.
    pub fn with_output_dimensions(mut self, dimensions: usize) -> Self {
        self.output_dimensions = dimensions;
        self
    }

    /// Number of `embed` calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// FNV-1a, stable across platforms and releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(needle) = self.fail_on.iter().find(|n| text.contains(n.as_str())) {
            return Err(RagError::Embedding {
                provider: "mock".into(),
                message: format!("refusing text containing '{needle}'"),
            });
        }

        let mut vector = vec![0.0f32; self.output_dimensions];
        if self.output_dimensions == 0 {
            return Ok(vector);
        }
        for word in keyword_terms(text) {
            let bucket = fnv1a(word.as_bytes()) % self.output_dimensions as u64;
            vector[bucket as usize] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Fixed(String),
    EchoContext,
    Fail(String),
}

/// A language model that records prompts and answers from a script.
///
/// By default it answers with the first line of the prompt's context
/// section, which keeps end-to-end tests meaningful without a real model.
#[derive(Debug)]
pub struct MockLanguageModel {
    reply: Reply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self {
            reply: Reply::EchoContext,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl MockLanguageModel {
    /// Create a model that echoes the first line of the supplied context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with `reply`.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self { reply: Reply::Fixed(reply.into()), ..Self::default() }
    }

    /// Fail every call with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self { reply: Reply::Fail(message.into()), ..Self::default() }
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        match &self.reply {
            Reply::Fixed(text) => Ok(text.clone()),
            Reply::Fail(message) => {
                Err(RagError::LanguageModel { provider: "mock".into(), message: message.clone() })
            }
            Reply::EchoContext => Ok(prompt
                .split_once("Context:\n")
                .and_then(|(_, rest)| rest.lines().find(|line| !line.trim().is_empty()))
                .unwrap_or_default()
                .trim()
                .to_string()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn shared_words_raise_similarity() {
        let provider = MockEmbeddingProvider::new(64);
        let sky = provider.embed("The sky is blue.").await.unwrap();
        let question = provider.embed("What color is the sky?").await.unwrap();
        let unrelated = provider.embed("Tax forms are due in April").await.unwrap();

        assert_eq!(sky.len(), 64);
        assert!(cosine(&sky, &question) > cosine(&sky, &unrelated));
    }

    #[tokio::test]
    async fn embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new(32);
        let first = provider.embed("same text").await.unwrap();
        assert_eq!(first, provider.embed("same text").await.unwrap());
    }

    #[tokio::test]
    async fn failure_injection_counts_calls() {
        let provider = MockEmbeddingProvider::new(8).fail_on("bad");
        assert!(matches!(provider.embed("a bad chunk").await, Err(RagError::Embedding { .. })));
        assert!(provider.embed("a good chunk").await.is_ok());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn echo_model_answers_from_context() {
        let model = MockLanguageModel::new();
        let answer =
            model.generate("Intro\n\nContext:\nThe sky is blue.\n\nQuestion: ?").await.unwrap();
        assert_eq!(answer, "The sky is blue.");
        assert_eq!(model.calls(), 1);
        assert_eq!(model.prompts().len(), 1);
    }
}
