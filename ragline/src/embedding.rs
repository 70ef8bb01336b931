//! Embedding provider trait for generating vector embeddings from text.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap a specific embedding service behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::EmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::from_config(&config)?;
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A short provider name for logs and errors.
    fn name(&self) -> &str;
}

/// Wraps an [`EmbeddingProvider`] with a bounded cache keyed by exact text content.
///
/// Only successful embeddings are cached. When the cache is full the oldest
/// entry is evicted. Caching does not change what gets indexed: every chunk
/// still becomes its own record.
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    capacity: usize,
    cache: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
}

impl CachedEmbeddingProvider {
    /// Cache up to `capacity` embeddings produced by `inner`.
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self { inner, capacity, cache: Mutex::new(CacheState::default()) }
    }

    /// Number of cached embeddings.
    pub async fn len(&self) -> usize {
        self.cache.lock().await.entries.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.lock().await.entries.get(text) {
            debug!(provider = self.inner.name(), text_len = text.len(), "embedding cache hit");
            return Ok(hit.clone());
        }

        let embedding = self.inner.embed(text).await?;

        if self.capacity > 0 {
            let mut cache = self.cache.lock().await;
            if !cache.entries.contains_key(text) {
                if cache.entries.len() >= self.capacity {
                    if let Some(oldest) = cache.order.pop_front() {
                        cache.entries.remove(&oldest);
                    }
                }
                cache.order.push_back(text.to_string());
                cache.entries.insert(text.to_string(), embedding.clone());
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
