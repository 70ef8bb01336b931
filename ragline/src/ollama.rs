//! Ollama embedding and generation providers.
//!
//! This module is only available when the `ollama` feature is enabled.
//! Both providers talk to a local Ollama server over its JSON API:
//! `POST /api/embeddings` for vectors and `POST /api/generate` (non-streaming)
//! for completions.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;

const PROVIDER: &str = "Ollama";

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {e}")))
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Read the body of a failed response, preferring Ollama's `{"error": ...}` message.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// Embeddings

/// An [`EmbeddingProvider`] backed by an Ollama embedding model.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::OllamaEmbeddingProvider;
///
/// let provider =
///     OllamaEmbeddingProvider::new("http://localhost:11434", "nomic-embed-text:latest", 768)?;
/// let embedding = provider.embed("hello world").await?;
/// ```
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for `model` served at `base_url`, producing vectors of `dimensions`.
    pub fn new(base_url: &str, model: impl Into<String>, dimensions: usize) -> Result<Self> {
        Self::with_timeout(base_url, model, dimensions, Duration::from_secs(60))
    }

    /// Like [`new`](Self::new) with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: &str,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: endpoint(base_url, "/api/embeddings"),
            model: model.into(),
            dimensions,
        })
    }

    /// Create a provider from the Ollama settings of `config`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::with_timeout(
            &config.ollama_url,
            config.embedding_model.clone(),
            config.dimensions,
            config.request_timeout(),
        )
    }

    fn failure(message: String) -> RagError {
        RagError::Embedding { provider: PROVIDER.into(), message }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, model = %self.model, text_len = text.len(), "embedding text");

        let response = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest { model: &self.model, prompt: text })
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "embedding request failed");
                Self::failure(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = PROVIDER, %detail, "embedding API error");
            return Err(Self::failure(detail));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse embedding response");
            Self::failure(format!("failed to parse response: {e}"))
        })?;

        if body.embedding.is_empty() {
            return Err(Self::failure("response contained no embedding".into()));
        }
        Ok(body.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

// Generation

/// A [`LanguageModel`] backed by Ollama's non-streaming generate endpoint.
#[derive(Debug, Clone)]
pub struct OllamaLanguageModel {
    client: reqwest::Client,
    url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaLanguageModel {
    /// Create a model client for `model` served at `base_url`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, model, Duration::from_secs(60))
    }

    /// Like [`new`](Self::new) with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: endpoint(base_url, "/api/generate"),
            model: model.into(),
        })
    }

    /// Create a model client from the Ollama settings of `config`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::with_timeout(&config.ollama_url, config.llm_model.clone(), config.request_timeout())
    }

    fn failure(message: String) -> RagError {
        RagError::LanguageModel { provider: PROVIDER.into(), message }
    }
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = prompt.len(), "generating");

        let response = self
            .client
            .post(&self.url)
            .json(&GenerateRequest { model: &self.model, prompt, stream: false })
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "generate request failed");
                Self::failure(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = PROVIDER, %detail, "generate API error");
            return Err(Self::failure(detail));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse generate response");
            Self::failure(format!("failed to parse response: {e}"))
        })?;
        Ok(body.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
