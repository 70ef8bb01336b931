//! Configuration for the ingestion and query pipelines.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::{CollectionSchema, Distance};
use crate::error::{RagError, Result};

/// Prefix of the environment variables read by [`RagConfig::from_env`].
pub const ENV_PREFIX: &str = "RAGLINE_";

/// Configuration parameters shared by ingestion and query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in sub-word tokens.
    pub max_chunk_tokens: usize,
    /// Number of tokens shared by consecutive chunks.
    pub overlap_tokens: usize,
    /// Optional HuggingFace `tokenizer.json` used instead of the built-in tokenizer.
    pub tokenizer_path: Option<PathBuf>,

    /// Name of the collection holding the indexed chunks.
    pub collection: String,
    /// Name of the text property that stores chunk content.
    pub text_property: String,
    /// Dimensionality of the embedding vectors.
    pub dimensions: usize,
    /// Distance metric of the vector index.
    pub distance: Distance,

    /// Hybrid weighting: 0 is pure keyword, 1 is pure vector.
    pub alpha: f32,
    /// Maximum number of passages retrieved per question.
    pub limit: usize,
    /// Character budget of the assembled answer context.
    pub max_context_chars: usize,

    /// Base URL of the Weaviate instance.
    pub weaviate_url: String,
    /// Base URL of the Ollama server.
    pub ollama_url: String,
    /// Embedding model served by Ollama.
    pub embedding_model: String,
    /// Generation model served by Ollama.
    pub llm_model: String,
    /// Per-request timeout for external calls, in seconds.
    pub request_timeout_secs: u64,

    /// Maximum number of chunks embedded and stored concurrently.
    pub workers: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 300,
            overlap_tokens: 50,
            tokenizer_path: None,
            collection: "Document".to_string(),
            text_property: "content".to_string(),
            dimensions: 768,
            distance: Distance::Cosine,
            alpha: 0.7,
            limit: 3,
            max_context_chars: 12_000,
            weaviate_url: "http://localhost:8080".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text:latest".to_string(),
            llm_model: "granite3.3:2b".to_string(),
            request_timeout_secs: 60,
            workers: 4,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a configuration from `RAGLINE_*` environment variables on top of the defaults.
    ///
    /// Recognised variables: `RAGLINE_MAX_CHUNK_TOKENS`, `RAGLINE_OVERLAP_TOKENS`,
    /// `RAGLINE_TOKENIZER_PATH`, `RAGLINE_COLLECTION`, `RAGLINE_TEXT_PROPERTY`,
    /// `RAGLINE_DIMENSIONS`, `RAGLINE_ALPHA`, `RAGLINE_LIMIT`, `RAGLINE_MAX_CONTEXT_CHARS`,
    /// `RAGLINE_WEAVIATE_URL`, `RAGLINE_OLLAMA_URL`, `RAGLINE_EMBEDDING_MODEL`,
    /// `RAGLINE_LLM_MODEL`, `RAGLINE_REQUEST_TIMEOUT_SECS` and `RAGLINE_WORKERS`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if a variable cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Build a configuration from an arbitrary key lookup (keys without prefix).
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        set_parsed(&lookup, "MAX_CHUNK_TOKENS", &mut config.max_chunk_tokens)?;
        set_parsed(&lookup, "OVERLAP_TOKENS", &mut config.overlap_tokens)?;
        if let Some(path) = lookup("TOKENIZER_PATH") {
            config.tokenizer_path = Some(PathBuf::from(path));
        }
        set_string(&lookup, "COLLECTION", &mut config.collection);
        set_string(&lookup, "TEXT_PROPERTY", &mut config.text_property);
        set_parsed(&lookup, "DIMENSIONS", &mut config.dimensions)?;
        set_parsed(&lookup, "ALPHA", &mut config.alpha)?;
        set_parsed(&lookup, "LIMIT", &mut config.limit)?;
        set_parsed(&lookup, "MAX_CONTEXT_CHARS", &mut config.max_context_chars)?;
        set_string(&lookup, "WEAVIATE_URL", &mut config.weaviate_url);
        set_string(&lookup, "OLLAMA_URL", &mut config.ollama_url);
        set_string(&lookup, "EMBEDDING_MODEL", &mut config.embedding_model);
        set_string(&lookup, "LLM_MODEL", &mut config.llm_model);
        set_parsed(&lookup, "REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;
        set_parsed(&lookup, "WORKERS", &mut config.workers)?;

        config.validate()?;
        Ok(config)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if:
    /// - `max_chunk_tokens == 0` or `overlap_tokens >= max_chunk_tokens`
    /// - `alpha` is outside `[0, 1]`
    /// - `limit`, `dimensions`, `workers` or `request_timeout_secs` is zero
    /// - the collection or text property name is empty
    pub fn validate(&self) -> Result<()> {
        validate_chunking(self.max_chunk_tokens, self.overlap_tokens)?;
        validate_alpha(self.alpha)?;
        if self.limit == 0 {
            return Err(RagError::Configuration("limit must be greater than zero".to_string()));
        }
        if self.dimensions == 0 {
            return Err(RagError::Configuration(
                "dimensions must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(RagError::Configuration("workers must be greater than zero".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::Configuration(
                "request timeout must be at least one second".to_string(),
            ));
        }
        if self.collection.trim().is_empty() {
            return Err(RagError::Configuration("collection name must not be empty".to_string()));
        }
        if self.text_property.trim().is_empty() {
            return Err(RagError::Configuration("text property must not be empty".to_string()));
        }
        Ok(())
    }

    /// The per-request timeout for external calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The collection schema described by this configuration.
    pub fn schema(&self) -> CollectionSchema {
        CollectionSchema {
            name: self.collection.clone(),
            text_property: self.text_property.clone(),
            dimensions: self.dimensions,
            distance: self.distance,
        }
    }
}

pub(crate) fn validate_chunking(max_tokens: usize, overlap_tokens: usize) -> Result<()> {
    if max_tokens == 0 {
        return Err(RagError::Configuration(
            "max_chunk_tokens must be greater than zero".to_string(),
        ));
    }
    if overlap_tokens >= max_tokens {
        return Err(RagError::Configuration(format!(
            "overlap_tokens ({overlap_tokens}) must be less than max_chunk_tokens ({max_tokens})"
        )));
    }
    Ok(())
}

pub(crate) fn validate_alpha(alpha: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(RagError::Configuration(format!("alpha ({alpha}) must be within [0, 1]")));
    }
    Ok(())
}

fn set_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut String) {
    if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
        *target = value;
    }
}

fn set_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) -> Result<()>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|e| {
            RagError::Configuration(format!("{ENV_PREFIX}{key}='{raw}' is invalid: {e}"))
        })?;
    }
    Ok(())
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in tokens.
    pub fn max_chunk_tokens(mut self, tokens: usize) -> Self {
        self.config.max_chunk_tokens = tokens;
        self
    }

    /// Set the overlap between consecutive chunks in tokens.
    pub fn overlap_tokens(mut self, tokens: usize) -> Self {
        self.config.overlap_tokens = tokens;
        self
    }

    /// Use a HuggingFace `tokenizer.json` for chunking.
    pub fn tokenizer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tokenizer_path = Some(path.into());
        self
    }

    /// Set the collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Set the text property name.
    pub fn text_property(mut self, name: impl Into<String>) -> Self {
        self.config.text_property = name.into();
        self
    }

    /// Set the embedding dimensionality.
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.config.dimensions = dimensions;
        self
    }

    /// Set the distance metric.
    pub fn distance(mut self, distance: Distance) -> Self {
        self.config.distance = distance;
        self
    }

    /// Set the hybrid weighting factor.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.config.alpha = alpha;
        self
    }

    /// Set the number of passages retrieved per question.
    pub fn limit(mut self, limit: usize) -> Self {
        self.config.limit = limit;
        self
    }

    /// Set the character budget of the answer context.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    /// Set the Weaviate base URL.
    pub fn weaviate_url(mut self, url: impl Into<String>) -> Self {
        self.config.weaviate_url = url.into();
        self
    }

    /// Set the Ollama base URL.
    pub fn ollama_url(mut self, url: impl Into<String>) -> Self {
        self.config.ollama_url = url.into();
        self
    }

    /// Set the embedding model name.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    /// Set the generation model name.
    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.config.llm_model = model.into();
        self
    }

    /// Set the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the number of concurrent ingestion workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_chunk_tokens, 300);
        assert_eq!(config.overlap_tokens, 50);
        assert_eq!(config.limit, 3);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = RagConfig::builder().max_chunk_tokens(50).overlap_tokens(50).build().unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn alpha_out_of_range_is_rejected() {
        assert!(RagConfig::builder().alpha(1.5).build().is_err());
        assert!(RagConfig::builder().alpha(-0.1).build().is_err());
        assert!(RagConfig::builder().alpha(0.0).build().is_ok());
        assert!(RagConfig::builder().alpha(1.0).build().is_ok());
    }

    #[test]
    fn zero_limit_and_workers_are_rejected() {
        assert!(RagConfig::builder().limit(0).build().is_err());
        assert!(RagConfig::builder().workers(0).build().is_err());
        assert!(RagConfig::builder().dimensions(0).build().is_err());
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        let config = RagConfig { request_timeout_secs: 0, ..RagConfig::default() };
        assert!(matches!(config.validate(), Err(RagError::Configuration(_))));

        let lookup = lookup_from(&[("REQUEST_TIMEOUT_SECS", "0")]);
        assert!(RagConfig::from_lookup(lookup).is_err());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = RagConfig::from_lookup(lookup_from(&[
            ("COLLECTION", "Handbook"),
            ("ALPHA", "0.25"),
            ("WORKERS", "8"),
            ("TOKENIZER_PATH", "/models/tokenizer.json"),
        ]))
        .unwrap();
        assert_eq!(config.collection, "Handbook");
        assert_eq!(config.alpha, 0.25);
        assert_eq!(config.workers, 8);
        assert_eq!(config.tokenizer_path, Some(PathBuf::from("/models/tokenizer.json")));
        assert_eq!(config.limit, 3);
    }

    #[test]
    fn unparsable_lookup_value_is_a_configuration_error() {
        let err = RagConfig::from_lookup(lookup_from(&[("LIMIT", "three")])).unwrap_err();
        assert!(err.to_string().contains("RAGLINE_LIMIT"));
    }

    #[test]
    fn invalid_lookup_combination_is_rejected() {
        let err = RagConfig::from_lookup(lookup_from(&[
            ("MAX_CHUNK_TOKENS", "40"),
            ("OVERLAP_TOKENS", "40"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn schema_mirrors_config() {
        let config = RagConfig::builder().collection("Notes").dimensions(16).build().unwrap();
        let schema = config.schema();
        assert_eq!(schema.name, "Notes");
        assert_eq!(schema.text_property, "content");
        assert_eq!(schema.dimensions, 16);
    }
}
