//! # ragline
//!
//! Retrieval-augmented generation over a directory of text files.
//!
//! ## Overview
//!
//! - [`TokenChunker`] splits documents into overlapping, token-bounded chunks.
//! - [`EmbeddingProvider`] turns text into vectors ([`OllamaEmbeddingProvider`]).
//! - [`VectorStore`] stores records and runs hybrid keyword + vector search
//!   ([`WeaviateVectorStore`], [`InMemoryVectorStore`]).
//! - [`IngestionPipeline`] reads a corpus through a bounded worker pool,
//!   isolating failures per file and per chunk.
//! - [`QueryPipeline`] retrieves passages, assembles a bounded context and
//!   asks a [`LanguageModel`] ([`OllamaLanguageModel`]) for a grounded answer.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragline::*;
//!
//! let config = RagConfig::from_env()?;
//! let embedder = Arc::new(OllamaEmbeddingProvider::from_config(&config)?);
//! let store = Arc::new(WeaviateVectorStore::from_config(&config)?);
//!
//! let tokenizer = tokenizer_from_config(&config)?;
//! let ingestion =
//!     IngestionPipeline::new(config.clone(), tokenizer, embedder.clone(), store.clone())?;
//! let report = ingestion.run("./data").await?;
//!
//! let llm = Arc::new(OllamaLanguageModel::from_config(&config)?);
//! let query = QueryPipeline::new(config, embedder, store, llm)?;
//! println!("{}", query.answer("What color is the sky?").await);
//! ```
//!
//! ## Features
//!
//! - `ollama` (default): Ollama embedding and generation clients
//! - `weaviate` (default): Weaviate vector store
//! - `huggingface`: chunk with a HuggingFace `tokenizer.json`

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod inmemory;
pub mod llm;
pub mod mock;
pub mod query;
pub mod tokenizer;
pub mod vectorstore;

#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "weaviate")]
pub mod weaviate;

pub use chunking::{Chunker, TokenChunker, merge_chunks};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, CollectionSchema, Distance, Document, IndexedRecord, RetrievalResult, ScoredPassage,
};
pub use embedding::{CachedEmbeddingProvider, EmbeddingProvider};
pub use error::{RagError, Result};
pub use ingest::{IngestReport, IngestionPipeline, Stage, UnitFailure};
pub use inmemory::InMemoryVectorStore;
pub use llm::LanguageModel;
pub use query::{
    Answer, AnswerContext, NOT_IN_CONTEXT, PROMPT_TEMPLATE, QueryPipeline, render_prompt,
};
#[cfg(feature = "huggingface")]
pub use tokenizer::HuggingFaceTokenizer;
pub use tokenizer::{RegexTokenizer, Tokenizer, tokenizer_from_config};
pub use vectorstore::{HybridQuery, VectorStore};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaEmbeddingProvider, OllamaLanguageModel};
#[cfg(feature = "weaviate")]
pub use weaviate::WeaviateVectorStore;

pub use tokio_util::sync::CancellationToken;
