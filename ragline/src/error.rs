//! Error types for the `ragline` crate.
//!
//! Errors fall into two classes. Fatal errors ([`RagError::is_fatal`]) end
//! the current pipeline run: bad configuration, an unreachable index store,
//! or an incompatible collection schema. Everything else is local to one
//! unit of work (a file, a chunk, or a single question) and is recovered at
//! that unit's boundary.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in ragline operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid parameters, vector dimension mismatch or a missing corpus path.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The index store could not be reached at all.
    #[error("Connectivity error ({backend}): {message}")]
    Connectivity {
        /// The backend that could not be reached.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An existing collection does not match the requested schema.
    #[error("Schema conflict in collection '{collection}': {message}")]
    SchemaConflict {
        /// The conflicting collection.
        collection: String,
        /// What differs from the requested schema.
        message: String,
    },

    /// The embedding service failed or returned an unusable response.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An index store operation failed after the connection was established.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model service failed.
    #[error("Language model error ({provider}): {message}")]
    LanguageModel {
        /// The model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Tokenization failed.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// An external call did not finish within its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// Reading a corpus file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RagError {
    /// Whether this error ends the current run instead of a single unit of work.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RagError::Configuration(_)
                | RagError::Connectivity { .. }
                | RagError::SchemaConflict { .. }
        )
    }
}

/// A convenience result type for ragline operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Await `future`, failing with [`RagError::Timeout`] once `after` has elapsed.
pub(crate) async fn with_deadline<T>(
    operation: &'static str,
    after: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, future).await.map_err(|_| RagError::Timeout { operation, after })?
}
