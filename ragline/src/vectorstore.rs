//! Vector store trait: the index store adapter used by both pipelines.

use async_trait::async_trait;

use crate::config::validate_alpha;
use crate::document::{CollectionSchema, IndexedRecord, RetrievalResult};
use crate::error::{RagError, Result};

/// Parameters of a hybrid (keyword + vector) search.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridQuery {
    /// Query text for the keyword side.
    pub text: String,
    /// Query embedding for the vector side.
    pub vector: Vec<f32>,
    /// Weight of the vector score: 0 is pure keyword, 1 is pure vector.
    pub alpha: f32,
    /// Maximum number of passages to return.
    pub limit: usize,
}

impl HybridQuery {
    /// Create a query, validating `alpha` and `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if `alpha` is outside `[0, 1]` or
    /// `limit` is zero.
    pub fn new(
        text: impl Into<String>,
        vector: Vec<f32>,
        alpha: f32,
        limit: usize,
    ) -> Result<Self> {
        validate_alpha(alpha)?;
        if limit == 0 {
            return Err(RagError::Configuration("limit must be greater than zero".to_string()));
        }
        Ok(Self { text: text.into(), vector, alpha, limit })
    }
}

/// A storage backend holding indexed chunks, with hybrid search.
///
/// A store handle is a connection: it is created once per pipeline run,
/// shared by every worker of that run, and released with
/// [`close`](VectorStore::close) when the run ends.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.ensure_collection(&config.schema()).await?;
/// store.upsert("Document", &record).await?;
/// let results = store.hybrid_search("Document", &query).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check that the store is reachable.
    ///
    /// Fails with [`RagError::Connectivity`] otherwise.
    async fn ping(&self) -> Result<()>;

    /// Create the collection described by `schema` if it does not exist.
    ///
    /// Calling this again with the same schema is a no-op. Fails with
    /// [`RagError::SchemaConflict`] if an existing collection is incompatible;
    /// existing collections are never migrated.
    async fn ensure_collection(&self, schema: &CollectionSchema) -> Result<()>;

    /// Insert one record into `collection`.
    async fn upsert(&self, collection: &str, record: &IndexedRecord) -> Result<()>;

    /// Fuse keyword and vector relevance and return the best `query.limit` passages.
    ///
    /// Returns passages ordered by descending fused score, and an empty
    /// result (not an error) when nothing matches.
    async fn hybrid_search(&self, collection: &str, query: &HybridQuery) -> Result<RetrievalResult>;

    /// Number of records in `collection`.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Delete a collection and all of its records.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Release the connection. Later calls fail with [`RagError::Connectivity`].
    async fn close(&self) -> Result<()>;

    /// A short backend name for logs and errors.
    fn name(&self) -> &str;
}
