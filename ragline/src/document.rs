//! Data types for documents, chunks, index records and retrieval results.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata key holding the source identifier of a record.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the position of a chunk within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Raw text content plus the identifier of where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Source identifier, usually the file name.
    pub source: String,
    /// The full text of the document.
    pub text: String,
}

impl Document {
    /// Create a document from a source identifier and its text.
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self { source: source.into(), text: text.into() }
    }

    /// Create a document whose source identifier is the file name of `path`.
    pub fn from_path(path: &Path, text: impl Into<String>) -> Self {
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(source, text)
    }
}

/// A contiguous, token-bounded slice of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk within its document, starting at zero.
    pub index: usize,
    /// The chunk content.
    pub text: String,
    /// Number of tokens in `text`.
    pub token_count: usize,
    /// Byte offset of the chunk start in the document text.
    pub start: usize,
    /// Byte offset one past the chunk end in the document text.
    pub end: usize,
}

/// A record persisted in the index store: one per ingested chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedRecord {
    /// Globally unique identifier generated at ingestion time.
    pub id: Uuid,
    /// The chunk content.
    pub text: String,
    /// The embedding of `text`.
    pub vector: Vec<f32>,
    /// Key-value metadata such as [`SOURCE_KEY`] and [`CHUNK_INDEX_KEY`].
    pub metadata: HashMap<String, String>,
}

impl IndexedRecord {
    /// Create a record for `chunk` of the document named `source` with a fresh random id.
    ///
    /// Ids are never derived from content, so ingesting the same file twice
    /// stores two copies of each chunk.
    pub fn for_chunk(source: &str, chunk: &Chunk, vector: Vec<f32>) -> Self {
        let metadata = HashMap::from([
            (SOURCE_KEY.to_string(), source.to_string()),
            (CHUNK_INDEX_KEY.to_string(), chunk.index.to_string()),
        ]);
        Self { id: Uuid::new_v4(), text: chunk.text.clone(), vector, metadata }
    }
}

/// Distance metric of a collection's vector index.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Distance {
    /// Cosine distance.
    #[default]
    Cosine,
    /// Negative dot product.
    Dot,
    /// Squared euclidean distance.
    L2Squared,
}

impl Distance {
    /// The identifier of the metric as used by Weaviate.
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::Dot => "dot",
            Distance::L2Squared => "l2-squared",
        }
    }
}

/// The declared shape of a collection.
///
/// Vectors are always supplied by the caller; the store never vectorizes
/// text on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Name of the required text property.
    pub text_property: String,
    /// Vector dimensionality.
    pub dimensions: usize,
    /// Distance metric.
    pub distance: Distance,
}

/// One retrieved passage and its fused relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPassage {
    /// Identifier of the matching record, when the store reports it.
    pub id: Option<Uuid>,
    /// The passage text.
    pub text: String,
    /// Fused relevance score (higher is more relevant).
    pub score: f32,
}

/// Passages returned by a hybrid search, ordered by descending fused score.
///
/// The order of passages with equal scores is defined by the store and must
/// not be relied upon.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    passages: Vec<ScoredPassage>,
}

impl RetrievalResult {
    /// Wrap passages that are already in descending score order.
    pub fn new(passages: Vec<ScoredPassage>) -> Self {
        Self { passages }
    }

    /// An empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether no passage was retrieved.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Number of retrieved passages.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// The passages, most relevant first.
    pub fn passages(&self) -> &[ScoredPassage] {
        &self.passages
    }

    /// Iterate over passage texts, most relevant first.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.passages.iter().map(|p| p.text.as_str())
    }
}

impl IntoIterator for RetrievalResult {
    type Item = ScoredPassage;
    type IntoIter = std::vec::IntoIter<ScoredPassage>;

    fn into_iter(self) -> Self::IntoIter {
        self.passages.into_iter()
    }
}
