//! In-memory vector store with hybrid search.
//!
//! This module provides [`InMemoryVectorStore`], a zero-dependency store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. Keyword
//! relevance is BM25, vector relevance follows the collection's distance
//! metric, and the two are combined with relative score fusion: each score
//! list is min-max normalised to `[0, 1]` and mixed as
//! `alpha * vector + (1 - alpha) * keyword`. It is suitable for development,
//! testing, and small corpora.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{CollectionSchema, Distance, IndexedRecord, RetrievalResult, ScoredPassage};
use crate::error::{RagError, Result};
use crate::vectorstore::{HybridQuery, VectorStore};

const BACKEND: &str = "in-memory";

/// BM25 term frequency saturation.
const BM25_K1: f32 = 1.2;
/// BM25 document length normalisation.
const BM25_B: f32 = 0.75;

static TERMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("term pattern is valid"));

/// Lower-cased word terms of `text`, as used for keyword scoring.
pub(crate) fn keyword_terms(text: &str) -> Vec<String> {
    TERMS.find_iter(text).map(|m| m.as_str().to_lowercase()).collect()
}

#[derive(Debug)]
struct Collection {
    schema: CollectionSchema,
    // insertion order doubles as the tie-break order of search results
    records: Vec<IndexedRecord>,
}

/// An in-memory [`VectorStore`] with BM25 + vector hybrid search.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.ensure_collection(&schema).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    closed: AtomicBool,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RagError::Connectivity {
                backend: BACKEND.to_string(),
                message: "store handle has been closed".to_string(),
            });
        }
        Ok(())
    }

    fn missing(collection: &str) -> RagError {
        RagError::VectorStore {
            backend: BACKEND.to_string(),
            message: format!("collection '{collection}' does not exist"),
        }
    }
}

fn similarity(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    match distance {
        Distance::Cosine => {
            let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                return 0.0;
            }
            dot / (norm_a * norm_b)
        }
        Distance::Dot => dot,
        Distance::L2Squared => -a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>(),
    }
}

/// BM25 score of every record against the query terms.
fn bm25_scores(records: &[IndexedRecord], query: &str) -> Vec<f32> {
    let query_terms: HashSet<String> = keyword_terms(query).into_iter().collect();
    if query_terms.is_empty() || records.is_empty() {
        return vec![0.0; records.len()];
    }

    let docs: Vec<Vec<String>> = records.iter().map(|r| keyword_terms(&r.text)).collect();
    let total = docs.len() as f32;
    let avg_len = (docs.iter().map(Vec::len).sum::<usize>() as f32 / total).max(1.0);

    let idf: HashMap<&str, f32> = query_terms
        .iter()
        .map(|term| {
            let df = docs.iter().filter(|d| d.iter().any(|t| t == term)).count() as f32;
            (term.as_str(), (1.0 + (total - df + 0.5) / (df + 0.5)).ln())
        })
        .collect();

    docs.iter()
        .map(|doc| {
            let len = doc.len() as f32;
            idf.iter()
                .map(|(term, idf)| {
                    let tf = doc.iter().filter(|t| t == term).count() as f32;
                    if tf == 0.0 {
                        return 0.0;
                    }
                    idf * tf * (BM25_K1 + 1.0)
                        / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * len / avg_len))
                })
                .sum()
        })
        .collect()
}

/// Min-max normalise `scores` (restricted to `candidates`) into `[0, 1]`.
///
/// A flat list maps to 1 when its value is positive and 0 otherwise.
fn normalize(scores: &[f32], candidates: &[usize]) -> HashMap<usize, f32> {
    let values = candidates.iter().map(|&i| scores[i]);
    let min = values.clone().fold(f32::INFINITY, f32::min);
    let max = values.fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    candidates
        .iter()
        .map(|&i| {
            let value = if range > f32::EPSILON {
                (scores[i] - min) / range
            } else if max > 0.0 {
                1.0
            } else {
                0.0
            };
            (i, value)
        })
        .collect()
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ping(&self) -> Result<()> {
        self.check_open()
    }

    async fn ensure_collection(&self, schema: &CollectionSchema) -> Result<()> {
        self.check_open()?;
        let mut collections = self.collections.write().await;

        if let Some(existing) = collections.get(&schema.name) {
            let current = &existing.schema;
            let mismatch = if current.text_property != schema.text_property {
                Some(format!(
                    "text property is '{}', expected '{}'",
                    current.text_property, schema.text_property
                ))
            } else if current.dimensions != schema.dimensions {
                Some(format!(
                    "vectors have {} dimensions, expected {}",
                    current.dimensions, schema.dimensions
                ))
            } else if current.distance != schema.distance {
                Some(format!(
                    "distance is {}, expected {}",
                    current.distance.as_str(),
                    schema.distance.as_str()
                ))
            } else {
                None
            };

            return match mismatch {
                Some(message) => {
                    Err(RagError::SchemaConflict { collection: schema.name.clone(), message })
                }
                None => {
                    debug!(collection = %schema.name, "collection already exists, reusing");
                    Ok(())
                }
            };
        }

        let collection = Collection { schema: schema.clone(), records: Vec::new() };
        collections.insert(schema.name.clone(), collection);
        debug!(collection = %schema.name, dimensions = schema.dimensions, "created collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, record: &IndexedRecord) -> Result<()> {
        self.check_open()?;
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| Self::missing(collection))?;

        if record.vector.len() != store.schema.dimensions {
            return Err(RagError::VectorStore {
                backend: BACKEND.to_string(),
                message: format!(
                    "vector has {} dimensions, collection '{collection}' expects {}",
                    record.vector.len(),
                    store.schema.dimensions
                ),
            });
        }

        match store.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => store.records.push(record.clone()),
        }
        Ok(())
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        query: &HybridQuery,
    ) -> Result<RetrievalResult> {
        self.check_open()?;
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| Self::missing(collection))?;
        let records = &store.records;

        if records.is_empty() {
            return Ok(RetrievalResult::empty());
        }
        if query.vector.len() != store.schema.dimensions {
            return Err(RagError::VectorStore {
                backend: BACKEND.to_string(),
                message: format!(
                    "query vector has {} dimensions, collection '{collection}' expects {}",
                    query.vector.len(),
                    store.schema.dimensions
                ),
            });
        }

        let keyword = bm25_scores(records, &query.text);
        let vector: Vec<f32> = records
            .iter()
            .map(|r| similarity(store.schema.distance, &r.vector, &query.vector))
            .collect();

        // Every record is a vector candidate; pure keyword search only keeps term matches.
        let candidates: Vec<usize> = if query.alpha > 0.0 {
            (0..records.len()).collect()
        } else {
            (0..records.len()).filter(|&i| keyword[i] > 0.0).collect()
        };
        if candidates.is_empty() {
            return Ok(RetrievalResult::empty());
        }

        let keyword_norm = normalize(&keyword, &candidates);
        let vector_norm = normalize(&vector, &candidates);

        let mut scored: Vec<ScoredPassage> = candidates
            .iter()
            .map(|&i| {
                let fused = query.alpha * vector_norm[&i] + (1.0 - query.alpha) * keyword_norm[&i];
                ScoredPassage {
                    id: Some(records[i].id),
                    text: records[i].text.clone(),
                    score: fused,
                }
            })
            .collect();

        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(query.limit);

        debug!(collection, result_count = scored.len(), alpha = query.alpha, "hybrid search");
        Ok(RetrievalResult::new(scored))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.check_open()?;
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.records.len())
            .ok_or_else(|| Self::missing(collection))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.check_open()?;
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        BACKEND
    }
}
