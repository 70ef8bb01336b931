//! Hybrid search behaviour of the in-memory vector store.

use std::collections::HashMap;

use proptest::prelude::*;
use ragline::document::{CollectionSchema, Distance, IndexedRecord};
use ragline::error::RagError;
use ragline::inmemory::InMemoryVectorStore;
use ragline::vectorstore::{HybridQuery, VectorStore};
use uuid::Uuid;

const DIM: usize = 8;

fn schema(name: &str, dimensions: usize) -> CollectionSchema {
    CollectionSchema {
        name: name.to_string(),
        text_property: "content".to_string(),
        dimensions,
        distance: Distance::Cosine,
    }
}

fn record(text: &str, vector: Vec<f32>) -> IndexedRecord {
    IndexedRecord { id: Uuid::new_v4(), text: text.to_string(), vector, metadata: HashMap::new() }
}

fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i % DIM] = 1.0;
    v
}

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

fn arb_record() -> impl Strategy<Value = IndexedRecord> {
    ("[a-z]{3,8}( [a-z]{3,8}){0,6}", arb_normalized_embedding(DIM))
        .prop_map(|(text, vector)| record(&text, vector))
}

/// For any stored records and any query, hybrid search returns at most
/// `limit` passages, ordered by descending fused score within [0, 1].
mod prop_hybrid_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_limit(
            records in proptest::collection::vec(arb_record(), 1..20),
            text in "[a-z]{3,8}( [a-z]{3,8}){0,3}",
            vector in arb_normalized_embedding(DIM),
            alpha in 0.0f32..=1.0,
            limit in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.ensure_collection(&schema("Test", DIM)).await.unwrap();
                for r in &records {
                    store.upsert("Test", r).await.unwrap();
                }
                let query = HybridQuery::new(text, vector, alpha, limit).unwrap();
                store.hybrid_search("Test", &query).await.unwrap()
            });

            prop_assert!(results.len() <= limit);
            prop_assert!(results.len() <= records.len());
            for passage in results.passages() {
                prop_assert!((0.0..=1.0 + 1e-6).contains(&passage.score));
            }
            for window in results.passages().windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }
    }
}

#[tokio::test]
async fn ensure_collection_is_idempotent() {
    let store = InMemoryVectorStore::new();
    store.ensure_collection(&schema("Docs", DIM)).await.unwrap();
    store.upsert("Docs", &record("kept", axis(0))).await.unwrap();

    store.ensure_collection(&schema("Docs", DIM)).await.unwrap();
    assert_eq!(store.count("Docs").await.unwrap(), 1);
}

#[tokio::test]
async fn incompatible_schema_is_a_conflict() {
    let store = InMemoryVectorStore::new();
    store.ensure_collection(&schema("Docs", DIM)).await.unwrap();

    let err = store.ensure_collection(&schema("Docs", DIM * 2)).await.unwrap_err();
    assert!(matches!(err, RagError::SchemaConflict { .. }));
    assert!(err.is_fatal());

    let mut renamed = schema("Docs", DIM);
    renamed.text_property = "body".to_string();
    assert!(store.ensure_collection(&renamed).await.is_err());
}

#[tokio::test]
async fn wrong_vector_length_is_rejected_on_upsert() {
    let store = InMemoryVectorStore::new();
    store.ensure_collection(&schema("Docs", DIM)).await.unwrap();
    let err = store.upsert("Docs", &record("short", vec![1.0, 0.0])).await.unwrap_err();
    assert!(matches!(err, RagError::VectorStore { .. }));
    assert_eq!(store.count("Docs").await.unwrap(), 0);
}

#[tokio::test]
async fn pure_keyword_search_only_returns_term_matches() {
    let store = InMemoryVectorStore::new();
    store.ensure_collection(&schema("Docs", DIM)).await.unwrap();
    store.upsert("Docs", &record("The sky is blue.", axis(0))).await.unwrap();
    store.upsert("Docs", &record("The grass is green.", axis(1))).await.unwrap();
    store.upsert("Docs", &record("Roses are red.", axis(2))).await.unwrap();

    let query = HybridQuery::new("blue sky", axis(2), 0.0, 10).unwrap();
    let results = store.hybrid_search("Docs", &query).await.unwrap();
    assert_eq!(results.texts().collect::<Vec<_>>(), vec!["The sky is blue."]);

    let query = HybridQuery::new("violet", axis(2), 0.0, 10).unwrap();
    assert!(store.hybrid_search("Docs", &query).await.unwrap().is_empty());
}

#[tokio::test]
async fn pure_vector_search_follows_similarity() {
    let store = InMemoryVectorStore::new();
    store.ensure_collection(&schema("Docs", DIM)).await.unwrap();
    store.upsert("Docs", &record("The sky is blue.", axis(0))).await.unwrap();
    store.upsert("Docs", &record("The grass is green.", axis(1))).await.unwrap();

    let query = HybridQuery::new("blue sky", axis(1), 1.0, 1).unwrap();
    let results = store.hybrid_search("Docs", &query).await.unwrap();
    assert_eq!(results.texts().collect::<Vec<_>>(), vec!["The grass is green."]);
}

#[tokio::test]
async fn fusion_balances_keyword_and_vector_relevance() {
    let store = InMemoryVectorStore::new();
    store.ensure_collection(&schema("Docs", DIM)).await.unwrap();
    // keyword favours the first record, the vector favours the second
    store.upsert("Docs", &record("sky sky sky", axis(0))).await.unwrap();
    store.upsert("Docs", &record("grass", axis(1))).await.unwrap();

    let keyword_heavy = HybridQuery::new("sky", axis(1), 0.3, 2).unwrap();
    let results = store.hybrid_search("Docs", &keyword_heavy).await.unwrap();
    assert_eq!(results.passages()[0].text, "sky sky sky");

    let vector_heavy = HybridQuery::new("sky", axis(1), 0.7, 2).unwrap();
    let results = store.hybrid_search("Docs", &vector_heavy).await.unwrap();
    assert_eq!(results.passages()[0].text, "grass");
}

#[tokio::test]
async fn empty_collection_returns_empty_result() {
    let store = InMemoryVectorStore::new();
    store.ensure_collection(&schema("Docs", DIM)).await.unwrap();
    let query = HybridQuery::new("anything", axis(0), 0.7, 3).unwrap();
    assert!(store.hybrid_search("Docs", &query).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_collection_is_an_error() {
    let store = InMemoryVectorStore::new();
    let query = HybridQuery::new("anything", axis(0), 0.7, 3).unwrap();
    assert!(matches!(
        store.hybrid_search("Nope", &query).await,
        Err(RagError::VectorStore { .. })
    ));
}

#[tokio::test]
async fn delete_collection_removes_records() {
    let store = InMemoryVectorStore::new();
    store.ensure_collection(&schema("Docs", DIM)).await.unwrap();
    store.upsert("Docs", &record("gone", axis(0))).await.unwrap();
    store.delete_collection("Docs").await.unwrap();
    assert!(store.count("Docs").await.is_err());
}

#[tokio::test]
async fn closed_store_refuses_work() {
    let store = InMemoryVectorStore::new();
    store.ensure_collection(&schema("Docs", DIM)).await.unwrap();
    store.close().await.unwrap();

    assert!(matches!(store.ping().await, Err(RagError::Connectivity { .. })));
    assert!(store.upsert("Docs", &record("late", axis(0))).await.is_err());
}
