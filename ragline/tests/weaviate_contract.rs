//! Weaviate REST/GraphQL contract, checked against a local axum server.
#![cfg(feature = "weaviate")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ragline::document::{Chunk, CollectionSchema, Distance, IndexedRecord};
use ragline::error::RagError;
use ragline::vectorstore::{HybridQuery, VectorStore};
use ragline::weaviate::WeaviateVectorStore;
use serde_json::{Value, json};

#[derive(Default)]
struct Weaviate {
    classes: HashMap<String, Value>,
    schema_posts: usize,
    objects: Vec<Value>,
    queries: Vec<String>,
    graphql_error: Option<String>,
}

type Shared = Arc<Mutex<Weaviate>>;

async fn ready() -> StatusCode {
    StatusCode::OK
}

async fn get_class(
    State(state): State<Shared>,
    Path(class): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.lock().unwrap().classes.get(&class) {
        Some(definition) => (StatusCode::OK, Json(definition.clone())),
        None => (StatusCode::NOT_FOUND, Json(json!({}))),
    }
}

async fn delete_class(State(state): State<Shared>, Path(class): Path<String>) -> StatusCode {
    state.lock().unwrap().classes.remove(&class);
    StatusCode::OK
}

async fn create_class(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut state = state.lock().unwrap();
    state.schema_posts += 1;
    let class = body["class"].as_str().unwrap_or_default().to_string();
    state.classes.insert(class, body.clone());
    Json(body)
}

async fn create_object(
    State(state): State<Shared>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if body["vector"].as_array().is_none_or(|v| v.is_empty()) {
        let error = json!({ "error": [{ "message": "vector required" }] });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(error));
    }
    state.lock().unwrap().objects.push(body.clone());
    (StatusCode::OK, Json(body))
}

async fn graphql(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut state = state.lock().unwrap();
    let query = body["query"].as_str().unwrap_or_default().to_string();
    state.queries.push(query.clone());

    if let Some(message) = &state.graphql_error {
        return Json(json!({ "data": null, "errors": [{ "message": message }] }));
    }
    if query.contains("Aggregate") {
        let count = state.objects.len();
        return Json(json!({
            "data": { "Aggregate": { "Document": [{ "meta": { "count": count } }] } }
        }));
    }

    let hits: Vec<Value> = state
        .objects
        .iter()
        .enumerate()
        .map(|(i, object)| {
            json!({
                "content": object["properties"]["content"],
                "_additional": {
                    "id": object["id"],
                    "score": format!("{}", 1.0 / (i as f64 + 1.0)),
                },
            })
        })
        .collect();
    Json(json!({ "data": { "Get": { "Document": hits } } }))
}

async fn spawn_server(state: Weaviate) -> (String, Shared, tokio::task::JoinHandle<()>) {
    let shared = Arc::new(Mutex::new(state));
    let app = Router::new()
        .route("/v1/.well-known/ready", get(ready))
        .route("/v1/schema", post(create_class))
        .route("/v1/schema/{class}", get(get_class).delete(delete_class))
        .route("/v1/objects", post(create_object))
        .route("/v1/graphql", post(graphql))
        .with_state(shared.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (format!("http://{addr}"), shared, handle)
}

fn schema() -> CollectionSchema {
    CollectionSchema {
        name: "document".into(),
        text_property: "content".into(),
        dimensions: 3,
        distance: Distance::Cosine,
    }
}

fn record(text: &str, index: usize) -> IndexedRecord {
    let chunk = Chunk { index, text: text.into(), token_count: 1, start: 0, end: text.len() };
    let mut record = IndexedRecord::for_chunk("sky.txt", &chunk, vec![0.1, 0.2, 0.3]);
    record.metadata.insert("unknown_key".into(), "dropped".into());
    record
}

#[tokio::test]
async fn ensure_collection_creates_once() {
    let (base, state, handle) = spawn_server(Weaviate::default()).await;
    let store = WeaviateVectorStore::new(&base, "content").unwrap();

    store.ping().await.unwrap();
    store.ensure_collection(&schema()).await.unwrap();
    store.ensure_collection(&schema()).await.unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.schema_posts, 1);
    let class = &state.classes["Document"];
    assert_eq!(class["vectorizer"], json!("none"));
    assert_eq!(class["vectorIndexConfig"]["distance"], json!("cosine"));
    assert_eq!(class["properties"][0], json!({ "name": "content", "dataType": ["text"] }));
    handle.abort();
}

#[tokio::test]
async fn existing_vectorizing_class_is_a_conflict() {
    let mut seeded = Weaviate::default();
    seeded.classes.insert(
        "Document".into(),
        json!({
            "class": "Document",
            "vectorizer": "text2vec-transformers",
            "properties": [{ "name": "content", "dataType": ["text"] }],
        }),
    );
    let (base, _state, handle) = spawn_server(seeded).await;
    let store = WeaviateVectorStore::new(&base, "content").unwrap();

    let err = store.ensure_collection(&schema()).await.unwrap_err();
    assert!(matches!(err, RagError::SchemaConflict { .. }));
    handle.abort();
}

#[tokio::test]
async fn upsert_sends_vector_and_known_properties() {
    let (base, state, handle) = spawn_server(Weaviate::default()).await;
    let store = WeaviateVectorStore::new(&base, "content").unwrap();
    store.ensure_collection(&schema()).await.unwrap();

    let record = record("The sky is blue.", 0);
    store.upsert("document", &record).await.unwrap();

    let state = state.lock().unwrap();
    let object = &state.objects[0];
    assert_eq!(object["class"], json!("Document"));
    assert_eq!(object["id"], json!(record.id.to_string()));
    assert_eq!(object["properties"]["content"], json!("The sky is blue."));
    assert_eq!(object["properties"]["source"], json!("sky.txt"));
    assert_eq!(object["properties"]["chunk_index"], json!("0"));
    assert!(object["properties"].get("unknown_key").is_none());
    assert_eq!(object["vector"].as_array().map(Vec::len), Some(3));
    handle.abort();
}

#[tokio::test]
async fn upsert_into_missing_collection_fails() {
    let (base, _state, handle) = spawn_server(Weaviate::default()).await;
    let store = WeaviateVectorStore::new(&base, "content").unwrap();
    assert!(matches!(
        store.upsert("document", &record("text", 0)).await,
        Err(RagError::VectorStore { .. })
    ));
    handle.abort();
}

#[tokio::test]
async fn hybrid_search_parses_scores_in_order() {
    let (base, state, handle) = spawn_server(Weaviate::default()).await;
    let store = WeaviateVectorStore::new(&base, "content").unwrap();
    store.ensure_collection(&schema()).await.unwrap();
    store.upsert("document", &record("The sky is blue.", 0)).await.unwrap();
    store.upsert("document", &record("The grass is green.", 1)).await.unwrap();

    let query = HybridQuery::new("What color is the sky?", vec![0.1, 0.2, 0.3], 0.7, 3).unwrap();
    let results = store.hybrid_search("document", &query).await.unwrap();

    assert_eq!(
        results.texts().collect::<Vec<_>>(),
        vec!["The sky is blue.", "The grass is green."]
    );
    assert_eq!(results.passages()[0].score, 1.0);
    assert_eq!(results.passages()[1].score, 0.5);
    assert!(results.passages()[0].id.is_some());

    let sent = state.lock().unwrap().queries.last().cloned().unwrap();
    assert!(sent.contains("Document(hybrid:"));
    assert!(sent.contains("fusionType: relativeScoreFusion"));
    assert!(sent.contains("alpha: 0.7"));
    assert!(sent.contains("limit: 3"));
    assert_eq!(store.count("document").await.unwrap(), 2);
    handle.abort();
}

#[tokio::test]
async fn graphql_errors_become_store_errors() {
    let seeded = Weaviate {
        graphql_error: Some("Cannot query field \"Document\"".into()),
        ..Default::default()
    };
    let (base, _state, handle) = spawn_server(seeded).await;
    let store = WeaviateVectorStore::new(&base, "content").unwrap();

    let query = HybridQuery::new("sky", vec![0.1, 0.2, 0.3], 0.7, 3).unwrap();
    let err = store.hybrid_search("document", &query).await.unwrap_err();
    assert!(matches!(err, RagError::VectorStore { .. }));
    assert!(err.to_string().contains("Cannot query field"));
    handle.abort();
}

#[tokio::test]
async fn unreachable_instance_is_a_connectivity_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = WeaviateVectorStore::new(&format!("http://{addr}"), "content").unwrap();
    let err = store.ping().await.unwrap_err();
    assert!(matches!(err, RagError::Connectivity { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn closed_handle_refuses_work() {
    let (base, _state, handle) = spawn_server(Weaviate::default()).await;
    let store = WeaviateVectorStore::new(&base, "content").unwrap();
    store.close().await.unwrap();
    assert!(matches!(store.ping().await, Err(RagError::Connectivity { .. })));
    handle.abort();
}

#[tokio::test]
async fn delete_collection_removes_the_class() {
    let (base, state, handle) = spawn_server(Weaviate::default()).await;
    let store = WeaviateVectorStore::new(&base, "content").unwrap();
    store.ensure_collection(&schema()).await.unwrap();
    store.delete_collection("document").await.unwrap();
    assert!(state.lock().unwrap().classes.is_empty());
    handle.abort();
}
