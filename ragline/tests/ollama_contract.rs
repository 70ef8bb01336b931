//! Ollama HTTP contract, checked against a local axum server.
#![cfg(feature = "ollama")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use ragline::error::RagError;
use ragline::{
    EmbeddingProvider, InMemoryVectorStore, IngestionPipeline, LanguageModel,
    OllamaEmbeddingProvider, OllamaLanguageModel, RagConfig, RegexTokenizer, VectorStore,
};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Received(Arc<Mutex<Vec<Value>>>);

fn model_not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "model 'missing' not found" })))
}

async fn embeddings(
    State(received): State<Received>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    received.0.lock().unwrap().push(body.clone());
    match body["model"].as_str() {
        Some("missing") => model_not_found(),
        Some("broken") => (StatusCode::OK, Json(json!({ "unexpected": true }))),
        _ => (StatusCode::OK, Json(json!({ "embedding": [0.1, 0.2, 0.3] }))),
    }
}

async fn generate(
    State(received): State<Received>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    received.0.lock().unwrap().push(body.clone());
    match body["model"].as_str() {
        Some("missing") => model_not_found(),
        _ => (StatusCode::OK, Json(json!({ "response": "The sky is blue.", "done": true }))),
    }
}

async fn spawn_server() -> (String, Received, tokio::task::JoinHandle<()>) {
    let received = Received::default();
    let app = Router::new()
        .route("/api/embeddings", post(embeddings))
        .route("/api/generate", post(generate))
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (format!("http://{addr}"), received, handle)
}

#[tokio::test]
async fn embedding_request_and_response() {
    let (base, received, handle) = spawn_server().await;
    let provider = OllamaEmbeddingProvider::new(&base, "nomic-embed-text:latest", 3).unwrap();

    let vector = provider.embed("hello world").await.unwrap();
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);

    let body = received.0.lock().unwrap()[0].clone();
    assert_eq!(body, json!({ "model": "nomic-embed-text:latest", "prompt": "hello world" }));
    handle.abort();
}

#[tokio::test]
async fn unknown_model_is_an_embedding_error() {
    let (base, _received, handle) = spawn_server().await;
    let provider = OllamaEmbeddingProvider::new(&base, "missing", 3).unwrap();

    let err = provider.embed("hello").await.unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }));
    assert!(err.to_string().contains("model 'missing' not found"));
    handle.abort();
}

#[tokio::test]
async fn missing_vector_field_is_an_embedding_error() {
    let (base, _received, handle) = spawn_server().await;
    let provider = OllamaEmbeddingProvider::new(&base, "broken", 3).unwrap();
    assert!(matches!(provider.embed("hello").await, Err(RagError::Embedding { .. })));
    handle.abort();
}

#[tokio::test]
async fn unreachable_server_is_an_embedding_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let base = format!("http://{addr}");
    let provider =
        OllamaEmbeddingProvider::with_timeout(&base, "m", 3, Duration::from_secs(2)).unwrap();
    assert!(matches!(provider.embed("hello").await, Err(RagError::Embedding { .. })));
}

#[tokio::test]
async fn generation_is_not_streamed() {
    let (base, received, handle) = spawn_server().await;
    let model = OllamaLanguageModel::new(&base, "granite3.3:2b").unwrap();

    let answer = model.generate("Context:\nThe sky is blue.").await.unwrap();
    assert_eq!(answer, "The sky is blue.");

    let body = received.0.lock().unwrap()[0].clone();
    assert_eq!(body["stream"], json!(false));
    assert_eq!(body["model"], json!("granite3.3:2b"));
    handle.abort();
}

#[tokio::test]
async fn generation_failure_is_a_language_model_error() {
    let (base, _received, handle) = spawn_server().await;
    let model = OllamaLanguageModel::new(&base, "missing").unwrap();
    assert!(matches!(model.generate("hi").await, Err(RagError::LanguageModel { .. })));
    handle.abort();
}

#[tokio::test]
async fn ingestion_refuses_a_model_with_other_dimensions() {
    let (base, received, handle) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha content").unwrap();
    std::fs::write(dir.path().join("b.txt"), "bravo content").unwrap();

    // the server answers with 3 floats
    let config = RagConfig::builder().ollama_url(base.as_str()).dimensions(8).build().unwrap();
    let embedder = Arc::new(OllamaEmbeddingProvider::from_config(&config).unwrap());
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline =
        IngestionPipeline::new(config, Arc::new(RegexTokenizer::new()), embedder, store.clone())
            .unwrap();

    let err = pipeline.run(dir.path()).await.unwrap_err();
    assert!(matches!(err, RagError::Configuration(_)));
    assert!(err.to_string().contains("returned 3 dimensions"));
    assert_eq!(received.0.lock().unwrap().len(), 1);
    assert!(store.count("Document").await.is_err());
    handle.abort();
}
