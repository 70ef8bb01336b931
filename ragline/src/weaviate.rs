//! Weaviate vector store backend.
//!
//! Provides [`WeaviateVectorStore`] which implements [`VectorStore`] against
//! Weaviate's REST and GraphQL APIs using `reqwest`. Vectors are always
//! supplied by the caller: collections are created with `vectorizer: "none"`.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragline::weaviate::WeaviateVectorStore;
//!
//! let store = WeaviateVectorStore::new("http://localhost:8080", "content")?;
//! store.ping().await?;
//! store.ensure_collection(&config.schema()).await?;
//! let results = store.hybrid_search("Document", &query).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::RagConfig;
use crate::document::{
    CHUNK_INDEX_KEY, CollectionSchema, IndexedRecord, RetrievalResult, SOURCE_KEY, ScoredPassage,
};
use crate::error::{RagError, Result};
use crate::vectorstore::{HybridQuery, VectorStore};

const BACKEND: &str = "weaviate";

/// Weaviate class names must start with an upper-case letter.
pub fn class_name(collection: &str) -> String {
    let mut chars = collection.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Properties of a class as known to this handle.
#[derive(Debug, Clone)]
struct ClassInfo {
    text_property: String,
    properties: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct ClassDefinition {
    #[serde(default)]
    vectorizer: Option<String>,
    #[serde(default)]
    properties: Vec<PropertyDefinition>,
    #[serde(default, rename = "vectorIndexConfig")]
    vector_index_config: Option<VectorIndexConfig>,
}

#[derive(Debug, Deserialize)]
struct PropertyDefinition {
    name: String,
    #[serde(default, rename = "dataType")]
    data_type: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VectorIndexConfig {
    #[serde(default)]
    distance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// A [`VectorStore`] backed by [Weaviate](https://weaviate.io/).
pub struct WeaviateVectorStore {
    client: reqwest::Client,
    base_url: String,
    default_text_property: String,
    classes: RwLock<HashMap<String, ClassInfo>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for WeaviateVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeaviateVectorStore")
            .field("base_url", &self.base_url)
            .field("default_text_property", &self.default_text_property)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl WeaviateVectorStore {
    /// Create a store for the Weaviate instance at `base_url`.
    ///
    /// `text_property` is the property read back by searches on collections
    /// this handle has not seen through [`ensure_collection`](VectorStore::ensure_collection).
    pub fn new(base_url: &str, text_property: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, text_property, Duration::from_secs(60))
    }

    /// Like [`new`](Self::new) with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: &str,
        text_property: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_text_property: text_property.into(),
            classes: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Create a store from the Weaviate settings of `config`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::with_timeout(
            &config.weaviate_url,
            config.text_property.clone(),
            config.request_timeout(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
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

    fn store_error(message: impl Into<String>) -> RagError {
        RagError::VectorStore { backend: BACKEND.to_string(), message: message.into() }
    }

    /// Transport failures that never reached the server are connectivity problems.
    fn map_transport(e: reqwest::Error) -> RagError {
        error!(backend = BACKEND, error = %e, "request failed");
        if e.is_connect() {
            RagError::Connectivity { backend: BACKEND.to_string(), message: e.to_string() }
        } else {
            Self::store_error(format!("request failed: {e}"))
        }
    }

    async fn failure_detail(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        // {"error":[{"message":"..."}]}
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error")?
                    .as_array()?
                    .iter()
                    .filter_map(|e| e.get("message")?.as_str().map(str::to_string))
                    .reduce(|a, b| format!("{a}; {b}"))
            })
            .unwrap_or(body);
        format!("API returned {status}: {detail}")
    }

    async fn fetch_class(&self, class: &str) -> Result<Option<ClassDefinition>> {
        let response = self
            .client
            .get(self.url(&format!("/v1/schema/{class}")))
            .send()
            .await
            .map_err(Self::map_transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::store_error(Self::failure_detail(response).await));
        }
        let definition = response
            .json::<ClassDefinition>()
            .await
            .map_err(|e| Self::store_error(format!("failed to parse class definition: {e}")))?;
        Ok(Some(definition))
    }

    /// Cached class info, loading the class definition on first use.
    async fn class_info(&self, collection: &str) -> Result<ClassInfo> {
        let class = class_name(collection);
        if let Some(info) = self.classes.read().await.get(&class) {
            return Ok(info.clone());
        }

        let definition = self
            .fetch_class(&class)
            .await?
            .ok_or_else(|| Self::store_error(format!("collection '{class}' does not exist")))?;
        let info = ClassInfo {
            text_property: self.default_text_property.clone(),
            properties: definition.properties.into_iter().map(|p| p.name).collect(),
        };
        self.classes.write().await.insert(class, info.clone());
        Ok(info)
    }

    fn check_compatible(
        class: &str,
        schema: &CollectionSchema,
        existing: &ClassDefinition,
    ) -> Result<()> {
        let conflict =
            |message: String| RagError::SchemaConflict { collection: class.to_string(), message };

        let vectorizer = existing.vectorizer.as_deref().unwrap_or("none");
        if vectorizer != "none" {
            return Err(conflict(format!("vectorizer is '{vectorizer}', expected 'none'")));
        }

        let text = existing
            .properties
            .iter()
            .find(|p| p.name == schema.text_property)
            .ok_or_else(|| conflict(format!("missing text property '{}'", schema.text_property)))?;
        if !text.data_type.iter().any(|t| t == "text") {
            return Err(conflict(format!(
                "property '{}' has data type {:?}, expected text",
                schema.text_property, text.data_type
            )));
        }

        if let Some(distance) =
            existing.vector_index_config.as_ref().and_then(|c| c.distance.as_deref())
        {
            if distance != schema.distance.as_str() {
                return Err(conflict(format!(
                    "distance is '{distance}', expected '{}'",
                    schema.distance.as_str()
                )));
            }
        }
        Ok(())
    }

    async fn graphql(&self, query: String) -> Result<Value> {
        let response = self
            .client
            .post(self.url("/v1/graphql"))
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(Self::map_transport)?;

        if !response.status().is_success() {
            return Err(Self::store_error(Self::failure_detail(response).await));
        }

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| Self::store_error(format!("failed to parse GraphQL response: {e}")))?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let message = errors.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; ");
            error!(backend = BACKEND, %message, "GraphQL error");
            return Err(Self::store_error(message));
        }
        body.data.ok_or_else(|| Self::store_error("GraphQL response has no data"))
    }
}

/// Build the hybrid `Get` query for `class`, reading back `text_property`.
fn hybrid_graphql(class: &str, text_property: &str, query: &HybridQuery) -> String {
    // JSON string and number literals are valid GraphQL literals.
    let text = serde_json::to_string(&query.text).unwrap_or_else(|_| "\"\"".to_string());
    let vector = serde_json::to_string(&query.vector).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{{ Get {{ {class}(hybrid: {{query: {text}, vector: {vector}, alpha: {alpha}, \
         fusionType: relativeScoreFusion}}, limit: {limit}) \
         {{ {text_property} _additional {{ id score }} }} }} }}",
        alpha = query.alpha,
        limit = query.limit,
    )
}

/// Weaviate reports scores as strings or numbers depending on version.
fn parse_score(value: Option<&Value>) -> f32 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default() as f32,
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0.0,
    }
}

fn parse_hits(data: &Value, class: &str, text_property: &str) -> RetrievalResult {
    let hits = data
        .get("Get")
        .and_then(|g| g.get(class))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let passages = hits
        .iter()
        .map(|hit| {
            let additional = hit.get("_additional");
            ScoredPassage {
                id: additional
                    .and_then(|a| a.get("id"))
                    .and_then(Value::as_str)
                    .and_then(|id| Uuid::parse_str(id).ok()),
                text: hit
                    .get(text_property)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                score: parse_score(additional.and_then(|a| a.get("score"))),
            }
        })
        .collect();
    RetrievalResult::new(passages)
}

#[async_trait]
impl VectorStore for WeaviateVectorStore {
    async fn ping(&self) -> Result<()> {
        self.check_open()?;
        let unreachable =
            |message: String| RagError::Connectivity { backend: BACKEND.to_string(), message };

        let response = self
            .client
            .get(self.url("/v1/.well-known/ready"))
            .send()
            .await
            .map_err(|e| unreachable(format!("{} is unreachable: {e}", self.base_url)))?;

        if !response.status().is_success() {
            return Err(unreachable(format!(
                "{} is not ready ({})",
                self.base_url,
                response.status()
            )));
        }
        debug!(backend = BACKEND, url = %self.base_url, "store is ready");
        Ok(())
    }

    async fn ensure_collection(&self, schema: &CollectionSchema) -> Result<()> {
        self.check_open()?;
        let class = class_name(&schema.name);

        if let Some(existing) = self.fetch_class(&class).await? {
            Self::check_compatible(&class, schema, &existing)?;
            let info = ClassInfo {
                text_property: schema.text_property.clone(),
                properties: existing.properties.into_iter().map(|p| p.name).collect(),
            };
            self.classes.write().await.insert(class.clone(), info);
            info!(collection = %class, "collection already exists, reusing");
            return Ok(());
        }

        let properties = [schema.text_property.as_str(), SOURCE_KEY, CHUNK_INDEX_KEY];
        let body = json!({
            "class": class,
            "vectorizer": "none",
            "vectorIndexConfig": { "distance": schema.distance.as_str() },
            "properties": properties
                .iter()
                .map(|name| json!({ "name": name, "dataType": ["text"] }))
                .collect::<Vec<_>>(),
        });

        let response = self
            .client
            .post(self.url("/v1/schema"))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;
        if !response.status().is_success() {
            let detail = Self::failure_detail(response).await;
            error!(collection = %class, %detail, "failed to create collection");
            return Err(RagError::SchemaConflict { collection: class, message: detail });
        }

        let info = ClassInfo {
            text_property: schema.text_property.clone(),
            properties: properties.iter().map(|p| p.to_string()).collect(),
        };
        self.classes.write().await.insert(class.clone(), info);
        info!(collection = %class, dimensions = schema.dimensions, "created collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, record: &IndexedRecord) -> Result<()> {
        self.check_open()?;
        let class = class_name(collection);
        let info = self.class_info(collection).await?;

        let mut properties = serde_json::Map::new();
        properties.insert(info.text_property.clone(), Value::String(record.text.clone()));
        for (key, value) in &record.metadata {
            if info.properties.contains(key) && *key != info.text_property {
                properties.insert(key.clone(), Value::String(value.clone()));
            }
        }

        let response = self
            .client
            .post(self.url("/v1/objects"))
            .json(&json!({
                "class": class,
                "id": record.id,
                "properties": properties,
                "vector": record.vector,
            }))
            .send()
            .await
            .map_err(Self::map_transport)?;

        if !response.status().is_success() {
            let detail = Self::failure_detail(response).await;
            error!(collection = %class, id = %record.id, %detail, "insert failed");
            return Err(Self::store_error(detail));
        }
        Ok(())
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        query: &HybridQuery,
    ) -> Result<RetrievalResult> {
        self.check_open()?;
        let class = class_name(collection);
        let text_property = match self.classes.read().await.get(&class) {
            Some(info) => info.text_property.clone(),
            None => self.default_text_property.clone(),
        };

        let data = self.graphql(hybrid_graphql(&class, &text_property, query)).await?;
        let result = parse_hits(&data, &class, &text_property);
        debug!(
            collection = %class,
            result_count = result.len(),
            alpha = query.alpha,
            "hybrid search"
        );
        Ok(result)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.check_open()?;
        let class = class_name(collection);
        let data =
            self.graphql(format!("{{ Aggregate {{ {class} {{ meta {{ count }} }} }} }}")).await?;
        data.get("Aggregate")
            .and_then(|a| a.get(&class))
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("meta"))
            .and_then(|m| m.get("count"))
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| Self::store_error(format!("no count returned for '{class}'")))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.check_open()?;
        let class = class_name(name);
        let response = self
            .client
            .delete(self.url(&format!("/v1/schema/{class}")))
            .send()
            .await
            .map_err(Self::map_transport)?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(Self::store_error(Self::failure_detail(response).await));
        }
        self.classes.write().await.remove(&class);
        info!(collection = %class, "deleted collection");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        debug!(backend = BACKEND, "store handle closed");
        Ok(())
    }

    fn name(&self) -> &str {
        BACKEND
    }
}
