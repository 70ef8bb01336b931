//! In-memory capture of `tracing` events.
//!
//! [`CaptureLayer`] records every event it sees into a shared
//! [`EventCapture`], so tests can assert on what a pipeline logged:
//!
//! ```rust,ignore
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let capture = EventCapture::new();
//! let subscriber = tracing_subscriber::registry().with(capture.layer());
//! let _guard = tracing::subscriber::set_default(subscriber);
//!
//! run_pipeline().await;
//! assert_eq!(capture.errors_mentioning("broken.txt").len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::{Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// One recorded event.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    /// Event level, upper-case (`"ERROR"`, `"WARN"`, ...).
    pub level: String,
    /// The event target, usually the emitting module path.
    pub target: String,
    /// The formatted message.
    pub message: String,
    /// Structured fields other than the message.
    pub fields: HashMap<String, Value>,
}

impl CapturedEvent {
    /// A field rendered as a string, if present.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Whether the message or any field value contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.message.contains(needle)
            || self.fields.keys().any(|k| self.field(k).is_some_and(|v| v.contains(needle)))
    }

    /// Whether this event was logged at `level`.
    pub fn is(&self, level: Level) -> bool {
        self.level == level.as_str()
    }
}

/// Shared storage for captured events. Cloning shares the storage.
#[derive(Debug, Clone, Default)]
pub struct EventCapture {
    events: Arc<RwLock<Vec<CapturedEvent>>>,
}

impl EventCapture {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// A layer writing into this storage.
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer { capture: self.clone() }
    }

    /// All events so far, in emission order.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.read().map(|events| events.clone()).unwrap_or_default()
    }

    /// Events logged at `level`.
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.is(level)).collect()
    }

    /// Error events whose message or fields contain `needle`.
    pub fn errors_mentioning(&self, needle: &str) -> Vec<CapturedEvent> {
        self.at_level(Level::ERROR).into_iter().filter(|e| e.mentions(needle)).collect()
    }

    /// Forget every captured event.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    fn push(&self, event: CapturedEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}

/// A tracing layer that records events into an [`EventCapture`].
#[derive(Debug, Clone)]
pub struct CaptureLayer {
    capture: EventCapture,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = match fields.remove("message") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let metadata = event.metadata();
        self.capture.push(CapturedEvent {
            level: metadata.level().as_str().to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
        });
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}
