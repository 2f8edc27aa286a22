//! Log collector
//!
//! Captures every log event of the step in memory so the full log can be
//! shipped with the telemetry if the step fails.
//!
//! [`CollectorLayer`] plugs into the `tracing` subscriber stack and turns
//! each event into a [`LogMessage`]; anything else that produces log lines
//! (for instance the output of a child process) can add to the same
//! collector directly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use telemeter_core::domain::log::{LogLevel, LogMessage};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::service::secrets::SecretRegistry;

/// Ordered in-memory accumulation of captured log lines
pub trait LogCollector: Send + Sync {
    /// Appends a message after all previously added ones
    fn add(&self, message: LogMessage);

    /// Returns a copy of all messages in the order they were added
    fn messages(&self) -> Vec<LogMessage>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory implementation of LogCollector
///
/// Clones share the same buffer, so the tracing layer and the step wrapper
/// can hold their own handle.
#[derive(Clone, Default)]
pub struct InMemoryLogCollector {
    buffer: Arc<Mutex<Vec<LogMessage>>>,
}

impl InMemoryLogCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogCollector for InMemoryLogCollector {
    fn add(&self, message: LogMessage) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.push(message);
    }

    fn messages(&self) -> Vec<LogMessage> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.clone()
    }

    fn len(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// `tracing` layer feeding a [`LogCollector`]
pub struct CollectorLayer<C> {
    collector: C,
    secrets: SecretRegistry,
}

impl<C: LogCollector> CollectorLayer<C> {
    pub fn new(collector: C, secrets: SecretRegistry) -> Self {
        Self { collector, secrets }
    }
}

impl<S, C> Layer<S> for CollectorLayer<C>
where
    S: Subscriber,
    C: LogCollector + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = LogMessage::new(
            level_of(event.metadata().level()),
            self.secrets.mask(&visitor.message),
        );
        let message = visitor
            .fields
            .into_iter()
            .fold(message, |message, (key, value)| {
                message.with_field(key, self.mask_value(value))
            });

        self.collector.add(message);
    }
}

impl<C> CollectorLayer<C> {
    fn mask_value(&self, value: serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::String(s) => serde_json::Value::String(self.secrets.mask(&s)),
            other => other,
        }
    }
}

fn level_of(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warning,
        Level::ERROR => LogLevel::Error,
    }
}

/// Splits an event into its `message` and the remaining structured fields
#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, serde_json::Value>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::from(rendered));
        }
    }
}
