use crate::enrich::Enricher;
use crate::record::{LogRecord, LABELS_KEY};
use crate::transport::{self, BatchingTransport};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Target prefix of this crate's own diagnostics.
const SELF_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Prefix for event fields that become individual labels, e.g.
/// `info!(labels.tenant = "acme", "...")`.
const LABEL_FIELD_PREFIX: &str = "labels.";

/// `tracing_subscriber` layer that enriches events and forwards them to a
/// [`BatchingTransport`].
///
/// Events more verbose than `min_level` are ignored. Enrichment runs on the
/// calling thread so it sees the caller's request context; delivery is
/// left entirely to the transport worker.
pub struct CloudLoggingLayer {
    transport: BatchingTransport,
    enricher: Arc<Enricher>,
    min_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Successfully enqueued into the transport.
    pub enqueued_events: Arc<AtomicU64>,
    /// Refused by the transport (queue full or shut down).
    pub dropped_events: Arc<AtomicU64>,
}

impl CloudLoggingLayer {
    pub fn new(transport: BatchingTransport, enricher: Enricher, min_level: Level) -> Self {
        Self {
            transport,
            enricher: Arc::new(enricher),
            min_level,
            total_events: Arc::new(AtomicU64::new(0)),
            enqueued_events: Arc::new(AtomicU64::new(0)),
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn transport(&self) -> &BatchingTransport {
        &self.transport
    }

    pub fn enricher(&self) -> &Enricher {
        &self.enricher
    }
}

fn is_self_event(target: &str) -> bool {
    target
        .strip_prefix(SELF_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

impl<S> Layer<S> for CloudLoggingLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if *meta.level() > self.min_level {
            return;
        }
        if is_self_event(meta.target()) || transport::on_worker_thread() {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut labels = Map::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            labels: &mut labels,
            message: &mut message,
        };
        event.record(&mut visitor);
        fold_labels(&mut fields, labels);

        let record = LogRecord {
            timestamp: Utc::now(),
            severity: meta.level().into(),
            logger: meta.target().to_string(),
            message,
            file: meta.file().map(|s| s.to_string()),
            line: meta.line(),
            function: meta.module_path().map(|s| s.to_string()),
            attributes: fields,
        };

        let entry = self.enricher.enrich(&record);
        if self.transport.send(entry) {
            self.enqueued_events.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Merge `labels.<key>` fields into the `labels` attribute, which may
/// already hold a JSON object or JSON text.
fn fold_labels(fields: &mut BTreeMap<String, Value>, dotted: Map<String, Value>) {
    if dotted.is_empty() {
        return;
    }
    let mut merged = match fields.remove(LABELS_KEY) {
        Some(Value::Object(map)) => map,
        Some(Value::String(text)) => serde_json::from_str(&text).unwrap_or_default(),
        _ => Map::new(),
    };
    merged.extend(dotted);
    fields.insert(LABELS_KEY.to_string(), Value::Object(merged));
}

use tracing::field::{Field, Visit};

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, Value>,
    pub labels: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: Value) {
        match field.name().strip_prefix(LABEL_FIELD_PREFIX) {
            Some(label) if !label.is_empty() => {
                self.labels.insert(label.to_string(), value);
            }
            _ => {
                self.fields.insert(field.name().to_string(), value);
            }
        }
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn self_events_are_recognized() {
        assert!(is_self_event("tracing_cloud_logging"));
        assert!(is_self_event("tracing_cloud_logging::transport"));
        assert!(!is_self_event("tracing_cloud_logging_ext"));
        assert!(!is_self_event("app::handlers"));
    }

    #[test]
    fn dotted_labels_merge_into_existing_labels() {
        let mut fields = BTreeMap::new();
        fields.insert(LABELS_KEY.to_string(), json!(r#"{"a":"1","b":"1"}"#));
        let mut dotted = Map::new();
        dotted.insert("b".into(), json!("2"));
        fold_labels(&mut fields, dotted);
        assert_eq!(fields[LABELS_KEY], json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn no_dotted_labels_leaves_fields_alone() {
        let mut fields = BTreeMap::new();
        fields.insert(LABELS_KEY.to_string(), json!("not json"));
        fold_labels(&mut fields, Map::new());
        assert_eq!(fields[LABELS_KEY], json!("not json"));
    }
}
