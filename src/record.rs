use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::Level;

/// Attribute keys with a meaning to the enricher. Everything else in the
/// attribute bag is passed through as structured payload.
pub const LABELS_KEY: &str = "labels";
pub const TRACE_KEY: &str = "trace";
pub const SPAN_ID_KEY: &str = "span_id";
pub const HTTP_REQUEST_KEY: &str = "http_request";
pub const RESOURCE_KEY: &str = "resource";

/// Keys the enricher consumes from [`LogRecord::attributes`].
pub const RESERVED_KEYS: [&str; 5] = [
    LABELS_KEY,
    TRACE_KEY,
    SPAN_ID_KEY,
    HTTP_REQUEST_KEY,
    RESOURCE_KEY,
];

/// Log severity as understood by the ingestion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl From<&Level> for Severity {
    fn from(level: &Level) -> Self {
        match *level {
            Level::TRACE | Level::DEBUG => Severity::Debug,
            Level::INFO => Severity::Info,
            Level::WARN => Severity::Warning,
            Level::ERROR => Severity::Error,
        }
    }
}

/// A captured log event, immutable once handed to the enricher.
///
/// `attributes` is the side channel upstream code uses to attach
/// `labels`, `trace`, `span_id`, `http_request` and `resource` overrides
/// (see the `*_KEY` constants) alongside arbitrary structured fields.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Logger name; the event target for `tracing` events.
    pub logger: String,
    pub message: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    /// A record stamped with the current time and no location or attributes.
    pub fn new(severity: Severity, logger: impl Into<String>, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            severity,
            logger: logger.into(),
            message: Some(message.into()),
            file: None,
            line: None,
            function: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_location(
        mut self,
        file: impl Into<String>,
        line: u32,
        function: impl Into<String>,
    ) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.function = Some(function.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_maps_to_severity() {
        assert_eq!(Severity::from(&Level::TRACE), Severity::Debug);
        assert_eq!(Severity::from(&Level::WARN), Severity::Warning);
        assert_eq!(Severity::from(&Level::ERROR), Severity::Error);
    }

    #[test]
    fn severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }
}
