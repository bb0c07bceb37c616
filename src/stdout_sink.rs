use crate::entry::NormalizedEntry;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Writes one JSON object per entry, using the special keys the platform
/// log agents on Cloud Run, Cloud Functions and GKE understand.
///
/// This is the usual choice on serverless platforms, where stdout is
/// already collected and the API sink would only duplicate entries.
#[derive(Clone)]
pub struct StdoutSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    /// Write to something other than stdout, e.g. a buffer in tests.
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        StdoutSink {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }
}

/// Structured-logging representation of `entry`.
pub fn structured_line(entry: &NormalizedEntry) -> Value {
    let mut line = Map::new();
    line.insert("severity".into(), json!(entry.severity));
    line.insert("message".into(), json!(entry.message));
    line.insert("time".into(), json!(entry.timestamp.to_rfc3339()));
    line.insert("logger".into(), json!(entry.logger));
    if !entry.labels.is_empty() {
        line.insert("logging.googleapis.com/labels".into(), json!(entry.labels));
    }
    if let Some(trace) = &entry.trace {
        line.insert("logging.googleapis.com/trace".into(), json!(trace));
    }
    if let Some(span_id) = &entry.span_id {
        line.insert("logging.googleapis.com/spanId".into(), json!(span_id));
    }
    if let Some(http_request) = &entry.http_request {
        line.insert("httpRequest".into(), json!(http_request));
    }
    if let Some(location) = &entry.source_location {
        line.insert("logging.googleapis.com/sourceLocation".into(), json!(location));
    }
    // Payload fields never shadow the keys above.
    for (key, value) in &entry.payload {
        line.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Value::Object(line)
}

#[async_trait]
impl LogSink for StdoutSink {
    async fn deliver(&self, batch: &[NormalizedEntry]) -> Result<(), SinkError> {
        let mut buf = Vec::new();
        for entry in batch {
            serde_json::to_writer(&mut buf, &structured_line(entry)).map_err(SinkError::permanent)?;
            buf.push(b'\n');
        }

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SinkError::permanent("stdout writer poisoned"))?;
        writer.write_all(&buf).map_err(SinkError::transient)?;
        writer.flush().map_err(SinkError::transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::SourceLocation;
    use crate::record::Severity;
    use crate::resource::MonitoredResource;
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn entry(message: &str) -> NormalizedEntry {
        NormalizedEntry {
            timestamp: Utc::now(),
            severity: Severity::Error,
            logger: "app".into(),
            message: message.into(),
            resource: MonitoredResource::global(),
            labels: [("team".to_string(), "core".to_string())].into_iter().collect(),
            trace: Some("projects/p/traces/abc".into()),
            span_id: Some("00000000000000ff".into()),
            http_request: None,
            source_location: Some(SourceLocation {
                file: "src/main.rs".into(),
                line: 7,
                function: "app::main".into(),
            }),
            payload: [("severity".to_string(), json!("shadow")), ("user".to_string(), json!(1))]
                .into_iter()
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn structured_keys() {
        let line = structured_line(&entry("boom"));
        assert_eq!(line["severity"], "ERROR");
        assert_eq!(line["message"], "boom");
        assert_eq!(line["logging.googleapis.com/labels"]["team"], "core");
        assert_eq!(line["logging.googleapis.com/trace"], "projects/p/traces/abc");
        assert_eq!(line["logging.googleapis.com/spanId"], "00000000000000ff");
        assert_eq!(line["logging.googleapis.com/sourceLocation"]["line"], "7");
        assert_eq!(line["user"], 1);
        assert!(line.get("httpRequest").is_none());
    }

    #[tokio::test]
    async fn writes_one_line_per_entry() {
        let buf = SharedBuf::default();
        let sink = StdoutSink::with_writer(buf.clone());
        sink.deliver(&[entry("a"), entry("b")]).await.unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["message"], "b");
    }
}
