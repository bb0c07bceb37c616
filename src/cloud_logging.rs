use crate::entry::NormalizedEntry;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};

/// Public endpoint of the Cloud Logging API.
pub const DEFAULT_ENDPOINT: &str = "https://logging.googleapis.com";

/// Configuration for [`CloudLoggingSink`].
///
/// Authentication is a bearer token obtained by the application (metadata
/// server, workload identity, `gcloud auth print-access-token`). Token
/// refresh is the caller's concern; rebuild the sink with a new token.
#[derive(Clone, Debug)]
pub struct CloudLoggingConfig {
    /// Base URL without path, e.g. "https://logging.googleapis.com".
    pub endpoint: String,
    pub project_id: String,
    /// Log id, the last segment of the log name.
    pub log_id: String,
    pub access_token: Option<String>,
}

impl CloudLoggingConfig {
    pub fn new(project_id: impl Into<String>, log_id: impl Into<String>) -> Self {
        CloudLoggingConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project_id: project_id.into(),
            log_id: log_id.into(),
            access_token: None,
        }
    }

    /// `projects/<project>/logs/<url-encoded log id>`.
    pub fn log_name(&self) -> String {
        format!(
            "projects/{}/logs/{}",
            self.project_id,
            urlencoding::encode(&self.log_id)
        )
    }
}

/// Cloud Logging implementation of [`LogSink`] using `entries:write`.
#[derive(Clone)]
pub struct CloudLoggingSink {
    client: Client,
    config: CloudLoggingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteRequest<'a> {
    log_name: String,
    entries: Vec<ApiEntry<'a>>,
    partial_success: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiEntry<'a> {
    timestamp: String,
    severity: crate::record::Severity,
    resource: &'a crate::resource::MonitoredResource,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    span_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_request: Option<&'a crate::entry::HttpRequestInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_location: Option<&'a crate::entry::SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_payload: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_payload: Option<Value>,
}

impl CloudLoggingSink {
    /// Construct a new sink instance using the provided configuration.
    ///
    /// **Parameters**
    /// - `config`: [`CloudLoggingConfig`] describing endpoint, project,
    ///   log id and credentials.
    ///
    /// **Returns**
    /// - A ready-to-use [`CloudLoggingSink`] that can be passed into
    ///   [`crate::init::init_tracing`] or a [`crate::transport::BatchingTransport`].
    pub fn new(config: CloudLoggingConfig) -> Self {
        let client = Client::new();
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!("{}/v2/entries:write", self.config.endpoint.trim_end_matches('/'))
    }

    fn map_entry<'a>(&self, entry: &'a NormalizedEntry) -> ApiEntry<'a> {
        // Entries with structured fields go out as jsonPayload carrying the
        // message; plain ones as textPayload.
        let (text_payload, json_payload) = if entry.payload.is_empty() {
            (Some(entry.message.as_str()), None)
        } else {
            let mut object: Map<String, Value> = entry
                .payload
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            object.insert("message".into(), Value::String(entry.message.clone()));
            (None, Some(Value::Object(object)))
        };

        ApiEntry {
            timestamp: entry.timestamp.to_rfc3339(),
            severity: entry.severity,
            resource: &entry.resource,
            labels: (!entry.labels.is_empty()).then_some(&entry.labels),
            trace: entry.trace.as_deref(),
            span_id: entry.span_id.as_deref(),
            http_request: entry.http_request.as_ref(),
            source_location: entry.source_location.as_ref(),
            text_payload,
            json_payload,
        }
    }

    fn write_request<'a>(&self, batch: &'a [NormalizedEntry]) -> WriteRequest<'a> {
        WriteRequest {
            log_name: self.config.log_name(),
            entries: batch.iter().map(|e| self.map_entry(e)).collect(),
            partial_success: true,
        }
    }
}

/// Whether a response status is worth retrying.
pub fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl LogSink for CloudLoggingSink {
    async fn deliver(&self, batch: &[NormalizedEntry]) -> Result<(), SinkError> {
        let body = self.write_request(batch);
        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(SinkError::transient)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
        let err = format!("Cloud Logging write failed with status {}: {}", status, text);
        if is_retryable(status) {
            Err(SinkError::transient(err))
        } else {
            Err(SinkError::permanent(err))
        }
    }
}
