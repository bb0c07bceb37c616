use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::record::Severity;
use crate::resource::MonitoredResource;

/// HTTP request descriptor attached to an entry.
///
/// Serialized with the ingestion API's camelCase names; deserialization
/// also accepts snake_case so attribute bags can use either.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestInfo {
    #[serde(default, alias = "request_method", skip_serializing_if = "Option::is_none")]
    pub request_method: Option<String>,
    #[serde(default, alias = "request_url", skip_serializing_if = "Option::is_none")]
    pub request_url: Option<String>,
    #[serde(default, alias = "request_size", skip_serializing_if = "Option::is_none")]
    pub request_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, alias = "response_size", skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    #[serde(default, alias = "user_agent", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, alias = "remote_ip", skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    #[serde(default, alias = "server_ip", skip_serializing_if = "Option::is_none")]
    pub server_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Duration string such as `"0.125s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl HttpRequestInfo {
    pub fn is_empty(&self) -> bool {
        *self == HttpRequestInfo::default()
    }
}

/// Where in the program the entry was emitted. Only ever built with all
/// three parts known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: String,
    #[serde(serialize_with = "line_as_string")]
    pub line: u32,
    pub function: String,
}

// The ingestion API encodes the line as an int64 string.
fn line_as_string<S: Serializer>(line: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(line)
}

/// Enriched, transport-ready log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub logger: String,
    pub message: String,
    pub resource: MonitoredResource,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpRequestInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    /// Attributes without a reserved meaning, shipped as structured payload.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, serde_json::Value>,
}
