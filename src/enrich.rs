//! Turning a [`LogRecord`] into a [`NormalizedEntry`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::context::{self, RequestContext};
use crate::entry::{HttpRequestInfo, NormalizedEntry, SourceLocation};
use crate::env::EnvSource;
use crate::record::{
    LogRecord, HTTP_REQUEST_KEY, LABELS_KEY, RESERVED_KEYS, RESOURCE_KEY, SPAN_ID_KEY, TRACE_KEY,
};
use crate::resource::{self, MonitoredResource, ResourceResolver, GAE_APP};

/// Label carrying the raw trace id on App Engine, where the log viewer
/// groups request logs by it.
pub const TRACE_ID_LABEL: &str = "appengine.googleapis.com/trace_id";

/// Enriches records with the process's monitored resource and the ambient
/// request context.
///
/// The resource is resolved once at construction. `enrich` only reads
/// immutable state, so one enricher can be shared across threads.
#[derive(Debug, Clone)]
pub struct Enricher {
    resource: MonitoredResource,
    project_id: Option<String>,
}

impl Enricher {
    pub fn new(resource: MonitoredResource, project_id: Option<String>) -> Self {
        Enricher {
            resource,
            project_id: project_id.filter(|p| !p.is_empty()),
        }
    }

    /// Resolve resource and project from `env`.
    pub fn from_env(env: &dyn EnvSource) -> Self {
        Self::new(ResourceResolver::resolve(env), resource::project_id(env))
    }

    pub fn resource(&self) -> &MonitoredResource {
        &self.resource
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Enrich `record`, consulting the ambient request context exactly once.
    pub fn enrich(&self, record: &LogRecord) -> NormalizedEntry {
        let ctx = context::current();
        enrich_with_context(record, &self.resource, self.project_id.as_deref(), ctx.as_ref())
    }
}

/// Build a [`NormalizedEntry`] from its inputs.
///
/// Explicit attributes on the record win over `ctx`. Attribute values of
/// the wrong shape are treated as absent.
pub fn enrich_with_context(
    record: &LogRecord,
    resource: &MonitoredResource,
    project_id: Option<&str>,
    ctx: Option<&RequestContext>,
) -> NormalizedEntry {
    let attrs = &record.attributes;

    let resource = attrs
        .get(RESOURCE_KEY)
        .and_then(structured::<MonitoredResource>)
        .filter(|r| !r.resource_type.is_empty())
        .unwrap_or_else(|| resource.clone());

    let raw_trace = attrs
        .get(TRACE_KEY)
        .and_then(non_empty_str)
        .or_else(|| ctx.and_then(|c| c.trace_id.clone()));
    let span_id = attrs
        .get(SPAN_ID_KEY)
        .and_then(non_empty_str)
        .or_else(|| ctx.and_then(|c| c.span_id.clone()));
    let http_request = attrs
        .get(HTTP_REQUEST_KEY)
        .and_then(structured::<HttpRequestInfo>)
        .or_else(|| ctx.and_then(|c| c.http_request.clone()));

    let mut trace_labels = BTreeMap::new();
    if resource.resource_type == GAE_APP {
        if let Some(trace) = &raw_trace {
            trace_labels.insert(TRACE_ID_LABEL.to_string(), bare_trace_id(trace).to_string());
        }
    }
    let user_labels = attrs.get(LABELS_KEY).map(label_map).unwrap_or_default();
    let labels = merge_labels(&resource.labels, &trace_labels, &user_labels);

    let payload = attrs
        .iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    NormalizedEntry {
        timestamp: record.timestamp,
        severity: record.severity,
        logger: record.logger.clone(),
        message: record.message.clone().unwrap_or_default(),
        resource,
        labels,
        trace: raw_trace.map(|t| qualify_trace(&t, project_id)),
        span_id,
        http_request,
        source_location: source_location(record),
        payload,
    }
}

/// Merge label sources; later sources win on key collision.
pub fn merge_labels(
    resource: &BTreeMap<String, String>,
    trace: &BTreeMap<String, String>,
    user: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = resource.clone();
    for source in [trace, user] {
        merged.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// `projects/<project>/traces/<id>` when the project is known and the id
/// is not already qualified.
pub fn qualify_trace(trace: &str, project_id: Option<&str>) -> String {
    match project_id {
        Some(project) if !trace.starts_with("projects/") => {
            format!("projects/{project}/traces/{trace}")
        }
        _ => trace.to_string(),
    }
}

fn bare_trace_id(trace: &str) -> &str {
    match trace.strip_prefix("projects/") {
        Some(rest) => rest.rsplit('/').next().unwrap_or(rest),
        None => trace,
    }
}

fn source_location(record: &LogRecord) -> Option<SourceLocation> {
    match (&record.file, record.line, &record.function) {
        (Some(file), Some(line), Some(function)) if !file.is_empty() && !function.is_empty() => {
            Some(SourceLocation {
                file: file.clone(),
                line,
                function: function.clone(),
            })
        }
        _ => None,
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Structured attributes arrive either as JSON values or, from `tracing`
/// fields, as JSON text.
fn structured<T: DeserializeOwned>(value: &Value) -> Option<T> {
    match value {
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        Value::String(s) => serde_json::from_str(s).ok(),
        _ => None,
    }
}

fn label_map(value: &Value) -> BTreeMap<String, String> {
    let object = match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => serde_json::from_str::<serde_json::Map<String, Value>>(s).ok(),
        _ => None,
    };
    object
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            Value::Null => None,
            other => Some((k, other.to_string())),
        })
        .collect()
}
