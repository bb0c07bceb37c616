mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::quiet_config;
use serde_json::json;
use tracing::Level;
use tracing_cloud_logging::context::{self, RequestContext};
use tracing_cloud_logging::enrich::TRACE_ID_LABEL;
use tracing_cloud_logging::entry::NormalizedEntry;
use tracing_cloud_logging::init::{build_layer, LayerConfig};
use tracing_cloud_logging::memory_sink::MemorySink;
use tracing_cloud_logging::record::Severity;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

const TRACE: &str = "0af7651916cd43dd8448eb211c80319c";

/// Run `f` under a subscriber made of the layer alone, then flush and
/// return what reached the sink.
fn capture(env: &[(&str, &str)], min_level: Level, f: impl FnOnce()) -> Vec<NormalizedEntry> {
    let env: HashMap<&str, &str> = env.iter().copied().collect();
    let sink = MemorySink::new();
    let config = LayerConfig {
        transport: quiet_config(),
        min_level,
        enable_stdout: false,
        project_id: None,
    };
    let layer = build_layer(Arc::new(sink.clone()), &config, &env).unwrap();
    let transport = layer.transport().clone();

    tracing::subscriber::with_default(Registry::default().with(layer), f);

    transport.shutdown().unwrap();
    sink.entries()
}

// =============================================================================
// Event capture
// =============================================================================

#[test]
fn event_becomes_enriched_entry() {
    let entries = capture(&[], Level::INFO, || {
        tracing::warn!(user_id = 7, ok = true, "disk almost full");
    });

    assert_eq!(entries.len(), 1);
    let e = &entries[0];
    assert_eq!(e.message, "disk almost full");
    assert_eq!(e.severity, Severity::Warning);
    assert_eq!(e.logger, "layer_tests");
    assert_eq!(e.resource.resource_type, "global");
    assert!(e.resource.labels.is_empty());
    assert_eq!(e.payload.get("user_id"), Some(&json!(7)));
    assert_eq!(e.payload.get("ok"), Some(&json!(true)));
    assert_eq!(e.trace, None);

    let location = e.source_location.as_ref().unwrap();
    assert!(location.file.ends_with("layer_tests.rs"));
    assert!(location.line > 0);
    assert_eq!(location.function, "layer_tests");
}

#[test]
fn events_below_min_level_are_ignored() {
    let entries = capture(&[], Level::INFO, || {
        tracing::debug!("too chatty");
        tracing::trace!("even more");
        tracing::info!("kept");
    });
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "kept");
}

#[test]
fn own_diagnostics_are_not_captured() {
    let entries = capture(&[], Level::TRACE, || {
        tracing::warn!(target: "tracing_cloud_logging::transport", "internal");
        tracing::info!(target: "tracing_cloud_logging_ext", "someone else");
    });
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].logger, "tracing_cloud_logging_ext");
}

#[test]
fn layer_counts_events() {
    let env: HashMap<&str, &str> = HashMap::new();
    let config = LayerConfig {
        transport: quiet_config(),
        enable_stdout: false,
        ..Default::default()
    };
    let layer = build_layer(Arc::new(MemorySink::new()), &config, &env).unwrap();
    let total = Arc::clone(&layer.total_events);
    let enqueued = Arc::clone(&layer.enqueued_events);
    let transport = layer.transport().clone();

    tracing::subscriber::with_default(Registry::default().with(layer), || {
        tracing::info!("one");
        tracing::debug!("filtered");
        tracing::error!("two");
    });
    transport.shutdown().unwrap();

    assert_eq!(total.load(Ordering::Relaxed), 3);
    assert_eq!(enqueued.load(Ordering::Relaxed), 2);
}

// =============================================================================
// Labels and attributes
// =============================================================================

#[test]
fn dotted_fields_become_labels() {
    let entries = capture(&[("GOOGLE_CLOUD_PROJECT", "proj")], Level::INFO, || {
        tracing::info!(labels.tenant = "acme", labels.shard = 3, "labelled");
    });
    let e = &entries[0];
    assert_eq!(e.labels.get("tenant").map(String::as_str), Some("acme"));
    assert_eq!(e.labels.get("shard").map(String::as_str), Some("3"));
    assert_eq!(e.labels.get("project_id").map(String::as_str), Some("proj"));
    assert!(!e.payload.contains_key("labels"));
}

#[test]
fn http_request_field_accepts_json_text() {
    let entries = capture(&[], Level::INFO, || {
        tracing::info!(
            http_request = r#"{"requestMethod":"GET","status":200}"#,
            "served"
        );
    });
    let http = entries[0].http_request.as_ref().unwrap();
    assert_eq!(http.request_method.as_deref(), Some("GET"));
    assert_eq!(http.status, Some(200));
    assert!(!entries[0].payload.contains_key("http_request"));
}

// =============================================================================
// Request context
// =============================================================================

#[test]
fn request_scope_supplies_trace_and_span() {
    let gae = [
        ("GOOGLE_CLOUD_PROJECT", "proj"),
        ("GAE_SERVICE", "default"),
        ("GAE_VERSION", "v1"),
    ];
    let entries = capture(&gae, Level::INFO, || {
        let ctx = RequestContext::new()
            .with_trace(TRACE)
            .with_span("b7ad6b7169203331");
        context::sync_scope(ctx, || tracing::info!("inside request"));
        tracing::info!("after request");
    });

    assert_eq!(entries.len(), 2);
    let inside = &entries[0];
    assert_eq!(inside.resource.resource_type, "gae_app");
    assert_eq!(
        inside.trace.as_deref(),
        Some(format!("projects/proj/traces/{TRACE}").as_str())
    );
    assert_eq!(inside.span_id.as_deref(), Some("b7ad6b7169203331"));
    assert_eq!(
        inside.labels.get(TRACE_ID_LABEL).map(String::as_str),
        Some(TRACE)
    );

    let after = &entries[1];
    assert_eq!(after.trace, None);
    assert_eq!(after.span_id, None);
    assert!(!after.labels.contains_key(TRACE_ID_LABEL));
}

#[test]
fn explicit_trace_field_overrides_context() {
    let entries = capture(&[], Level::INFO, || {
        let ctx = RequestContext::new().with_trace(TRACE);
        context::sync_scope(ctx, || {
            tracing::info!(trace = "explicit", span_id = "0000000000000001", "override");
        });
    });
    assert_eq!(entries[0].trace.as_deref(), Some("explicit"));
    assert_eq!(entries[0].span_id.as_deref(), Some("0000000000000001"));
}

#[tokio::test]
async fn async_scope_reaches_events_after_await() {
    let env: HashMap<&str, &str> = HashMap::new();
    let sink = MemorySink::new();
    let config = LayerConfig {
        transport: quiet_config(),
        enable_stdout: false,
        project_id: Some("proj".into()),
        ..Default::default()
    };
    let layer = build_layer(Arc::new(sink.clone()), &config, &env).unwrap();
    let transport = layer.transport().clone();
    let _guard = tracing::subscriber::set_default(Registry::default().with(layer));

    let ctx = RequestContext::from_headers([(
        "traceparent",
        "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
    )]);
    context::scope(ctx, async {
        tokio::task::yield_now().await;
        tracing::info!("handled");
    })
    .await;
    transport.flush_async().await.unwrap();

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].trace.as_deref(),
        Some(format!("projects/proj/traces/{TRACE}").as_str())
    );
}
