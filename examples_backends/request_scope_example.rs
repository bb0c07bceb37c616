use std::sync::Arc;

use tracing::{info, warn};
use tracing_cloud_logging::context::{self, RequestContext};
use tracing_cloud_logging::init::{init_tracing_with_config, LayerConfig};
use tracing_cloud_logging::stdout_sink::StdoutSink;

/// Stand-in for a web framework's request handler.
async fn handle(path: &str) {
    info!(path, "handling request");
    tokio::task::yield_now().await;
    warn!(path, labels.cache = "miss", "slow upstream");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured JSON lines on stdout, the way serverless platforms ingest logs.
    let config = LayerConfig {
        enable_stdout: false,
        ..Default::default()
    };
    let guard = init_tracing_with_config(Arc::new(StdoutSink::new()), config)?;

    let inbound = [
        ("traceparent", "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"),
        ("user-agent", "curl/8.0"),
    ];
    let ctx = RequestContext::from_headers(inbound);
    context::scope(ctx, handle("/orders")).await;

    // Outside a request scope entries carry no trace.
    info!("request finished");

    guard.shutdown()?;
    Ok(())
}
