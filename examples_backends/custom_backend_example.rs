use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use tracing_cloud_logging::{
    entry::NormalizedEntry,
    init::init_tracing,
    sink::{LogSink, SinkError},
};

/// Example of integrating a completely custom backend by implementing
/// the `LogSink` trait directly. Imagine this talks to some
/// proprietary log store for which this crate does not provide a
/// built-in sink.
struct MyCustomStoreSink;

#[async_trait]
impl LogSink for MyCustomStoreSink {
    async fn deliver(&self, batch: &[NormalizedEntry]) -> Result<(), SinkError> {
        // Here you would call your own client library for the target store
        // and map its errors to `SinkError::transient` or
        // `SinkError::permanent`. For the sake of example we just print.
        for entry in batch {
            let line = serde_json::to_string(entry).map_err(SinkError::permanent)?;
            println!("[my-custom-store] {line}");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink: Arc<dyn LogSink> = Arc::new(MyCustomStoreSink);

    let guard = init_tracing(sink)?;

    info!("custom backend example started");
    error!(labels.store = "my-custom-store", "simulated error sent via custom backend");

    guard.shutdown()?;
    Ok(())
}
