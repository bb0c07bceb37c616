use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;

use tracing_cloud_logging::init::{init_tracing_with_config, LayerConfig};
use tracing_cloud_logging::noop_sink::NoopSink;
use tracing_cloud_logging::transport::TransportConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(NoopSink);

    let layer_config = LayerConfig {
        transport: TransportConfig {
            max_queue_size: 50_000,
            batch_size: 1_000,
            high_watermark: 25_000,
            flush_interval: Duration::from_millis(200),
            ..Default::default()
        },
        enable_stdout: false,
        ..Default::default()
    };

    let guard = init_tracing_with_config(sink, layer_config)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    guard.flush()?;
    let stats = guard.transport().stats();
    println!(
        "delivered {} entries in {} batches, dropped {}",
        stats.delivered_entries,
        stats.delivered_batches,
        stats.dropped_overflow + stats.dropped_entries
    );

    guard.shutdown()?;
    Ok(())
}
