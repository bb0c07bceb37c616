use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_cloud_logging::init::init_tracing;
use tracing_cloud_logging::noop_sink::NoopSink;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(NoopSink);
    let guard = init_tracing(sink)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let stats = guard.transport().stats();
    println!(
        "enqueued {}, dropped on overflow {}",
        stats.enqueued, stats.dropped_overflow
    );

    // Drain what is still queued before exiting.
    guard.shutdown()?;
    Ok(())
}
