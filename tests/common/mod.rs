#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing_cloud_logging::enrich::Enricher;
use tracing_cloud_logging::entry::NormalizedEntry;
use tracing_cloud_logging::memory_sink::MemorySink;
use tracing_cloud_logging::record::{LogRecord, Severity};
use tracing_cloud_logging::resource::MonitoredResource;
use tracing_cloud_logging::sink::{LogSink, SinkError};
use tracing_cloud_logging::transport::TransportConfig;

pub fn entry(message: &str) -> NormalizedEntry {
    let record = LogRecord::new(Severity::Info, "tests", message);
    Enricher::new(MonitoredResource::global(), None).enrich(&record)
}

/// Entry tagged with its producer and per-producer sequence number.
pub fn sequenced(producer: u64, seq: u64) -> NormalizedEntry {
    let record = LogRecord::new(Severity::Info, "tests", format!("{producer}-{seq}"))
        .with_attribute("producer", producer)
        .with_attribute("seq", seq);
    Enricher::new(MonitoredResource::global(), None).enrich(&record)
}

/// Config where only explicit flushes, full batches and shutdown deliver.
pub fn quiet_config() -> TransportConfig {
    TransportConfig {
        flush_interval: Duration::from_secs(60),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        flush_timeout: Duration::from_secs(10),
        shutdown_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Poll `cond` until it holds or `limit` passes.
pub fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Fails every attempt, transiently or permanently.
#[derive(Clone, Default)]
pub struct FailingSink {
    pub attempts: Arc<AtomicUsize>,
    pub permanent: bool,
}

impl FailingSink {
    pub fn transient() -> Self {
        Self::default()
    }

    pub fn permanent() -> Self {
        Self {
            permanent: true,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSink for FailingSink {
    async fn deliver(&self, _batch: &[NormalizedEntry]) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.permanent {
            Err(SinkError::permanent("rejected"))
        } else {
            Err(SinkError::transient("unavailable"))
        }
    }
}

/// Fails the first `failures` attempts transiently, then records batches.
#[derive(Clone)]
pub struct FlakySink {
    pub failures: usize,
    pub attempts: Arc<AtomicUsize>,
    pub inner: MemorySink,
}

impl FlakySink {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: Arc::new(AtomicUsize::new(0)),
            inner: MemorySink::new(),
        }
    }
}

#[async_trait]
impl LogSink for FlakySink {
    async fn deliver(&self, batch: &[NormalizedEntry]) -> Result<(), SinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(SinkError::transient("flaky"));
        }
        self.inner.deliver(batch).await
    }
}

/// Holds every delivery until the gate is opened, then records batches.
#[derive(Clone)]
pub struct GatedSink {
    pub gate: Arc<Semaphore>,
    pub inner: MemorySink,
}

impl GatedSink {
    pub fn closed() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            inner: MemorySink::new(),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl LogSink for GatedSink {
    async fn deliver(&self, batch: &[NormalizedEntry]) -> Result<(), SinkError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| SinkError::permanent(e.to_string()))?;
        self.inner.deliver(batch).await
    }
}

/// Never completes a delivery.
#[derive(Clone, Default)]
pub struct HangingSink {
    pub attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl LogSink for HangingSink {
    async fn deliver(&self, _batch: &[NormalizedEntry]) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(())
    }
}
