//! Background batching transport between logging call sites and a
//! [`LogSink`].
//!
//! Callers hand entries to [`BatchingTransport::send`], which only performs
//! a non-blocking enqueue. A single worker thread, running its own
//! current-thread tokio runtime, drains the queue and delivers batches:
//!
//! - when a batch reaches `batch_size`,
//! - every `flush_interval`,
//! - as soon as buffered entries (open batch plus queue) reach
//!   `high_watermark`,
//! - on [`BatchingTransport::flush`] and during shutdown.
//!
//! Delivery is best effort. Transient sink failures are retried with
//! exponential backoff; a batch that still fails is dropped and counted.
//! Nothing in this module ever reports an error back into a logging call.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::entry::NormalizedEntry;
use crate::env::{self, ConfigError, EnvSource};
use crate::sink::{LogSink, SinkError};

/// How long `shutdown` waits for a cancelled worker to account for what it
/// dropped before detaching it.
const ABANDON_GRACE: Duration = Duration::from_millis(200);

const WORKER_THREAD_NAME: &str = "log-transport";

thread_local! {
    static ON_WORKER_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// True on a transport worker thread. Events emitted there (by sinks or
/// their HTTP clients) must not be fed back into a transport.
pub fn on_worker_thread() -> bool {
    ON_WORKER_THREAD.with(Cell::get)
}

/// Tuning knobs for [`BatchingTransport`].
///
/// **Fields**
/// - `max_queue_size`: capacity of the intake queue. Entries sent while it
///   is full are dropped and counted, which bounds memory during a sink
///   outage.
/// - `batch_size`: maximum entries per delivery.
/// - `flush_interval`: maximum time a partial batch waits for delivery.
/// - `high_watermark`: buffered entry count at which the worker drains
///   immediately instead of waiting for a full batch or the next tick.
/// - `max_retries`: retries per batch after the first failed attempt.
/// - `initial_backoff` / `max_backoff`: retry delay, doubling per retry.
/// - `delivery_timeout`: bound on a single `deliver` call.
/// - `flush_timeout`: bound on a blocking [`BatchingTransport::flush`].
/// - `shutdown_timeout`: bound on the final drain during shutdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    pub max_queue_size: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub high_watermark: usize,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub delivery_timeout: Duration,
    pub flush_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            high_watermark: 1024,
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            delivery_timeout: Duration::from_secs(10),
            flush_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    /// Defaults overridden by any `LOG_SINK_*` tuning variables in `env`.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = env::parse_var(env, env::LOG_SINK_QUEUE_SIZE_ENV)? {
            config.max_queue_size = v;
        }
        if let Some(v) = env::parse_var(env, env::LOG_SINK_BATCH_SIZE_ENV)? {
            config.batch_size = v;
        }
        if let Some(ms) = env::parse_var(env, env::LOG_SINK_FLUSH_INTERVAL_MS_ENV)? {
            config.flush_interval = Duration::from_millis(ms);
        }
        if let Some(v) = env::parse_var(env, env::LOG_SINK_HIGH_WATERMARK_ENV)? {
            config.high_watermark = v;
        }
        if let Some(v) = env::parse_var(env, env::LOG_SINK_MAX_RETRIES_ENV)? {
            config.max_retries = v;
        }
        if let Some(ms) = env::parse_var(env, env::LOG_SINK_SHUTDOWN_TIMEOUT_MS_ENV)? {
            config.shutdown_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Enforce minimal thresholds to avoid degenerate configs.
    fn normalized(mut self) -> Self {
        self.max_queue_size = self.max_queue_size.max(16);
        self.batch_size = self.batch_size.clamp(1, self.max_queue_size);
        self.high_watermark = self.high_watermark.clamp(1, self.max_queue_size);
        self.flush_interval = self.flush_interval.max(Duration::from_millis(10));
        self.max_backoff = self.max_backoff.max(self.initial_backoff);
        self
    }
}

/// Lifecycle of a [`BatchingTransport`].
///
/// `Idle` only exists while [`BatchingTransport::new`] waits for the worker
/// to come up; a constructed handle starts in `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

impl TransportState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TransportState::Idle,
            1 => TransportState::Running,
            2 => TransportState::ShuttingDown,
            _ => TransportState::Stopped,
        }
    }
}

/// Errors from the transport's lifecycle operations. `send` never fails.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("failed to start log transport worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("log transport is already shut down")]
    AlreadyShutdown,

    #[error("log transport did not finish within {0:?}")]
    Timeout(Duration),

    #[error("log transport worker exited unexpectedly")]
    WorkerGone,
}

/// An entry waiting in the intake queue.
#[derive(Debug)]
pub struct QueuedEntry {
    pub entry: NormalizedEntry,
    pub enqueued_at: Instant,
}

/// Point-in-time copy of the transport's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Entries accepted into the queue.
    pub enqueued: u64,
    pub delivered_entries: u64,
    pub delivered_batches: u64,
    /// Entries refused because the queue was full.
    pub dropped_overflow: u64,
    /// Entries refused because the transport was shutting down or stopped.
    pub rejected: u64,
    /// Batches given up on after retries, permanent rejection or shutdown.
    pub dropped_batches: u64,
    /// Entries lost with dropped batches or abandoned at shutdown.
    pub dropped_entries: u64,
    /// Delivery attempts repeated after a transient failure.
    pub retries: u64,
    /// Entries currently waiting in the queue.
    pub queue_depth: usize,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered_entries: AtomicU64,
    delivered_batches: AtomicU64,
    dropped_overflow: AtomicU64,
    rejected: AtomicU64,
    dropped_batches: AtomicU64,
    dropped_entries: AtomicU64,
    retries: AtomicU64,
}

enum FlushAck {
    Blocking(std_mpsc::SyncSender<()>),
    Async(oneshot::Sender<()>),
}

impl FlushAck {
    fn complete(self) {
        match self {
            FlushAck::Blocking(tx) => {
                let _ = tx.try_send(());
            }
            FlushAck::Async(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

enum Control {
    Flush(FlushAck),
}

struct WorkerHandle {
    thread: thread::JoinHandle<()>,
    done: std_mpsc::Receiver<()>,
}

/// Handle to the batching transport. Clones share the same queue and
/// worker.
#[derive(Clone)]
pub struct BatchingTransport {
    inner: Arc<Inner>,
}

struct Inner {
    // `None` once shutdown has closed the intake.
    sender: RwLock<Option<mpsc::Sender<QueuedEntry>>>,
    control: mpsc::UnboundedSender<Control>,
    depth: Arc<AtomicUsize>,
    counters: Arc<Counters>,
    state: AtomicU8,
    cancel: CancellationToken,
    worker: Mutex<Option<WorkerHandle>>,
    warned_closed: AtomicBool,
    config: TransportConfig,
}

impl BatchingTransport {
    /// Start a transport delivering to `sink`.
    ///
    /// Spawns the dedicated worker thread and its runtime; works from
    /// synchronous code and from inside any tokio runtime.
    pub fn new(sink: Arc<dyn LogSink>, config: TransportConfig) -> Result<Self, TransportError> {
        let config = config.normalized();

        let (tx, rx) = mpsc::channel::<QueuedEntry>(config.max_queue_size);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let counters = Arc::new(Counters::default());
        let cancel = CancellationToken::new();

        let inner = Inner {
            sender: RwLock::new(Some(tx)),
            control: control_tx,
            depth: Arc::clone(&depth),
            counters: Arc::clone(&counters),
            state: AtomicU8::new(TransportState::Idle as u8),
            cancel: cancel.clone(),
            worker: Mutex::new(None),
            warned_closed: AtomicBool::new(false),
            config: config.clone(),
        };

        let worker = Worker {
            batch: Vec::with_capacity(config.batch_size),
            sink,
            config,
            entries: rx,
            control: control_rx,
            depth,
            counters,
            cancel,
        };

        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (done_tx, done_rx) = std_mpsc::sync_channel(1);
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                ON_WORKER_THREAD.with(|flag| flag.set(true));
                let _ = ready_tx.send(Ok(()));
                runtime.block_on(worker.run());
                let _ = done_tx.send(());
            })
            .map_err(TransportError::Spawn)?;

        ready_rx
            .recv()
            .map_err(|_| TransportError::WorkerGone)?
            .map_err(TransportError::Spawn)?;

        *inner.worker.lock().unwrap_or_else(|p| p.into_inner()) = Some(WorkerHandle {
            thread,
            done: done_rx,
        });
        inner.set_state(TransportState::Running);

        Ok(BatchingTransport {
            inner: Arc::new(inner),
        })
    }

    /// Enqueue `entry` without blocking.
    ///
    /// Returns `false` if the entry was dropped because the queue is full or
    /// the transport is shutting down; the drop is counted either way.
    pub fn send(&self, entry: NormalizedEntry) -> bool {
        self.inner.send(entry)
    }

    /// Block until every entry enqueued before this call has been handed
    /// to the sink, or `flush_timeout` elapses.
    ///
    /// Must not be called from the sink itself.
    pub fn flush(&self) -> Result<(), TransportError> {
        let (tx, rx) = std_mpsc::sync_channel(1);
        self.inner.request_flush(FlushAck::Blocking(tx))?;
        match rx.recv_timeout(self.inner.config.flush_timeout) {
            Ok(()) => Ok(()),
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                Err(TransportError::Timeout(self.inner.config.flush_timeout))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(TransportError::WorkerGone),
        }
    }

    /// Async variant of [`flush`](Self::flush) for use inside a runtime.
    pub async fn flush_async(&self) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        self.inner.request_flush(FlushAck::Async(tx))?;
        let limit = self.inner.config.flush_timeout;
        match timeout(limit, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportError::WorkerGone),
            Err(_) => Err(TransportError::Timeout(limit)),
        }
    }

    /// Stop accepting entries, drain what is queued and join the worker.
    ///
    /// Bounded by `shutdown_timeout`. On timeout the worker is cancelled,
    /// whatever it still holds is dropped and counted, and
    /// [`TransportError::Timeout`] is returned.
    pub fn shutdown(&self) -> Result<(), TransportError> {
        self.inner.shutdown()
    }

    pub fn state(&self) -> TransportState {
        self.inner.state()
    }

    pub fn stats(&self) -> TransportStats {
        self.inner.stats()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }
}

impl Inner {
    fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TransportState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn send(&self, entry: NormalizedEntry) -> bool {
        let guard = self.sender.read().unwrap_or_else(|p| p.into_inner());
        let Some(sender) = guard.as_ref() else {
            self.reject_closed();
            return false;
        };

        // Count before the push so the worker never sees a negative depth.
        self.depth.fetch_add(1, Ordering::AcqRel);
        let queued = QueuedEntry {
            entry,
            enqueued_at: Instant::now(),
        };
        match sender.try_send(queued) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.depth.fetch_sub(1, Ordering::AcqRel);
                let dropped = self.counters.dropped_overflow.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!(dropped, capacity = self.config.max_queue_size, "log queue full, dropping entries");
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.depth.fetch_sub(1, Ordering::AcqRel);
                self.reject_closed();
                false
            }
        }
    }

    fn reject_closed(&self) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        if !self.warned_closed.swap(true, Ordering::Relaxed) {
            warn!("log transport is shut down, dropping entries");
        }
    }

    fn request_flush(&self, ack: FlushAck) -> Result<(), TransportError> {
        if self.state() == TransportState::Stopped {
            return Err(TransportError::AlreadyShutdown);
        }
        self.control
            .send(Control::Flush(ack))
            .map_err(|_| TransportError::AlreadyShutdown)
    }

    fn shutdown(&self) -> Result<(), TransportError> {
        if self
            .state
            .compare_exchange(
                TransportState::Running as u8,
                TransportState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(TransportError::AlreadyShutdown);
        }

        // Dropping the only sender closes the queue; the worker drains what
        // is left and exits when it reads the end of the channel.
        drop(self.sender.write().unwrap_or_else(|p| p.into_inner()).take());

        let handle = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        let Some(handle) = handle else {
            self.set_state(TransportState::Stopped);
            return Ok(());
        };

        let limit = self.config.shutdown_timeout;
        let result = match handle.done.recv_timeout(limit) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                let _ = handle.thread.join();
                Ok(())
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                self.cancel.cancel();
                error!(
                    pending = self.depth.load(Ordering::Acquire),
                    timeout = ?limit,
                    "log transport did not drain before the shutdown deadline, dropping undelivered entries"
                );
                if handle.done.recv_timeout(ABANDON_GRACE).is_ok() {
                    let _ = handle.thread.join();
                }
                Err(TransportError::Timeout(limit))
            }
        };
        self.set_state(TransportState::Stopped);

        let stats = self.stats();
        if stats.dropped_entries > 0 || stats.dropped_overflow > 0 {
            warn!(
                dropped_entries = stats.dropped_entries,
                dropped_batches = stats.dropped_batches,
                dropped_overflow = stats.dropped_overflow,
                "log entries were lost during the lifetime of this transport"
            );
        }
        debug!(
            enqueued = stats.enqueued,
            delivered = stats.delivered_entries,
            "log transport stopped"
        );
        result
    }

    fn stats(&self) -> TransportStats {
        let c = &self.counters;
        TransportStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            delivered_entries: c.delivered_entries.load(Ordering::Relaxed),
            delivered_batches: c.delivered_batches.load(Ordering::Relaxed),
            dropped_overflow: c.dropped_overflow.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            dropped_batches: c.dropped_batches.load(Ordering::Relaxed),
            dropped_entries: c.dropped_entries.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            queue_depth: self.depth.load(Ordering::Acquire),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.state() == TransportState::Running {
            let _ = self.shutdown();
        }
    }
}

struct Worker {
    sink: Arc<dyn LogSink>,
    config: TransportConfig,
    entries: mpsc::Receiver<QueuedEntry>,
    control: mpsc::UnboundedReceiver<Control>,
    depth: Arc<AtomicUsize>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    batch: Vec<QueuedEntry>,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.abandon();
                    return;
                }
                Some(Control::Flush(ack)) = self.control.recv() => {
                    self.drain().await;
                    if let Err(e) = self.sink.flush().await {
                        debug!(error = %e, "log sink flush failed");
                    }
                    ack.complete();
                }
                received = self.entries.recv() => match received {
                    Some(item) => {
                        self.take(item);
                        if self.batch.len() >= self.config.batch_size {
                            self.deliver_batch().await;
                        } else if self.buffered() >= self.config.high_watermark {
                            debug!(buffered = self.buffered(), "log buffer reached high watermark");
                            self.drain().await;
                        }
                    }
                    None => {
                        // Intake closed by shutdown: everything is in the batch.
                        self.deliver_pending().await;
                        if let Err(e) = self.sink.flush().await {
                            debug!(error = %e, "log sink flush failed");
                        }
                        // Flushes that raced with shutdown are satisfied by the final drain.
                        while let Ok(Control::Flush(ack)) = self.control.try_recv() {
                            ack.complete();
                        }
                        return;
                    }
                },
                _ = ticker.tick() => {
                    self.deliver_pending().await;
                }
            }
        }
    }

    fn buffered(&self) -> usize {
        self.batch.len() + self.depth.load(Ordering::Acquire)
    }

    fn take(&mut self, item: QueuedEntry) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
        self.batch.push(item);
    }

    /// Deliver the open batch and everything that was queued when the
    /// drain started.
    async fn drain(&mut self) {
        let mut remaining = self.depth.load(Ordering::Acquire);
        loop {
            while remaining > 0 && self.batch.len() < self.config.batch_size {
                match self.entries.try_recv() {
                    Ok(item) => {
                        self.take(item);
                        remaining -= 1;
                    }
                    Err(_) => {
                        remaining = 0;
                    }
                }
            }
            if self.batch.is_empty() || self.cancel.is_cancelled() {
                return;
            }
            self.deliver_batch().await;
        }
    }

    async fn deliver_pending(&mut self) {
        while !self.batch.is_empty() && !self.cancel.is_cancelled() {
            self.deliver_batch().await;
        }
    }

    async fn deliver_batch(&mut self) {
        let take = self.batch.len().min(self.config.batch_size);
        let items: Vec<QueuedEntry> = self.batch.drain(..take).collect();
        if items.is_empty() {
            return;
        }
        let waited = items[0].enqueued_at.elapsed();
        let batch: Vec<NormalizedEntry> = items.into_iter().map(|q| q.entry).collect();
        let n = batch.len() as u64;

        match send_batch(&*self.sink, &batch, &self.config, &self.counters, &self.cancel).await {
            Ok(()) => {
                self.counters.delivered_batches.fetch_add(1, Ordering::Relaxed);
                self.counters.delivered_entries.fetch_add(n, Ordering::Relaxed);
                debug!(entries = n, oldest_wait = ?waited, "delivered log batch");
            }
            Err(failure) => {
                self.counters.dropped_batches.fetch_add(1, Ordering::Relaxed);
                self.counters.dropped_entries.fetch_add(n, Ordering::Relaxed);
                match failure {
                    BatchFailure::Cancelled => {}
                    BatchFailure::Rejected(e) => {
                        warn!(entries = n, error = %e, "log sink rejected batch, dropping it");
                    }
                    BatchFailure::Exhausted(e) => {
                        warn!(
                            entries = n,
                            attempts = self.config.max_retries + 1,
                            error = %e,
                            "log sink delivery failed, dropping batch"
                        );
                    }
                }
            }
        }
    }

    /// Account for everything still held after cancellation.
    fn abandon(&mut self) {
        self.entries.close();
        let mut dropped = self.batch.len() as u64;
        self.batch.clear();
        while self.entries.try_recv().is_ok() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            dropped += 1;
        }
        if dropped > 0 {
            self.counters.dropped_batches.fetch_add(1, Ordering::Relaxed);
            self.counters.dropped_entries.fetch_add(dropped, Ordering::Relaxed);
            error!(dropped, "log transport cancelled, undelivered entries dropped");
        }
    }
}

enum BatchFailure {
    /// Transient failures outlasted every retry.
    Exhausted(SinkError),
    /// The sink refused the batch for good.
    Rejected(SinkError),
    /// Shutdown gave up on the batch.
    Cancelled,
}

async fn send_batch(
    sink: &dyn LogSink,
    batch: &[NormalizedEntry],
    config: &TransportConfig,
    counters: &Counters,
    cancel: &CancellationToken,
) -> Result<(), BatchFailure> {
    let mut backoff = config.initial_backoff;
    let mut attempt: u32 = 0;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BatchFailure::Cancelled),
            outcome = timeout(config.delivery_timeout, sink.deliver(batch)) => outcome,
        };

        let err = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => SinkError::transient(format!(
                "delivery timed out after {:?}",
                config.delivery_timeout
            )),
        };

        if !err.is_transient() {
            return Err(BatchFailure::Rejected(err));
        }
        if attempt >= config.max_retries {
            return Err(BatchFailure::Exhausted(err));
        }

        attempt += 1;
        counters.retries.fetch_add(1, Ordering::Relaxed);
        debug!(attempt, backoff = ?backoff, error = %err, "log sink delivery failed, retrying");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BatchFailure::Cancelled),
            _ = sleep(backoff) => {}
        }
        backoff = std::cmp::min(backoff * 2, config.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn normalized_enforces_minimums() {
        let config = TransportConfig {
            max_queue_size: 0,
            batch_size: 0,
            flush_interval: Duration::ZERO,
            high_watermark: 100_000,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.max_queue_size, 16);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.high_watermark, 16);
        assert_eq!(config.flush_interval, Duration::from_millis(10));
    }

    #[test]
    fn from_env_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("LOG_SINK_BATCH_SIZE", "10"),
            ("LOG_SINK_FLUSH_INTERVAL_MS", "250"),
            ("LOG_SINK_MAX_RETRIES", "0"),
        ]
        .into_iter()
        .collect();
        let config = TransportConfig::from_env(&env).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.max_queue_size, TransportConfig::default().max_queue_size);
    }

    #[test]
    fn from_env_rejects_garbage() {
        let env: HashMap<&str, &str> = [("LOG_SINK_QUEUE_SIZE", "lots")].into_iter().collect();
        let err = TransportConfig::from_env(&env).unwrap_err();
        assert!(err.to_string().contains("LOG_SINK_QUEUE_SIZE"));
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            TransportState::Idle,
            TransportState::Running,
            TransportState::ShuttingDown,
            TransportState::Stopped,
        ] {
            assert_eq!(TransportState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn constructed_transport_is_running() {
        let transport =
            BatchingTransport::new(Arc::new(crate::noop_sink::NoopSink), TransportConfig::default())
                .unwrap();
        assert_eq!(transport.state(), TransportState::Running);
        transport.shutdown().unwrap();
        assert_eq!(transport.state(), TransportState::Stopped);
    }

    #[test]
    fn worker_thread_flag_is_thread_local() {
        assert!(!on_worker_thread());
    }
}
