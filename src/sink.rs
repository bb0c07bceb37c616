use crate::entry::NormalizedEntry;
use async_trait::async_trait;
use std::error::Error;

type BoxError = Box<dyn Error + Send + Sync>;

/// Failure reported by a [`LogSink`].
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// Worth retrying: network errors, timeouts, throttling, 5xx.
    #[error("transient sink failure: {0}")]
    Transient(#[source] BoxError),

    /// The batch was rejected and resending it will not help.
    #[error("permanent sink failure: {0}")]
    Permanent(#[source] BoxError),
}

impl SinkError {
    pub fn transient(err: impl Into<BoxError>) -> Self {
        SinkError::Transient(err.into())
    }

    pub fn permanent(err: impl Into<BoxError>) -> Self {
        SinkError::Permanent(err.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// Asynchronous destination for batches of [`NormalizedEntry`]s.
///
/// Implementations are responsible for transporting entries to a concrete
/// backend (the Cloud Logging API, stdout, an in-memory buffer). The
/// transport calls `deliver` from its own worker and never on an
/// application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one batch to the underlying backend.
    ///
    /// **Parameters**
    /// - `batch`: entries in enqueue order, never empty.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted the batch.
    /// - `Err(SinkError::Transient(..))` if the attempt may succeed when
    ///   repeated; the transport retries with backoff.
    /// - `Err(SinkError::Permanent(..))` if the batch was rejected; the
    ///   transport drops it without retrying.
    ///
    /// Each attempt runs under the transport's delivery timeout, so
    /// implementations should use async I/O and not block the thread.
    async fn deliver(&self, batch: &[NormalizedEntry]) -> Result<(), SinkError>;

    /// Flush any buffered entries, if the backend implements buffering.
    ///
    /// Called by the transport after an explicit flush and on shutdown.
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
