use crate::entry::NormalizedEntry;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;

/// A sink that simply drops all entries.
///
/// Useful for measuring the overhead of the layer and transport without
/// any external I/O, and for tests that don't care about delivery.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn deliver(&self, _batch: &[NormalizedEntry]) -> Result<(), SinkError> {
        Ok(())
    }
}
