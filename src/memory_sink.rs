use crate::entry::NormalizedEntry;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

/// A sink that keeps every delivered batch in memory.
///
/// Clones share the same buffer, so a test can hand one clone to the
/// transport and inspect the other.
#[derive(Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<Vec<NormalizedEntry>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<NormalizedEntry>>> {
        self.batches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All delivered batches, in delivery order.
    pub fn batches(&self) -> Vec<Vec<NormalizedEntry>> {
        self.lock().clone()
    }

    /// All delivered entries, flattened in delivery order.
    pub fn entries(&self) -> Vec<NormalizedEntry> {
        self.lock().iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn deliver(&self, batch: &[NormalizedEntry]) -> Result<(), SinkError> {
        self.lock().push(batch.to_vec());
        Ok(())
    }
}
