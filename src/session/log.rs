use super::types::SessionRecord;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Default number of sessions kept in memory
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Bounded, newest-first history of sealed sessions
///
/// Appends, clears and snapshots all take the same lock, so a `clear` racing an
/// `append` is resolved by lock order: the log is either empty or holds the
/// appended record, never a partial truncation.
#[derive(Debug)]
pub struct SessionLog {
    records: Mutex<VecDeque<SessionRecord>>,
    capacity: usize,
}

impl SessionLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            capacity,
        }
    }

    /// Insert a record at the front, evicting the oldest one when full
    pub fn append(&self, record: SessionRecord) {
        let mut records = self.lock();
        debug!("Logging session {} ({})", record.id, record.app_name);
        records.push_front(record);
        records.truncate(self.capacity);
    }

    /// Atomically drop every record
    pub fn clear(&self) {
        let mut records = self.lock();
        let dropped = records.len();
        records.clear();
        info!("Session log cleared ({} records dropped)", dropped);
    }

    /// Owned copy of the current contents, newest first
    pub fn snapshot(&self) -> Vec<SessionRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<SessionRecord> {
        self.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SessionRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
