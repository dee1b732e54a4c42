//! `EventSource` trait — abstraction over the partitioned message log.
//!
//! The consumer client runs one receive loop per partition and asks the
//! source for the next batch after the last sequence number it handled.

use async_trait::async_trait;
use hubwatch_core::{ConsumerError, ReceivedEvent, RecordValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

/// A partitioned log of events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Name of the event hub this source reads.
    fn name(&self) -> &str;

    /// Identifiers of all partitions.
    async fn partition_ids(&self) -> Result<Vec<String>, ConsumerError>;

    /// Up to `max` events whose sequence number is greater than `after`
    /// (from the start of the partition when `after` is `None`).
    async fn receive_batch(
        &self,
        partition_id: &str,
        after: Option<i64>,
        max: usize,
    ) -> Result<Vec<ReceivedEvent>, ConsumerError>;

    /// Sequence number of the newest event, `None` for an empty partition.
    async fn last_sequence_number(&self, partition_id: &str) -> Result<Option<i64>, ConsumerError>;
}

/// Select the next batch from a partition sorted by sequence number.
pub(crate) fn next_batch(events: &[ReceivedEvent], after: Option<i64>, max: usize) -> Vec<ReceivedEvent> {
    let start = match after {
        Some(seq) => events.partition_point(|e| e.sequence_number <= seq),
        None => 0,
    };
    events.iter().skip(start).take(max).cloned().collect()
}

// ─── In-memory source ─────────────────────────────────────────────────────────

/// In-memory source for tests and embedding. Events can be appended while
/// a subscription is running, and failures injected per partition.
pub struct MemorySource {
    name: String,
    partitions: RwLock<BTreeMap<String, Vec<ReceivedEvent>>>,
    failures: Mutex<HashMap<String, String>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, partition_ids: &[&str]) -> Self {
        Self {
            name: name.into(),
            partitions: RwLock::new(
                partition_ids
                    .iter()
                    .map(|id| (id.to_string(), Vec::new()))
                    .collect(),
            ),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Append a body to a partition, assigning the next offset and
    /// sequence number. Returns the sequence number.
    pub fn push(&self, partition_id: &str, body: RecordValue) -> Result<i64, ConsumerError> {
        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| ConsumerError::Other("partition map lock poisoned".into()))?;
        let events = partitions
            .get_mut(partition_id)
            .ok_or_else(|| ConsumerError::PartitionNotFound {
                partition_id: partition_id.to_string(),
            })?;
        let seq = events.last().map_or(0, |e| e.sequence_number + 1);
        events.push(ReceivedEvent::new(body, seq, seq));
        Ok(seq)
    }

    /// Make the next receive on `partition_id` fail with `reason`.
    pub fn fail_next(&self, partition_id: &str, reason: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(partition_id.to_string(), reason.into());
        }
    }

    fn take_failure(&self, partition_id: &str) -> Option<String> {
        self.failures.lock().ok()?.remove(partition_id)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<ReceivedEvent>>>, ConsumerError> {
        self.partitions
            .read()
            .map_err(|_| ConsumerError::Other("partition map lock poisoned".into()))
    }
}

#[async_trait]
impl EventSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn partition_ids(&self) -> Result<Vec<String>, ConsumerError> {
        Ok(self.read()?.keys().cloned().collect())
    }

    async fn receive_batch(
        &self,
        partition_id: &str,
        after: Option<i64>,
        max: usize,
    ) -> Result<Vec<ReceivedEvent>, ConsumerError> {
        if let Some(reason) = self.take_failure(partition_id) {
            return Err(ConsumerError::Source { reason });
        }
        let partitions = self.read()?;
        let events = partitions
            .get(partition_id)
            .ok_or_else(|| ConsumerError::PartitionNotFound {
                partition_id: partition_id.to_string(),
            })?;
        Ok(next_batch(events, after, max))
    }

    async fn last_sequence_number(&self, partition_id: &str) -> Result<Option<i64>, ConsumerError> {
        let partitions = self.read()?;
        let events = partitions
            .get(partition_id)
            .ok_or_else(|| ConsumerError::PartitionNotFound {
                partition_id: partition_id.to_string(),
            })?;
        Ok(events.last().map(|e| e.sequence_number))
    }
}
