//! Per-partition delivery context handed to subscription handlers.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use hubwatch_core::{CheckpointError, ReceivedEvent};
use std::fmt;
use std::sync::Arc;

/// Metadata of the partition a batch was delivered from, plus the handle
/// used to checkpoint it.
#[derive(Clone)]
pub struct PartitionContext {
    event_hub: String,
    consumer_group: String,
    partition_id: String,
    store: Arc<dyn CheckpointStore>,
}

impl PartitionContext {
    pub fn new(
        event_hub: impl Into<String>,
        consumer_group: impl Into<String>,
        partition_id: impl Into<String>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            event_hub: event_hub.into(),
            consumer_group: consumer_group.into(),
            partition_id: partition_id.into(),
            store,
        }
    }

    pub fn event_hub(&self) -> &str {
        &self.event_hub
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    /// Record `event` as the last processed position of this partition.
    pub async fn update_checkpoint(&self, event: &ReceivedEvent) -> Result<(), CheckpointError> {
        self.store
            .save(Checkpoint {
                event_hub: self.event_hub.clone(),
                consumer_group: self.consumer_group.clone(),
                partition_id: self.partition_id.clone(),
                offset: event.offset,
                sequence_number: event.sequence_number,
                updated_at: chrono::Utc::now().timestamp(),
            })
            .await
    }

    /// The checkpoint currently stored for this partition.
    pub async fn checkpoint(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        self.store
            .load(&self.event_hub, &self.consumer_group, &self.partition_id)
            .await
    }
}

impl fmt::Debug for PartitionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionContext")
            .field("event_hub", &self.event_hub)
            .field("consumer_group", &self.consumer_group)
            .field("partition_id", &self.partition_id)
            .finish_non_exhaustive()
    }
}
