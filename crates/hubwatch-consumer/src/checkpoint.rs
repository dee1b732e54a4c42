//! Checkpoint stores — persist each partition's last processed position so
//! a restarted consumer resumes instead of reprocessing.
//!
//! A checkpoint records the offset and sequence number of the last event
//! of a processed batch. On restart the consumer continues with the first
//! event after that sequence number.

use async_trait::async_trait;
use hubwatch_core::CheckpointError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// A persisted checkpoint for one partition of one consumer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Event hub (source) name.
    pub event_hub: String,
    pub consumer_group: String,
    pub partition_id: String,
    /// Offset of the last processed event.
    pub offset: i64,
    /// Sequence number of the last processed event.
    pub sequence_number: i64,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Trait for storing and loading checkpoints.
///
/// Implementations: [`MemoryCheckpointStore`] and [`FileCheckpointStore`].
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint of one partition.
    async fn load(
        &self,
        event_hub: &str,
        consumer_group: &str,
        partition_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// All checkpoints of a consumer group, ordered by partition id.
    async fn list(
        &self,
        event_hub: &str,
        consumer_group: &str,
    ) -> Result<Vec<Checkpoint>, CheckpointError>;
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral consumers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(event_hub: &str, consumer_group: &str, partition_id: &str) -> String {
        format!("{event_hub}:{consumer_group}:{partition_id}")
    }

    fn poisoned() -> CheckpointError {
        CheckpointError::Storage("checkpoint map lock poisoned".into())
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(
        &self,
        event_hub: &str,
        consumer_group: &str,
        partition_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let data = self.data.lock().map_err(|_| Self::poisoned())?;
        Ok(data
            .get(&Self::key(event_hub, consumer_group, partition_id))
            .cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let key = Self::key(
            &checkpoint.event_hub,
            &checkpoint.consumer_group,
            &checkpoint.partition_id,
        );
        self.data
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(key, checkpoint);
        Ok(())
    }

    async fn list(
        &self,
        event_hub: &str,
        consumer_group: &str,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        let data = self.data.lock().map_err(|_| Self::poisoned())?;
        let mut out: Vec<_> = data
            .values()
            .filter(|cp| cp.event_hub == event_hub && cp.consumer_group == consumer_group)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.partition_id.cmp(&b.partition_id));
        Ok(out)
    }
}

// ─── File store ───────────────────────────────────────────────────────────────

/// Checkpoints as JSON blobs in a directory, laid out like a blob container:
/// `<root>/<event_hub>/<consumer_group>/checkpoint/<partition_id>.json`.
///
/// Event hub and consumer group names are lower-cased.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn group_dir(&self, event_hub: &str, consumer_group: &str) -> PathBuf {
        self.root
            .join(event_hub.to_lowercase())
            .join(consumer_group.to_lowercase())
            .join("checkpoint")
    }

    fn blob_path(&self, event_hub: &str, consumer_group: &str, partition_id: &str) -> PathBuf {
        self.group_dir(event_hub, consumer_group)
            .join(format!("{partition_id}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(
        &self,
        event_hub: &str,
        consumer_group: &str,
        partition_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.blob_path(event_hub, consumer_group, partition_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let dir = self.group_dir(&checkpoint.event_hub, &checkpoint.consumer_group);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}.json", checkpoint.partition_id));
        let tmp = dir.join(format!(".{}.json.tmp", checkpoint.partition_id));
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;

        // Write-then-rename so readers never see a torn blob.
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("checkpoint written to {}", path.display());
        Ok(())
    }

    async fn list(
        &self,
        event_hub: &str,
        consumer_group: &str,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        let dir = self.group_dir(event_hub, consumer_group);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_blob = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_blob {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            out.push(serde_json::from_slice::<Checkpoint>(&bytes)?);
        }
        out.sort_by(|a, b| a.partition_id.cmp(&b.partition_id));
        Ok(out)
    }
}
