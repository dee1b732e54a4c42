//! Error types for the Hubwatch decode and consume pipeline.

use thiserror::Error;

/// Errors that fail the processing of a single record.
///
/// Field-level decode problems never surface here; the decoder falls back
/// to the best value it has. These are the failures that abandon one
/// record while the rest of the batch carries on.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Record nesting exceeds depth limit {limit} (reached {depth})")]
    DepthExceeded { depth: usize, limit: usize },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors delivered on the subscription error channel.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Event source failed: {reason}")]
    Source { reason: String },

    #[error("Partition '{partition_id}' not found")]
    PartitionNotFound { partition_id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Avro error: {0}")]
    Avro(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ConsumerError {
    /// Short, stable code for log lines (`"<code> - <message>"`).
    pub fn code(&self) -> &'static str {
        match self {
            Self::Source { .. } => "SourceError",
            Self::PartitionNotFound { .. } => "PartitionNotFound",
            Self::Io(_) => "IoError",
            Self::Avro(_) => "AvroError",
            Self::Json(_) => "JsonError",
            Self::Config(_) => "ConfigError",
            Self::Other(_) => "GeneralError",
        }
    }
}

/// Errors from the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}
