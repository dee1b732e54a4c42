//! # hubwatch-consumer
//!
//! Event-hub subscription runtime for Hubwatch.
//!
//! Reads every partition of an event source, hands batches to a
//! `BatchProcessor` which decodes and filters each event against the
//! watch-list, and checkpoints the last event of every batch.
//!
//! ## Architecture
//! ```text
//! EventSource (memory / capture files)
//!       │
//!       ▼
//! ConsumerClient ── one Tokio task per partition
//!       │
//!       ▼
//! SubscriptionHandler::process_events / process_error
//!       │
//!       ▼
//! BatchProcessor (walk + watch-list) ──▶ tracing
//!       │
//!       ▼
//! PartitionContext::update_checkpoint ──▶ CheckpointStore
//! ```

pub mod checkpoint;
pub mod client;
pub mod config;
pub mod context;
pub mod file_source;
pub mod processor;
pub mod source;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use client::{ConsumerClient, Subscription, SubscriptionHandler, SubscriptionOptions};
pub use config::{ConsumerConfig, StartPosition};
pub use context::PartitionContext;
pub use file_source::{load_file, FileFormat, FileSource};
pub use processor::{BatchOutcome, BatchProcessor, ProcessorMetrics};
pub use source::{EventSource, MemorySource};
