//! `BatchProcessor` — checks every delivered event against the configured
//! watch-list and checkpoints each non-empty batch.
//!
//! Per event, a fresh copy of the watch-list is walked through the decoded
//! record. An event whose copy ends up empty is logged in full. With an
//! empty watch-list that holds for every event, so an unfiltered consumer
//! logs everything it receives.

use crate::client::SubscriptionHandler;
use crate::context::PartitionContext;
use async_trait::async_trait;
use hubwatch_core::{ConsumerError, DecodeError, ReceivedEvent, Walked, Walker, WatchList};
use hubwatch_observability::HubwatchMetrics;
use std::sync::Mutex;
use tracing::{error, info};

/// Running counters for the processor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorMetrics {
    pub batches: u64,
    pub empty_batches: u64,
    pub events_received: u64,
    pub events_matched: u64,
    pub decode_failures: u64,
    pub checkpoints: u64,
    pub checkpoint_failures: u64,
}

/// What happened to one delivered batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub received: usize,
    /// Events whose watch-list was fully consumed (and were logged).
    pub matched: usize,
    /// Events that failed to process.
    pub failed: usize,
    /// Whether the checkpoint was advanced.
    pub checkpointed: bool,
}

pub struct BatchProcessor {
    watch_list: WatchList,
    walker: Walker,
    metrics: Mutex<ProcessorMetrics>,
    telemetry: Option<HubwatchMetrics>,
}

impl BatchProcessor {
    pub fn new(watch_list: WatchList) -> Self {
        Self {
            watch_list,
            walker: Walker::default(),
            metrics: Mutex::new(ProcessorMetrics::default()),
            telemetry: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.walker = Walker::new(max_depth);
        self
    }

    /// Also report through OpenTelemetry instruments.
    pub fn with_metrics(mut self, metrics: HubwatchMetrics) -> Self {
        self.telemetry = Some(metrics);
        self
    }

    /// The configured watch-list; never modified by processing.
    pub fn watch_list(&self) -> &WatchList {
        &self.watch_list
    }

    /// Returns a snapshot of the running counters.
    pub fn metrics(&self) -> ProcessorMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn bump(&self, f: impl FnOnce(&mut ProcessorMetrics)) {
        let mut metrics = self
            .metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut metrics);
    }

    /// Decode one event against a fresh copy of the watch-list.
    pub fn process_event(&self, event: &ReceivedEvent) -> Result<Walked, DecodeError> {
        self.walker.walk(&event.as_record(), self.watch_list.clone())
    }

    /// Returns `true` if the event was fully matched and logged.
    fn handle_event(&self, event: &ReceivedEvent, ctx: &PartitionContext) -> Result<bool, DecodeError> {
        let walked = self.process_event(event)?;
        if !walked.remaining.is_empty() {
            return Ok(false);
        }
        let pretty = walked.result.to_pretty_json()?;
        info!(
            "Received event from partition: '{}' and consumer group: {}\n{}",
            ctx.partition_id(),
            ctx.consumer_group(),
            pretty
        );
        Ok(true)
    }

    /// Process one delivered batch.
    ///
    /// Empty batches are logged and never checkpointed. Otherwise every
    /// event is processed, failures are logged without stopping the batch,
    /// and the checkpoint is advanced to the last event.
    pub async fn process_batch(&self, events: &[ReceivedEvent], ctx: &PartitionContext) -> BatchOutcome {
        let Some(last) = events.last() else {
            info!("No events received");
            self.bump(|m| {
                m.batches += 1;
                m.empty_batches += 1;
            });
            return BatchOutcome::default();
        };

        if let Some(t) = &self.telemetry {
            t.record_batch(ctx.partition_id(), events.len());
        }

        let mut outcome = BatchOutcome {
            received: events.len(),
            ..BatchOutcome::default()
        };

        for event in events {
            match self.handle_event(event, ctx) {
                Ok(true) => {
                    outcome.matched += 1;
                    if let Some(t) = &self.telemetry {
                        t.record_match(ctx.partition_id());
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    error!(
                        "Error processing event {} from partition '{}': {e}",
                        event.sequence_number,
                        ctx.partition_id()
                    );
                    outcome.failed += 1;
                    if let Some(t) = &self.telemetry {
                        t.record_decode_failure(ctx.partition_id(), error_type(&e));
                    }
                }
            }
        }

        match ctx.update_checkpoint(last).await {
            Ok(()) => outcome.checkpointed = true,
            Err(e) => {
                error!(
                    "Error updating checkpoint for partition '{}': {e}",
                    ctx.partition_id()
                );
                if let Some(t) = &self.telemetry {
                    t.record_checkpoint_failure(ctx.partition_id());
                }
            }
        }

        self.bump(|m| {
            m.batches += 1;
            m.events_received += outcome.received as u64;
            m.events_matched += outcome.matched as u64;
            m.decode_failures += outcome.failed as u64;
            if outcome.checkpointed {
                m.checkpoints += 1;
            } else {
                m.checkpoint_failures += 1;
            }
        });
        outcome
    }

    /// Log an error delivered on the subscription error channel.
    pub fn process_error(&self, error: &ConsumerError, ctx: &PartitionContext) {
        info!(
            "Error: {} - {} (partition '{}')",
            error.code(),
            error,
            ctx.partition_id()
        );
    }
}

fn error_type(e: &DecodeError) -> &'static str {
    match e {
        DecodeError::DepthExceeded { .. } => "depth_exceeded",
        DecodeError::Serde(_) => "serde",
    }
}

#[async_trait]
impl SubscriptionHandler for BatchProcessor {
    async fn process_events(&self, events: &[ReceivedEvent], ctx: &PartitionContext) {
        self.process_batch(events, ctx).await;
    }

    async fn process_error(&self, error: &ConsumerError, ctx: &PartitionContext) {
        BatchProcessor::process_error(self, error, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
    use hubwatch_core::{CheckpointError, RecordValue};
    use serde_json::json;
    use std::sync::Arc;

    /// Counts saves and optionally fails them.
    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<Checkpoint>>,
        fail: bool,
    }

    #[async_trait]
    impl CheckpointStore for RecordingStore {
        async fn load(&self, _: &str, _: &str, _: &str) -> Result<Option<Checkpoint>, CheckpointError> {
            Ok(None)
        }

        async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
            if self.fail {
                return Err(CheckpointError::Storage("container unavailable".into()));
            }
            self.saved.lock().unwrap().push(checkpoint);
            Ok(())
        }

        async fn list(&self, _: &str, _: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
            Ok(self.saved.lock().unwrap().clone())
        }
    }

    fn ctx_with(store: Arc<dyn CheckpointStore>) -> PartitionContext {
        PartitionContext::new("telemetry", "$Default", "0", store)
    }

    fn event(body: serde_json::Value, seq: i64) -> ReceivedEvent {
        ReceivedEvent::new(body.into(), seq * 10, seq)
    }

    fn alice() -> serde_json::Value {
        json!({"id": {"long": 42}, "name": {"string": "alice"}})
    }

    #[tokio::test]
    async fn empty_batch_is_not_checkpointed() {
        let store = Arc::new(RecordingStore::default());
        let processor = BatchProcessor::new(WatchList::new(["alice"]));
        let outcome = processor.process_batch(&[], &ctx_with(store.clone())).await;

        assert_eq!(outcome, BatchOutcome::default());
        assert!(store.saved.lock().unwrap().is_empty());
        assert_eq!(processor.metrics().empty_batches, 1);
    }

    #[tokio::test]
    async fn full_match_is_logged_and_checkpointed() {
        let store = Arc::new(RecordingStore::default());
        let processor = BatchProcessor::new(WatchList::new(["alice"]));
        let outcome = processor
            .process_batch(&[event(alice(), 0)], &ctx_with(store.clone()))
            .await;

        assert_eq!(outcome.matched, 1);
        assert!(outcome.checkpointed);
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].sequence_number, 0);
    }

    #[tokio::test]
    async fn unmatched_event_still_checkpoints() {
        let store = Arc::new(RecordingStore::default());
        let processor = BatchProcessor::new(WatchList::new(["bob"]));
        let outcome = processor
            .process_batch(&[event(alice(), 0)], &ctx_with(store.clone()))
            .await;

        assert_eq!(outcome.matched, 0);
        assert!(outcome.checkpointed);
        assert_eq!(store.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn decoded_record_and_remaining_list() {
        let processor = BatchProcessor::new(WatchList::new(["bob"]));
        let walked = processor.process_event(&event(alice(), 3)).unwrap();
        let body = &walked.result.as_mapping().unwrap()["body"];
        assert_eq!(body.to_json(), json!({"id": 42, "name": "alice"}));
        assert_eq!(walked.remaining, WatchList::new(["bob"]));
    }

    #[tokio::test]
    async fn watch_list_is_fresh_per_event() {
        let store = Arc::new(RecordingStore::default());
        let processor = BatchProcessor::new(WatchList::new(["alice"]));
        let batch = [event(alice(), 0), event(alice(), 1), event(json!({"x": 1}), 2)];
        let outcome = processor.process_batch(&batch, &ctx_with(store.clone())).await;

        assert_eq!(outcome.matched, 2);
        assert_eq!(processor.watch_list(), &WatchList::new(["alice"]));

        // One save per batch, for the last event.
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].sequence_number, 2);
        assert_eq!(saved[0].offset, 20);
    }

    #[tokio::test]
    async fn empty_watch_list_matches_every_event() {
        let processor = BatchProcessor::new(WatchList::default());
        let batch = [event(json!({"a": 1}), 0), event(json!("scalar"), 1)];
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let outcome = processor.process_batch(&batch, &ctx_with(store)).await;
        assert_eq!(outcome.matched, 2);
    }

    #[tokio::test]
    async fn failing_event_does_not_stop_the_batch() {
        let store = Arc::new(RecordingStore::default());
        let processor = BatchProcessor::new(WatchList::default()).with_max_depth(3);
        let batch = [
            event(json!({"deep": {"a": {"b": {"c": 1}}}}), 0),
            event(json!({"ok": {"int": 1}}), 1),
        ];
        let outcome = processor.process_batch(&batch, &ctx_with(store.clone())).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.matched, 1);
        assert!(outcome.checkpointed);
        assert_eq!(store.saved.lock().unwrap()[0].sequence_number, 1);
        assert_eq!(processor.metrics().decode_failures, 1);
    }

    #[tokio::test]
    async fn last_event_is_checkpointed_even_when_it_fails() {
        let store = Arc::new(RecordingStore::default());
        let processor = BatchProcessor::new(WatchList::default()).with_max_depth(2);
        let batch = [event(json!({"a": 1}), 5), event(json!({"a": {"b": {"c": 1}}}), 6)];
        let outcome = processor.process_batch(&batch, &ctx_with(store.clone())).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(store.saved.lock().unwrap()[0].sequence_number, 6);
    }

    #[tokio::test]
    async fn checkpoint_failure_is_contained() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..RecordingStore::default()
        });
        let processor = BatchProcessor::new(WatchList::default());
        let outcome = processor
            .process_batch(&[event(json!({"a": 1}), 0)], &ctx_with(store))
            .await;

        assert!(!outcome.checkpointed);
        assert_eq!(outcome.matched, 1);
        assert_eq!(processor.metrics().checkpoint_failures, 1);
    }

    #[tokio::test]
    async fn binary_body_is_decoded() {
        let processor = BatchProcessor::new(WatchList::new(["pump-1", "body"]));
        let ev = ReceivedEvent::new(RecordValue::binary(b"pump-1".to_vec()), 0, 0);
        let walked = processor.process_event(&ev).unwrap();
        assert!(walked.remaining.is_empty());
    }
}
