//! `ConsumerClient` — runs one receive loop per partition and delivers
//! batches to a subscription handler.

use crate::checkpoint::CheckpointStore;
use crate::config::StartPosition;
use crate::context::PartitionContext;
use crate::source::EventSource;
use async_trait::async_trait;
use hubwatch_core::{ConsumerError, ReceivedEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callbacks a subscription delivers to.
///
/// Batches of one partition are delivered sequentially; the next batch is
/// only received after `process_events` returns.
#[async_trait]
pub trait SubscriptionHandler: Send + Sync {
    /// Called for every received batch, including empty ones after an
    /// idle wait.
    async fn process_events(&self, events: &[ReceivedEvent], ctx: &PartitionContext);

    /// Called when receiving from a partition fails. The loop retries
    /// after a backoff.
    async fn process_error(&self, error: &ConsumerError, ctx: &PartitionContext);
}

/// Receive-loop tuning.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub max_batch_size: usize,
    /// Idle wait before an empty batch is delivered.
    pub max_wait: Duration,
    pub start_position: StartPosition,
    /// Pause after a receive error.
    pub retry_backoff: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_wait: Duration::from_secs(1),
            start_position: StartPosition::Earliest,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Connects an event source, a checkpoint store and a consumer group.
pub struct ConsumerClient {
    consumer_group: String,
    source: Arc<dyn EventSource>,
    store: Arc<dyn CheckpointStore>,
    options: SubscriptionOptions,
}

impl ConsumerClient {
    pub fn new(
        consumer_group: impl Into<String>,
        source: Arc<dyn EventSource>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            consumer_group: consumer_group.into(),
            source,
            store,
            options: SubscriptionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SubscriptionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    pub fn event_hub(&self) -> &str {
        self.source.name()
    }

    /// Start receiving from every partition. Spawns one Tokio task per
    /// partition and returns immediately.
    pub async fn subscribe(
        &self,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<Subscription, ConsumerError> {
        let partition_ids = self.source.partition_ids().await?;
        info!(
            "Subscribing consumer group '{}' to '{}' ({} partitions)",
            self.consumer_group,
            self.source.name(),
            partition_ids.len()
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = partition_ids
            .into_iter()
            .map(|partition_id| {
                let ctx = PartitionContext::new(
                    self.source.name(),
                    self.consumer_group.clone(),
                    partition_id,
                    Arc::clone(&self.store),
                );
                let receiver = PartitionReceiver {
                    source: Arc::clone(&self.source),
                    handler: Arc::clone(&handler),
                    ctx,
                    options: self.options.clone(),
                    shutdown: shutdown_rx.clone(),
                };
                tokio::spawn(receiver.run())
            })
            .collect();

        Ok(Subscription {
            shutdown: shutdown_tx,
            tasks,
        })
    }
}

/// A running subscription. Dropping it without `close` signals the partition
/// loops to stop but does not wait for them.
pub struct Subscription {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub fn partition_count(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` while any partition loop is still running.
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Stop every partition loop and wait for in-flight batches to finish.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Partition task ended abnormally: {e}");
            }
        }
        info!("Subscription closed");
    }
}

struct PartitionReceiver {
    source: Arc<dyn EventSource>,
    handler: Arc<dyn SubscriptionHandler>,
    ctx: PartitionContext,
    options: SubscriptionOptions,
    shutdown: watch::Receiver<bool>,
}

impl PartitionReceiver {
    /// Where to resume: after the stored checkpoint, otherwise per the
    /// configured start position.
    async fn start_after(&self) -> Result<Option<i64>, ConsumerError> {
        match self.ctx.checkpoint().await {
            Ok(Some(cp)) => return Ok(Some(cp.sequence_number)),
            Ok(None) => {}
            Err(e) => warn!(
                "Could not load checkpoint for partition '{}', using start position: {e}",
                self.ctx.partition_id()
            ),
        }
        match self.options.start_position {
            StartPosition::Earliest => Ok(None),
            StartPosition::Latest => self.source.last_sequence_number(self.ctx.partition_id()).await,
        }
    }

    /// Sleep for `d`. Returns `true` if shutdown was signalled meanwhile.
    async fn pause(&mut self, d: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.changed() => true,
            _ = tokio::time::sleep(d) => false,
        }
    }

    async fn run(mut self) {
        let partition_id = self.ctx.partition_id().to_string();

        let mut position = loop {
            match self.start_after().await {
                Ok(p) => break p,
                Err(e) => {
                    self.handler.process_error(&e, &self.ctx).await;
                    if self.pause(self.options.retry_backoff).await {
                        return;
                    }
                }
            }
        };
        info!("Partition '{partition_id}' receiving after sequence number {position:?}");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                _ = self.shutdown.changed() => break,
                r = self.source.receive_batch(&partition_id, position, self.options.max_batch_size) => r,
            };

            match received {
                Ok(events) => {
                    if events.is_empty() && self.pause(self.options.max_wait).await {
                        break;
                    }
                    if let Some(last) = events.last() {
                        position = Some(last.sequence_number);
                    }
                    debug!("Partition '{partition_id}': delivering {} events", events.len());
                    self.handler.process_events(&events, &self.ctx).await;
                }
                Err(e) => {
                    warn!("Receive error [{partition_id}]: {e}");
                    self.handler.process_error(&e, &self.ctx).await;
                    if self.pause(self.options.retry_backoff).await {
                        break;
                    }
                }
            }
        }
        info!("Partition '{partition_id}' stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::source::MemorySource;
    use hubwatch_core::RecordValue;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collector {
        batches: Mutex<Vec<(String, Vec<i64>)>>,
        errors: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SubscriptionHandler for Collector {
        async fn process_events(&self, events: &[ReceivedEvent], ctx: &PartitionContext) {
            let seqs = events.iter().map(|e| e.sequence_number).collect();
            self.batches
                .lock()
                .unwrap()
                .push((ctx.partition_id().to_string(), seqs));
        }

        async fn process_error(&self, error: &ConsumerError, _ctx: &PartitionContext) {
            self.errors.lock().unwrap().push(error.code().to_string());
        }
    }

    fn fast() -> SubscriptionOptions {
        SubscriptionOptions {
            max_batch_size: 2,
            max_wait: Duration::from_millis(10),
            start_position: StartPosition::Earliest,
            retry_backoff: Duration::from_millis(10),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    fn delivered(collector: &Collector, partition: &str) -> Vec<i64> {
        collector
            .batches
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == partition)
            .flat_map(|(_, seqs)| seqs.clone())
            .collect()
    }

    #[tokio::test]
    async fn delivers_every_partition_in_order() {
        let source = Arc::new(MemorySource::new("hub", &["0", "1"]));
        for i in 0..5 {
            source.push("0", RecordValue::Int(i)).unwrap();
        }
        source.push("1", RecordValue::Int(9)).unwrap();

        let client = ConsumerClient::new("$Default", source, Arc::new(MemoryCheckpointStore::new()))
            .with_options(fast());
        let collector = Arc::new(Collector::default());
        let sub = client.subscribe(collector.clone()).await.unwrap();
        assert_eq!(sub.partition_count(), 2);

        settle().await;
        assert!(sub.is_running());
        sub.close().await;

        assert_eq!(delivered(&collector, "0"), vec![0, 1, 2, 3, 4]);
        assert_eq!(delivered(&collector, "1"), vec![0]);
        // Idle partitions still deliver (empty) batches.
        assert!(collector
            .batches
            .lock()
            .unwrap()
            .iter()
            .any(|(_, seqs)| seqs.is_empty()));
    }

    #[tokio::test]
    async fn resumes_after_stored_checkpoint() {
        let source = Arc::new(MemorySource::new("hub", &["0"]));
        for i in 0..4 {
            source.push("0", RecordValue::Int(i)).unwrap();
        }
        let store = Arc::new(MemoryCheckpointStore::new());
        let ctx = PartitionContext::new("hub", "$Default", "0", store.clone());
        ctx.update_checkpoint(&ReceivedEvent::new(RecordValue::Null, 1, 1))
            .await
            .unwrap();

        let client = ConsumerClient::new("$Default", source, store).with_options(fast());
        let collector = Arc::new(Collector::default());
        let sub = client.subscribe(collector.clone()).await.unwrap();
        settle().await;
        sub.close().await;

        assert_eq!(delivered(&collector, "0"), vec![2, 3]);
    }

    #[tokio::test]
    async fn latest_start_skips_existing_events() {
        let source = Arc::new(MemorySource::new("hub", &["0"]));
        source.push("0", RecordValue::Int(0)).unwrap();

        let client = ConsumerClient::new("$Default", source.clone(), Arc::new(MemoryCheckpointStore::new()))
            .with_options(SubscriptionOptions {
                start_position: StartPosition::Latest,
                ..fast()
            });
        let collector = Arc::new(Collector::default());
        let sub = client.subscribe(collector.clone()).await.unwrap();
        settle().await;
        source.push("0", RecordValue::Int(1)).unwrap();
        settle().await;
        sub.close().await;

        assert_eq!(delivered(&collector, "0"), vec![1]);
    }

    #[tokio::test]
    async fn receive_errors_go_to_the_error_callback() {
        let source = Arc::new(MemorySource::new("hub", &["0"]));
        source.push("0", RecordValue::Int(0)).unwrap();
        source.fail_next("0", "throttled");

        let client = ConsumerClient::new("$Default", source, Arc::new(MemoryCheckpointStore::new()))
            .with_options(fast());
        let collector = Arc::new(Collector::default());
        let sub = client.subscribe(collector.clone()).await.unwrap();
        settle().await;
        sub.close().await;

        assert_eq!(*collector.errors.lock().unwrap(), vec!["SourceError".to_string()]);
        assert_eq!(delivered(&collector, "0"), vec![0]);
    }

    #[tokio::test]
    async fn close_stops_all_partitions() {
        let source = Arc::new(MemorySource::new("hub", &["0", "1", "2"]));
        let client = ConsumerClient::new("$Default", source, Arc::new(MemoryCheckpointStore::new()))
            .with_options(SubscriptionOptions {
                max_wait: Duration::from_secs(60),
                ..fast()
            });
        let sub = client
            .subscribe(Arc::new(Collector::default()))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), sub.close())
            .await
            .expect("close should not wait for the idle timeout");
    }
}
