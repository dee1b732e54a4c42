//! Hubwatch metrics definitions.
//!
//! All metrics use OpenTelemetry conventions and are exported by whatever
//! meter provider the host process installs. With no provider installed
//! the instruments are no-ops.

use opentelemetry::{
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Central metrics handle for the consumer.
#[derive(Clone)]
pub struct HubwatchMetrics {
    pub events_received: Counter<u64>,
    pub events_matched: Counter<u64>,
    pub decode_failures: Counter<u64>,
    pub checkpoint_failures: Counter<u64>,
    pub batch_size: Histogram<u64>,
}

impl HubwatchMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            events_received: meter
                .u64_counter("hubwatch.events_received")
                .with_description("Events delivered to the batch processor")
                .build(),
            events_matched: meter
                .u64_counter("hubwatch.events_matched")
                .with_description("Events whose watch-list was fully consumed")
                .build(),
            decode_failures: meter
                .u64_counter("hubwatch.decode_failures")
                .with_description("Events that failed to decode")
                .build(),
            checkpoint_failures: meter
                .u64_counter("hubwatch.checkpoint_failures")
                .with_description("Checkpoint updates that failed")
                .build(),
            batch_size: meter
                .u64_histogram("hubwatch.batch_size")
                .with_description("Number of events in a delivered batch")
                .build(),
        }
    }

    /// Instruments on the global meter provider.
    pub fn global() -> Self {
        Self::new(&opentelemetry::global::meter("hubwatch"))
    }

    pub fn record_batch(&self, partition: &str, size: usize) {
        let attrs = [KeyValue::new("partition", partition.to_string())];
        self.batch_size.record(size as u64, &attrs);
        self.events_received.add(size as u64, &attrs);
    }

    pub fn record_match(&self, partition: &str) {
        self.events_matched
            .add(1, &[KeyValue::new("partition", partition.to_string())]);
    }

    pub fn record_decode_failure(&self, partition: &str, error_type: &str) {
        self.decode_failures.add(
            1,
            &[
                KeyValue::new("partition", partition.to_string()),
                KeyValue::new("error_type", error_type.to_string()),
            ],
        );
    }

    pub fn record_checkpoint_failure(&self, partition: &str) {
        self.checkpoint_failures
            .add(1, &[KeyValue::new("partition", partition.to_string())]);
    }
}
