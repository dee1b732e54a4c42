//! # hubwatch-observability
//!
//! Logging and metrics for Hubwatch.
//!
//! ## Built-in metrics
//! - `hubwatch.events_received`     — counter, tagged with partition
//! - `hubwatch.events_matched`      — counter, tagged with partition
//! - `hubwatch.decode_failures`     — counter, tagged with partition + error_type
//! - `hubwatch.checkpoint_failures` — counter, tagged with partition
//! - `hubwatch.batch_size`          — histogram
//!
//! ## Structured logging
//! Human-readable or JSON logs via `tracing-subscriber`, with log levels
//! configurable per component.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::HubwatchMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
