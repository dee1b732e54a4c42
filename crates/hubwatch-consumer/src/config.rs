//! Consumer configuration.

use crate::client::SubscriptionOptions;
use hubwatch_core::{ConsumerError, WatchList, DEFAULT_MAX_DEPTH};
use hubwatch_observability::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a partition without a checkpoint starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    /// From the first retained event.
    #[default]
    Earliest,
    /// Only events enqueued after the subscription starts.
    Latest,
}

/// Top-level consumer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Event hub name; also the first level of the checkpoint layout.
    #[serde(default)]
    pub event_hub: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Directory of partition files to consume.
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
    /// Directory the checkpoint blobs are written to.
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
    /// Values and field names every logged record must contain.
    #[serde(default)]
    pub match_values: Vec<String>,
    /// Maximum events per delivered batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// How long an idle partition waits before delivering an empty batch
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default)]
    pub start_position: StartPosition,
    /// Record nesting limit
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// How long the subscription stays open
    #[serde(default = "default_run_for_secs")]
    pub run_for_secs: u64,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_consumer_group() -> String { "$Default".into() }
fn default_max_batch_size() -> usize { 10 }
fn default_max_wait_ms() -> u64 { 1_000 }
fn default_max_depth() -> usize { DEFAULT_MAX_DEPTH }
fn default_run_for_secs() -> u64 { 15 * 60 }

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            event_hub: String::new(),
            consumer_group: default_consumer_group(),
            source_dir: None,
            checkpoint_dir: None,
            match_values: Vec::new(),
            max_batch_size: default_max_batch_size(),
            max_wait_ms: default_max_wait_ms(),
            start_position: StartPosition::default(),
            max_depth: default_max_depth(),
            run_for_secs: default_run_for_secs(),
            log: LogConfig::default(),
        }
    }
}

impl ConsumerConfig {
    /// Load a YAML config file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConsumerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConsumerError> {
        serde_yaml::from_str(text).map_err(|e| ConsumerError::Config(e.to_string()))
    }

    /// Check that every required setting is present.
    pub fn validate(&self) -> Result<(), ConsumerError> {
        let mut missing = Vec::new();
        if self.event_hub.is_empty() {
            missing.push("event_hub");
        }
        if self.consumer_group.is_empty() {
            missing.push("consumer_group");
        }
        if self.source_dir.is_none() {
            missing.push("source_dir");
        }
        if self.checkpoint_dir.is_none() {
            missing.push("checkpoint_dir");
        }
        if !missing.is_empty() {
            return Err(ConsumerError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        if self.max_batch_size == 0 {
            return Err(ConsumerError::Config("max_batch_size must be at least 1".into()));
        }
        if self.max_depth == 0 {
            return Err(ConsumerError::Config("max_depth must be at least 1".into()));
        }
        Ok(())
    }

    /// The source and checkpoint directories.
    pub fn directories(&self) -> Result<(&Path, &Path), ConsumerError> {
        match (self.source_dir.as_deref(), self.checkpoint_dir.as_deref()) {
            (Some(source), Some(checkpoints)) => Ok((source, checkpoints)),
            (None, _) => Err(ConsumerError::Config("source_dir is not set".into())),
            (_, None) => Err(ConsumerError::Config("checkpoint_dir is not set".into())),
        }
    }

    pub fn watch_list(&self) -> WatchList {
        WatchList::new(self.match_values.iter().cloned())
    }

    pub fn run_for(&self) -> Duration {
        Duration::from_secs(self.run_for_secs)
    }

    pub fn subscription_options(&self) -> SubscriptionOptions {
        SubscriptionOptions {
            max_batch_size: self.max_batch_size,
            max_wait: Duration::from_millis(self.max_wait_ms),
            start_position: self.start_position,
            ..SubscriptionOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_defaults() {
        let config = ConsumerConfig::from_yaml(
            "event_hub: telemetry\nsource_dir: ./capture\ncheckpoint_dir: ./checkpoints\n",
        )
        .unwrap();
        assert_eq!(config.consumer_group, "$Default");
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.run_for(), Duration::from_secs(900));
        assert_eq!(config.start_position, StartPosition::Earliest);
        assert!(config.watch_list().is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn yaml_full() {
        let config = ConsumerConfig::from_yaml(
            r#"
event_hub: telemetry
consumer_group: audit
source_dir: /data/capture
checkpoint_dir: /data/checkpoints
match_values: ["alice", "5", "count"]
max_batch_size: 50
max_wait_ms: 250
start_position: latest
max_depth: 16
run_for_secs: 30
log:
  level: debug
  json: true
"#,
        )
        .unwrap();
        assert_eq!(config.watch_list(), WatchList::new(["alice", "5", "count"]));
        assert_eq!(config.start_position, StartPosition::Latest);
        assert!(config.log.json);

        let opts = config.subscription_options();
        assert_eq!(opts.max_batch_size, 50);
        assert_eq!(opts.max_wait, Duration::from_millis(250));
    }

    #[test]
    fn validate_reports_missing_settings() {
        let err = ConsumerConfig::default().validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("event_hub"));
        assert!(msg.contains("source_dir"));
        assert!(msg.contains("checkpoint_dir"));
        assert!(!msg.contains("consumer_group"));
    }

    #[test]
    fn directories_require_both_settings() {
        let mut config = ConsumerConfig {
            source_dir: Some("./capture".into()),
            ..ConsumerConfig::default()
        };
        let err = config.directories().unwrap_err();
        assert_eq!(err.code(), "ConfigError");
        assert!(err.to_string().contains("checkpoint_dir"));

        config.checkpoint_dir = Some("./checkpoints".into());
        let (source, checkpoints) = config.directories().unwrap();
        assert_eq!(source, Path::new("./capture"));
        assert_eq!(checkpoints, Path::new("./checkpoints"));
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = ConsumerConfig::from_yaml("max_batch_size: [").unwrap_err();
        assert_eq!(err.code(), "ConfigError");
    }
}
