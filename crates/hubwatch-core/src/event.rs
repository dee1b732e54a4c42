//! Events as delivered by the message log.

use crate::value::{Fields, RecordValue};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One event received from a partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedEvent {
    /// The schema-encoded payload.
    pub body: RecordValue,
    /// Application properties attached by the producer.
    #[serde(default, skip_serializing_if = "Fields::is_empty")]
    pub properties: Fields,
    /// Position of the event within its partition.
    pub offset: i64,
    /// Monotonic sequence number within the partition.
    pub sequence_number: i64,
    /// When the log accepted the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
}

impl ReceivedEvent {
    pub fn new(body: RecordValue, offset: i64, sequence_number: i64) -> Self {
        Self {
            body,
            properties: Fields::new(),
            offset,
            sequence_number,
            enqueued_time: None,
            partition_key: None,
        }
    }

    pub fn with_properties(mut self, properties: Fields) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_enqueued_time(mut self, at: DateTime<Utc>) -> Self {
        self.enqueued_time = Some(at);
        self
    }

    /// The record handed to the walker: the whole event, body included.
    /// Absent optional metadata is omitted.
    pub fn as_record(&self) -> RecordValue {
        let mut fields = Fields::with_capacity(6);
        fields.insert("body".into(), self.body.clone());
        if !self.properties.is_empty() {
            fields.insert("properties".into(), RecordValue::Mapping(self.properties.clone()));
        }
        fields.insert("offset".into(), RecordValue::Int(self.offset));
        fields.insert("sequenceNumber".into(), RecordValue::Int(self.sequence_number));
        if let Some(at) = self.enqueued_time {
            fields.insert(
                "enqueuedTimeUtc".into(),
                RecordValue::Str(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        if let Some(key) = &self.partition_key {
            fields.insert("partitionKey".into(), RecordValue::Str(key.clone()));
        }
        RecordValue::Mapping(fields)
    }
}
