//! File-backed event source.
//!
//! Replays a directory in which every file is one partition, named after
//! its file stem:
//!
//! - `*.jsonl`: one JSON record per line. A line that is a full event
//!   envelope (`body` + `sequenceNumber`) is taken as-is; any other line
//!   is the event body.
//! - `*.json`: a JSON array of records (or a single record).
//! - `*.avro`: an Avro object container file. Union values become
//!   single-key `{"<type>": value}` mappings and `bytes`/`fixed` become raw
//!   binary, the shape a schema-aware log client delivers. Files in the
//!   capture layout (`SequenceNumber`, `Offset`, `EnqueuedTimeUtc`,
//!   `Properties`, `Body`) map onto the event envelope.

use crate::source::{next_batch, EventSource};
use apache_avro::types::Value;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hubwatch_core::{ConsumerError, Fields, ReceivedEvent, RecordValue};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Supported file layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    JsonLines,
    Json,
    Avro,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "jsonl" | "ndjson" => Some(FileFormat::JsonLines),
            "json" => Some(FileFormat::Json),
            "avro" => Some(FileFormat::Avro),
            _ => None,
        }
    }
}

/// Read every event in one file, ordered by sequence number.
///
/// Fails if two events share a sequence number, since resuming after a
/// checkpoint at that number would skip one of them.
pub fn load_file(path: &Path) -> Result<Vec<ReceivedEvent>, ConsumerError> {
    let format = FileFormat::from_path(path).ok_or_else(|| ConsumerError::Source {
        reason: format!("unsupported file type: {}", path.display()),
    })?;
    let mut events = match format {
        FileFormat::JsonLines => load_json_lines(path)?,
        FileFormat::Json => load_json(path)?,
        FileFormat::Avro => load_avro(path)?,
    };
    events.sort_by_key(|e| e.sequence_number);
    if let Some(dup) = events
        .windows(2)
        .find(|w| w[0].sequence_number == w[1].sequence_number)
    {
        return Err(ConsumerError::Source {
            reason: format!(
                "duplicate sequence number {} in {}",
                dup[0].sequence_number,
                path.display()
            ),
        });
    }
    Ok(events)
}

/// Assigns sequence numbers to plain JSON records. Envelopes keep their
/// own number; plain records continue after the highest number seen so far.
#[derive(Default)]
struct Sequencer {
    next: i64,
}

impl Sequencer {
    fn event(&mut self, json: serde_json::Value, offset: i64) -> Result<ReceivedEvent, ConsumerError> {
        let event = event_from_json(json, offset, self.next)?;
        self.next = self.next.max(event.sequence_number + 1);
        Ok(event)
    }
}

fn load_json_lines(path: &Path) -> Result<Vec<ReceivedEvent>, ConsumerError> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut seq = Sequencer::default();
    let mut events = Vec::new();
    let mut offset = 0i64;
    for line in reader.lines() {
        let line = line?;
        let len = line.len() as i64 + 1;
        if !line.trim().is_empty() {
            let json: serde_json::Value = serde_json::from_str(&line)?;
            events.push(seq.event(json, offset)?);
        }
        offset += len;
    }
    Ok(events)
}

fn load_json(path: &Path) -> Result<Vec<ReceivedEvent>, ConsumerError> {
    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(path)?)?;
    let items = match json {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };
    let mut seq = Sequencer::default();
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| seq.event(item, idx as i64))
        .collect()
}

/// An envelope without an `offset` takes the record's position in the file.
fn event_from_json(mut json: serde_json::Value, offset: i64, seq: i64) -> Result<ReceivedEvent, ConsumerError> {
    let is_envelope = json
        .as_object()
        .is_some_and(|o| o.contains_key("body") && o.contains_key("sequenceNumber"));
    if !is_envelope {
        return Ok(ReceivedEvent::new(json.into(), offset, seq));
    }
    if let Some(obj) = json.as_object_mut() {
        obj.entry("offset").or_insert_with(|| offset.into());
    }
    Ok(serde_json::from_value(json)?)
}

fn load_avro(path: &Path) -> Result<Vec<ReceivedEvent>, ConsumerError> {
    let file = BufReader::new(std::fs::File::open(path)?);
    let reader = apache_avro::Reader::new(file).map_err(|e| ConsumerError::Avro(e.to_string()))?;

    let mut events = Vec::new();
    for (idx, item) in reader.enumerate() {
        let value = item.map_err(|e| ConsumerError::Avro(e.to_string()))?;
        let idx = idx as i64;
        let event = capture_event(&value)
            .unwrap_or_else(|| ReceivedEvent::new(avro_to_record(&value), idx, idx));
        events.push(event);
    }
    Ok(events)
}

/// Map a record in the capture layout onto the event envelope.
fn capture_event(value: &Value) -> Option<ReceivedEvent> {
    let Value::Record(fields) = value else {
        return None;
    };
    let field = |name: &str| fields.iter().find(|(k, _)| k == name).map(|(_, v)| unwrap_union(v));

    let sequence_number = match field("SequenceNumber")? {
        Value::Long(n) => *n,
        Value::Int(n) => i64::from(*n),
        _ => return None,
    };
    let offset = match field("Offset")? {
        Value::String(s) => s.parse().ok()?,
        Value::Long(n) => *n,
        _ => return None,
    };
    let body = avro_to_record(field("Body")?);

    let mut event = ReceivedEvent::new(body, offset, sequence_number);
    if let Some(RecordValue::Mapping(props)) = field("Properties").map(avro_to_record) {
        event = event.with_properties(props);
    }
    if let Some(Value::String(at)) = field("EnqueuedTimeUtc") {
        if let Some(at) = parse_enqueued_time(at) {
            event = event.with_enqueued_time(at);
        }
    }
    Some(event)
}

fn unwrap_union(value: &Value) -> &Value {
    match value {
        Value::Union(_, inner) => inner,
        other => other,
    }
}

/// Capture files write `M/d/yyyy h:mm:ss AM` timestamps; RFC 3339 is
/// accepted as well.
fn parse_enqueued_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%m/%d/%Y %I:%M:%S %p")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Name of the union branch an Avro value was written under.
fn branch_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Boolean(_) => "boolean",
        Value::Int(_) | Value::Date(_) | Value::TimeMillis(_) => "int",
        Value::Long(_)
        | Value::TimeMicros(_)
        | Value::TimestampMillis(_)
        | Value::TimestampMicros(_)
        | Value::TimestampNanos(_)
        | Value::LocalTimestampMillis(_)
        | Value::LocalTimestampMicros(_)
        | Value::LocalTimestampNanos(_) => "long",
        Value::Float(_) => "float",
        Value::Double(_) => "double",
        Value::Bytes(_) => "bytes",
        Value::String(_) | Value::Uuid(_) | Value::BigDecimal(_) => "string",
        Value::Fixed(..) | Value::Duration(_) => "fixed",
        Value::Decimal(_) => "decimal",
        Value::Enum(..) => "enum",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Record(_) => "record",
        Value::Union(_, inner) => branch_name(inner),
    }
}

/// Convert an Avro value into a record value, keeping unions tagged.
pub fn avro_to_record(value: &Value) -> RecordValue {
    match value {
        Value::Null | Value::Duration(_) => RecordValue::Null,
        Value::Boolean(b) => RecordValue::Bool(*b),
        Value::Int(i) | Value::Date(i) | Value::TimeMillis(i) => RecordValue::Int(i64::from(*i)),
        Value::Long(l)
        | Value::TimeMicros(l)
        | Value::TimestampMillis(l)
        | Value::TimestampMicros(l)
        | Value::TimestampNanos(l)
        | Value::LocalTimestampMillis(l)
        | Value::LocalTimestampMicros(l)
        | Value::LocalTimestampNanos(l) => RecordValue::Int(*l),
        Value::Float(f) => RecordValue::Float(f64::from(*f)),
        Value::Double(d) => RecordValue::Float(*d),
        Value::Bytes(b) | Value::Fixed(_, b) => RecordValue::Binary(b.clone()),
        Value::Decimal(d) => {
            let bytes: Vec<u8> = d.try_into().unwrap_or_default();
            RecordValue::Binary(bytes)
        }
        Value::BigDecimal(d) => RecordValue::Str(d.to_string()),
        Value::Uuid(u) => RecordValue::Str(u.to_string()),
        Value::String(s) | Value::Enum(_, s) => RecordValue::Str(s.clone()),
        Value::Union(_, inner) => match inner.as_ref() {
            Value::Null => RecordValue::Null,
            other => RecordValue::tagged(branch_name(other), avro_to_record(other)),
        },
        Value::Array(items) => RecordValue::Sequence(items.iter().map(avro_to_record).collect()),
        Value::Map(entries) => {
            // Avro maps are unordered; sort for stable output.
            let sorted: BTreeMap<_, _> = entries.iter().collect();
            RecordValue::Mapping(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), avro_to_record(v)))
                    .collect::<Fields>(),
            )
        }
        Value::Record(fields) => RecordValue::Mapping(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), avro_to_record(v)))
                .collect(),
        ),
    }
}

// ─── Directory source ─────────────────────────────────────────────────────────

/// Replays a directory of partition files. Files are read once at open.
pub struct FileSource {
    name: String,
    partitions: BTreeMap<String, Vec<ReceivedEvent>>,
}

impl FileSource {
    /// Load every supported file in `dir`. Other files are ignored.
    pub fn open(name: impl Into<String>, dir: &Path) -> Result<Self, ConsumerError> {
        let name = name.into();
        let mut partitions = BTreeMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || FileFormat::from_path(&path).is_none() {
                debug!("skipping {}", path.display());
                continue;
            }
            let Some(partition_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let events = load_file(&path)?;
            debug!("partition '{partition_id}': {} events from {}", events.len(), path.display());
            partitions.insert(partition_id.to_string(), events);
        }

        if partitions.is_empty() {
            return Err(ConsumerError::Source {
                reason: format!("no partition files in {}", dir.display()),
            });
        }
        info!("FileSource '{name}' opened with {} partitions", partitions.len());
        Ok(Self { name, partitions })
    }

    fn partition(&self, partition_id: &str) -> Result<&[ReceivedEvent], ConsumerError> {
        self.partitions
            .get(partition_id)
            .map(Vec::as_slice)
            .ok_or_else(|| ConsumerError::PartitionNotFound {
                partition_id: partition_id.to_string(),
            })
    }
}

#[async_trait]
impl EventSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn partition_ids(&self) -> Result<Vec<String>, ConsumerError> {
        Ok(self.partitions.keys().cloned().collect())
    }

    async fn receive_batch(
        &self,
        partition_id: &str,
        after: Option<i64>,
        max: usize,
    ) -> Result<Vec<ReceivedEvent>, ConsumerError> {
        Ok(next_batch(self.partition(partition_id)?, after, max))
    }

    async fn last_sequence_number(&self, partition_id: &str) -> Result<Option<i64>, ConsumerError> {
        Ok(self.partition(partition_id)?.last().map(|e| e.sequence_number))
    }
}
