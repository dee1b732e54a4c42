//! The dynamic record value model.
//!
//! Records arrive from the message log as untyped, arbitrarily nested
//! structures. Every decoder, walker and sink in Hubwatch works on
//! `RecordValue`, so consumers never deal with the upstream client's own
//! representation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field map of a record, in the order the fields were delivered.
pub type Fields = IndexMap<String, RecordValue>;

/// A single value inside a delivered record.
///
/// Serializes as plain JSON (no variant tags), so a decoded record prints
/// exactly like the structure it mirrors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Sequence(Vec<RecordValue>),
    Mapping(Fields),
    /// Raw byte payload. Never produced from JSON input.
    Binary(Vec<u8>),
}

impl RecordValue {
    /// Wrap raw bytes.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        RecordValue::Binary(bytes.into())
    }

    /// Build a mapping from `(name, value)` pairs, keeping their order.
    pub fn mapping<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<RecordValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        RecordValue::Mapping(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// A single-entry mapping `{tag: payload}`, the schema encoding of a
    /// union-typed field.
    pub fn tagged(tag: impl Into<String>, payload: impl Into<RecordValue>) -> Self {
        let mut fields = Fields::with_capacity(1);
        fields.insert(tag.into(), payload.into());
        RecordValue::Mapping(fields)
    }

    /// Returns `true` if this value is logically null/absent.
    pub fn is_null(&self) -> bool {
        matches!(self, RecordValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Fields> {
        match self {
            RecordValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Number of children if this is a mapping or sequence.
    pub fn child_count(&self) -> Option<usize> {
        match self {
            RecordValue::Mapping(m) => Some(m.len()),
            RecordValue::Sequence(s) => Some(s.len()),
            _ => None,
        }
    }

    /// The primitive form compared against watch-list entries.
    ///
    /// Strings match verbatim, numbers and booleans by their printed form,
    /// structures by their compact JSON. `Null` and raw bytes never match.
    pub fn match_key(&self) -> Option<String> {
        match self {
            RecordValue::Null | RecordValue::Binary(_) => None,
            RecordValue::Bool(b) => Some(b.to_string()),
            RecordValue::Int(i) => Some(i.to_string()),
            RecordValue::Float(f) => Some(format_float(*f)),
            RecordValue::Str(s) => Some(s.clone()),
            RecordValue::Sequence(_) | RecordValue::Mapping(_) => {
                serde_json::to_string(self).ok()
            }
        }
    }

    /// Convert into a `serde_json::Value`. Non-finite floats become `null`,
    /// raw bytes become an array of numbers.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            RecordValue::Null => J::Null,
            RecordValue::Bool(b) => J::Bool(*b),
            RecordValue::Int(i) => J::from(*i),
            RecordValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(J::Number)
                .unwrap_or(J::Null),
            RecordValue::Str(s) => J::String(s.clone()),
            RecordValue::Binary(b) => J::Array(b.iter().map(|x| J::from(*x)).collect()),
            RecordValue::Sequence(items) => J::Array(items.iter().map(|v| v.to_json()).collect()),
            RecordValue::Mapping(fields) => J::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Pretty JSON with four-space indentation, as written to the match log.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Prints a float the way the upstream producers stringify numbers:
/// shortest round-trip digits, no fraction on integral values (`5.0` →
/// `"5"`), and exponent form outside `[1e-6, 1e21)` (`1e21` → `"1e+21"`).
fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    if f == 0.0 {
        return "0".into();
    }
    if (1e-6..1e21).contains(&f.abs()) {
        return format!("{f}");
    }
    let exp = format!("{f:e}");
    match exp.split_once('e') {
        Some((mantissa, e)) if !e.starts_with('-') => format!("{mantissa}e+{e}"),
        _ => exp,
    }
}

/// Numbers that do not fit an `i64` (large unsigned values included) become
/// `Float`, so they match by their float form (`u64::MAX` →
/// `"18446744073709552000"`).
impl From<serde_json::Value> for RecordValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match v {
            J::Null => RecordValue::Null,
            J::Bool(b) => RecordValue::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => RecordValue::Int(i),
                None => RecordValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => RecordValue::Str(s),
            J::Array(items) => RecordValue::Sequence(items.into_iter().map(Into::into).collect()),
            J::Object(map) => RecordValue::Mapping(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::Str(s.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(s: String) -> Self {
        RecordValue::Str(s)
    }
}

impl From<i64> for RecordValue {
    fn from(i: i64) -> Self {
        RecordValue::Int(i)
    }
}

impl From<i32> for RecordValue {
    fn from(i: i32) -> Self {
        RecordValue::Int(i64::from(i))
    }
}

impl From<f64> for RecordValue {
    fn from(f: f64) -> Self {
        RecordValue::Float(f)
    }
}

impl From<bool> for RecordValue {
    fn from(b: bool) -> Self {
        RecordValue::Bool(b)
    }
}

impl From<Fields> for RecordValue {
    fn from(fields: Fields) -> Self {
        RecordValue::Mapping(fields)
    }
}

impl From<Vec<RecordValue>> for RecordValue {
    fn from(items: Vec<RecordValue>) -> Self {
        RecordValue::Sequence(items)
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::Null => write!(f, "null"),
            RecordValue::Bool(v) => write!(f, "{v}"),
            RecordValue::Int(v) => write!(f, "{v}"),
            RecordValue::Float(v) => write!(f, "{}", format_float(*v)),
            RecordValue::Str(s) => write!(f, "{s}"),
            RecordValue::Binary(b) => write!(f, "0x{}", hex::encode(b)),
            RecordValue::Sequence(v) => {
                let parts: Vec<_> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            RecordValue::Mapping(fields) => {
                let parts: Vec<_> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}
