//! Tagged-value decoding.
//!
//! Schema-encoded records carry union-typed fields as single-entry
//! mappings `{"<type>": payload}`; binary fields may also arrive as raw
//! bytes. `decode` recognises both shapes and turns them into plain
//! values. Anything else is reported as "not decodable here" and left to
//! the walker.

use crate::value::RecordValue;
use std::fmt;
use tracing::debug;

/// Type tags the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int,
    Long,
    Float,
    Double,
    String,
    Boolean,
    /// Union branch whose payload is UTF-8 text, possibly JSON.
    Bytes,
    /// Implicit tag of a raw byte payload that is not wrapped in a union.
    Buffer,
}

impl TypeTag {
    /// Resolve a union branch name. `bool` is accepted as an alias of
    /// `boolean`; `buffer` is never a textual tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "int" => Some(TypeTag::Int),
            "long" => Some(TypeTag::Long),
            "float" => Some(TypeTag::Float),
            "double" => Some(TypeTag::Double),
            "string" => Some(TypeTag::String),
            "boolean" | "bool" => Some(TypeTag::Boolean),
            "bytes" => Some(TypeTag::Bytes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Int => "int",
            TypeTag::Long => "long",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::String => "string",
            TypeTag::Boolean => "boolean",
            TypeTag::Bytes => "bytes",
            TypeTag::Buffer => "buffer",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leaf the decoder recognised, with its native value.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLeaf {
    pub tag: TypeTag,
    pub value: RecordValue,
}

/// Outcome of a best-effort structured parse.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedText {
    /// The text was valid JSON.
    Structured(RecordValue),
    /// The text did not parse and is kept verbatim.
    Text(String),
}

impl ParsedText {
    pub fn into_value(self) -> RecordValue {
        match self {
            ParsedText::Structured(v) => v,
            ParsedText::Text(s) => RecordValue::Str(s),
        }
    }
}

/// Parse `text` as JSON, falling back to the text itself.
pub fn parse_text(text: String) -> ParsedText {
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => ParsedText::Structured(json.into()),
        Err(e) => {
            debug!("Failed to parse payload, keeping string: {e}");
            ParsedText::Text(text)
        }
    }
}

/// Decode one field value.
///
/// Returns `None` when the value is neither a raw byte payload nor a
/// single-entry union with a recognised tag.
pub fn decode(value: &RecordValue) -> Option<DecodedLeaf> {
    match value {
        RecordValue::Binary(bytes) => Some(DecodedLeaf {
            tag: TypeTag::Buffer,
            value: decode_utf8(bytes),
        }),
        RecordValue::Mapping(fields) if fields.len() == 1 => {
            let (tag, payload) = fields.first()?;
            let tag = TypeTag::from_tag(tag)?;
            let value = match tag {
                TypeTag::Bytes => decode_bytes_payload(payload),
                _ => payload.clone(),
            };
            Some(DecodedLeaf { tag, value })
        }
        _ => None,
    }
}

fn decode_utf8(bytes: &[u8]) -> RecordValue {
    parse_text(String::from_utf8_lossy(bytes).into_owned()).into_value()
}

/// A `bytes` branch normally holds raw bytes, but JSON-encoded streams
/// carry it as a string. Payloads that are already structured pass through.
fn decode_bytes_payload(payload: &RecordValue) -> RecordValue {
    match payload {
        RecordValue::Binary(bytes) => decode_utf8(bytes),
        RecordValue::Str(text) => parse_text(text.clone()).into_value(),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_tags_pass_payload_through() {
        let cases = [
            ("int", RecordValue::Int(5)),
            ("long", RecordValue::Int(42)),
            ("float", RecordValue::Float(1.5)),
            ("double", RecordValue::Float(-0.25)),
            ("string", RecordValue::from("alice")),
            ("boolean", RecordValue::Bool(true)),
            ("bool", RecordValue::Bool(false)),
        ];
        for (tag, payload) in cases {
            let leaf = decode(&RecordValue::tagged(tag, payload.clone())).unwrap();
            assert_eq!(leaf.value, payload, "tag {tag}");
        }
    }

    #[test]
    fn string_tag_does_not_parse_json() {
        let leaf = decode(&RecordValue::tagged("string", "{\"a\":1}")).unwrap();
        assert_eq!(leaf.value, RecordValue::from("{\"a\":1}"));
    }

    #[test]
    fn decoding_is_idempotent_on_native_values() {
        let leaf = decode(&RecordValue::tagged("int", 5)).unwrap();
        assert_eq!(leaf.value, RecordValue::Int(5));
        assert!(decode(&leaf.value).is_none());
    }

    #[test]
    fn bytes_tag_parses_structured_text() {
        let v = RecordValue::tagged("bytes", RecordValue::binary(br#"{"temp": 21.5}"#.to_vec()));
        let leaf = decode(&v).unwrap();
        assert_eq!(leaf.tag, TypeTag::Bytes);
        assert_eq!(leaf.value, RecordValue::from(json!({"temp": 21.5})));
    }

    #[test]
    fn bytes_tag_keeps_unparseable_text() {
        let v = RecordValue::tagged("bytes", RecordValue::binary(b"not json".to_vec()));
        assert_eq!(decode(&v).unwrap().value, RecordValue::from("not json"));
    }

    #[test]
    fn bytes_tag_accepts_string_payload() {
        let v = RecordValue::tagged("bytes", "[1,2]");
        assert_eq!(decode(&v).unwrap().value, RecordValue::from(json!([1, 2])));
    }

    #[test]
    fn raw_binary_is_buffer() {
        let leaf = decode(&RecordValue::binary(b"hello".to_vec())).unwrap();
        assert_eq!(leaf.tag, TypeTag::Buffer);
        assert_eq!(leaf.value, RecordValue::from("hello"));

        let leaf = decode(&RecordValue::binary(br#"{"k":"v"}"#.to_vec())).unwrap();
        assert_eq!(leaf.value, RecordValue::from(json!({"k": "v"})));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let leaf = decode(&RecordValue::binary(vec![b'a', 0xff, b'b'])).unwrap();
        assert_eq!(leaf.value, RecordValue::from("a\u{fffd}b"));
    }

    #[test]
    fn empty_binary_decodes_to_empty_string() {
        let leaf = decode(&RecordValue::binary(Vec::new())).unwrap();
        assert_eq!(leaf.value, RecordValue::from(""));
    }

    #[test]
    fn unknown_shapes_are_not_decodable() {
        assert!(decode(&RecordValue::tagged("record", 1)).is_none());
        assert!(decode(&RecordValue::tagged("buffer", 1)).is_none());
        assert!(decode(&RecordValue::from("plain")).is_none());
        assert!(decode(&RecordValue::Int(3)).is_none());
        assert!(decode(&RecordValue::Null).is_none());
        assert!(decode(&RecordValue::mapping(Vec::<(&str, RecordValue)>::new())).is_none());
        let two = RecordValue::mapping([("int", 1), ("long", 2)]);
        assert!(decode(&two).is_none());
    }

    #[test]
    fn parse_text_fallback() {
        assert_eq!(parse_text("7".into()), ParsedText::Structured(RecordValue::Int(7)));
        assert_eq!(parse_text("{oops".into()), ParsedText::Text("{oops".into()));
    }
}
