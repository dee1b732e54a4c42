//! Golden decode tests.
//!
//! Each fixture is a record as a schema-aware client delivers it (unions
//! wrapped as `{"<type>": payload}`), the watch-list it is checked
//! against, and the decoded record plus leftover entries it must produce.

use hubwatch_core::{walk, RecordValue, Walker, WatchList};
use serde_json::json;

// ─── Helpers ──────────────────────────────────────────────────────────────────

struct Fixture {
    name: &'static str,
    record: RecordValue,
    watch: WatchList,
    expected: serde_json::Value,
    remaining: &'static [&'static str],
}

fn check(f: Fixture) {
    let walked = walk(&f.record, f.watch).unwrap_or_else(|e| panic!("{}: {e}", f.name));
    assert_eq!(walked.result.to_json(), f.expected, "{}: decoded record", f.name);
    assert_eq!(
        walked.remaining,
        WatchList::new(f.remaining.iter().copied()),
        "{}: remaining watch-list",
        f.name
    );
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn full_match_scenario() {
    check(Fixture {
        name: "alice",
        record: json!({"id": {"long": 42}, "name": {"string": "alice"}}).into(),
        watch: WatchList::new(["alice"]),
        expected: json!({"id": 42, "name": "alice"}),
        remaining: &[],
    });
}

#[test]
fn unmatched_scenario() {
    check(Fixture {
        name: "bob",
        record: json!({"id": {"long": 42}, "name": {"string": "alice"}}).into(),
        watch: WatchList::new(["bob"]),
        expected: json!({"id": 42, "name": "alice"}),
        remaining: &["bob"],
    });
}

#[test]
fn telemetry_envelope_with_binary_body() {
    let mut props = hubwatch_core::Fields::new();
    props.insert("source".into(), RecordValue::tagged("string", "gateway-7"));
    props.insert("retries".into(), RecordValue::tagged("int", 0));

    let record = RecordValue::mapping([
        ("SequenceNumber", RecordValue::tagged("long", 1001)),
        ("Properties", RecordValue::Mapping(props)),
        (
            "Body",
            RecordValue::tagged(
                "bytes",
                RecordValue::binary(br#"{"deviceId":"pump-1","temperature":71.25}"#.to_vec()),
            ),
        ),
        ("Extra", RecordValue::Null),
    ]);

    check(Fixture {
        name: "envelope",
        record,
        watch: WatchList::new(["gateway-7", "0", "retries", "Body", "pump-1"]),
        expected: json!({
            "SequenceNumber": 1001,
            "Properties": {"source": "gateway-7", "retries": 0},
            "Body": {"deviceId": "pump-1", "temperature": 71.25},
            "Extra": null
        }),
        // Parsed bodies are compared whole, never field by field.
        remaining: &["pump-1"],
    });
}

#[test]
fn unknown_union_branches_are_walked_into() {
    check(Fixture {
        name: "record-branch",
        record: json!({"location": {"com.example.Point": {"x": {"double": 1.5}, "y": {"double": 2.0}}}}).into(),
        watch: WatchList::new(["1.5", "2", "y"]),
        expected: json!({"location": {"com.example.Point": {"x": 1.5, "y": 2.0}}}),
        remaining: &[],
    });
}

#[test]
fn deep_records_fail_past_the_limit() {
    let mut record = RecordValue::tagged("int", 1);
    for _ in 0..10 {
        record = RecordValue::mapping([("n", record)]);
    }
    assert!(Walker::new(10).walk(&record, WatchList::default()).is_ok());
    assert!(Walker::new(9).walk(&record, WatchList::default()).is_err());
}
