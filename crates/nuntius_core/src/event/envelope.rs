use std::fmt;

use phf::phf_map;
use serde_json::Value;

use crate::{ChangeEvent, FieldMap, Image, Operation, field_map_from_json};

pub const HEARTBEAT_SCHEMA: &str = "io.debezium.connector.common.Heartbeat";

static OPERATION_CODES: phf::Map<&'static str, Operation> = phf_map! {
    "c" => Operation::Create,
    "r" => Operation::Read,
    "u" => Operation::Update,
    "d" => Operation::Delete,
};

/// Result of parsing one envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum Parsed {
    Event(ChangeEvent),
    Skip(SkipReason),
}

/// Envelopes that are well formed but carry nothing to dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Heartbeat,
    Snapshot,
    Read,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Heartbeat => write!(f, "heartbeat"),
            SkipReason::Snapshot => write!(f, "snapshot"),
            SkipReason::Read => write!(f, "read"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("change envelope has no `{0}`")]
    MissingKey(&'static str),
    #[error("unknown operation code `{0}`")]
    UnknownOperation(String),
    #[error("invalid images for {operation} on `{table}`: {reason}")]
    InvalidImages {
        operation: Operation,
        table: String,
        reason: &'static str,
    },
    #[error("{image} image must be an object or null, got {found}")]
    InvalidImageShape { image: Image, found: &'static str },
    #[error("change envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Validate a raw change envelope and normalize it into a [`ChangeEvent`].
///
/// Keys are checked in a fixed order: `payload`, `payload.source`, `payload.op`,
/// `payload.after`, `payload.before` and `payload.source.table`. Heartbeats are
/// recognized right after the payload check and snapshot records right after
/// the source check, so both are skipped even when later keys are missing.
pub fn parse_envelope(envelope: &Value) -> Result<Parsed, EnvelopeError> {
    let payload = present(envelope.get("payload"))
        .and_then(Value::as_object)
        .ok_or(EnvelopeError::MissingKey("payload"))?;

    let schema_name = envelope
        .get("schema")
        .and_then(|schema| schema.get("name"))
        .and_then(Value::as_str);
    if schema_name == Some(HEARTBEAT_SCHEMA) {
        return Ok(Parsed::Skip(SkipReason::Heartbeat));
    }

    let source = present(payload.get("source")).ok_or(EnvelopeError::MissingKey("payload.source"))?;

    if source.get("snapshot").and_then(Value::as_str) == Some("true") {
        return Ok(Parsed::Skip(SkipReason::Snapshot));
    }

    let code = present(payload.get("op")).ok_or(EnvelopeError::MissingKey("payload.op"))?;
    let after = payload
        .get("after")
        .ok_or(EnvelopeError::MissingKey("payload.after"))?;
    let before = payload
        .get("before")
        .ok_or(EnvelopeError::MissingKey("payload.before"))?;
    let table = present(source.get("table"))
        .ok_or(EnvelopeError::MissingKey("payload.source.table"))?;

    let operation = OPERATION_CODES
        .get(display_text(code).as_str())
        .copied()
        .ok_or_else(|| EnvelopeError::UnknownOperation(display_text(code)))?;
    let table = display_text(table);

    let before = image(Image::Before, before)?;
    let after = image(Image::After, after)?;
    check_images(operation, &table, before.as_ref(), after.as_ref())?;

    Ok(Parsed::Event(ChangeEvent {
        table,
        operation,
        before,
        after,
        ts_ms: payload.get("ts_ms").and_then(Value::as_i64),
    }))
}

/// [`parse_envelope`] over raw bytes.
pub fn parse_envelope_slice(bytes: &[u8]) -> Result<Parsed, EnvelopeError> {
    let envelope: Value = serde_json::from_slice(bytes)?;
    parse_envelope(&envelope)
}

/// A record that can be parsed as a change envelope: a decoded JSON value, or
/// the raw bytes of one as read off the feed.
pub trait RawEnvelope {
    fn decode(&self) -> Result<Parsed, EnvelopeError>;
}

impl RawEnvelope for Value {
    fn decode(&self) -> Result<Parsed, EnvelopeError> {
        parse_envelope(self)
    }
}

impl RawEnvelope for [u8] {
    fn decode(&self) -> Result<Parsed, EnvelopeError> {
        parse_envelope_slice(self)
    }
}

impl RawEnvelope for Vec<u8> {
    fn decode(&self) -> Result<Parsed, EnvelopeError> {
        parse_envelope_slice(self)
    }
}

impl RawEnvelope for str {
    fn decode(&self) -> Result<Parsed, EnvelopeError> {
        parse_envelope_slice(self.as_bytes())
    }
}

impl RawEnvelope for String {
    fn decode(&self) -> Result<Parsed, EnvelopeError> {
        parse_envelope_slice(self.as_bytes())
    }
}

/// Treats null, empty strings and empty objects as absent.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|value| match value {
        Value::Null => false,
        Value::Bool(v) => *v,
        Value::String(v) => !v.is_empty(),
        Value::Object(v) => !v.is_empty(),
        Value::Array(v) => !v.is_empty(),
        Value::Number(_) => true,
    })
}

fn image(image: Image, value: &Value) -> Result<Option<FieldMap>, EnvelopeError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(object) => Ok(Some(field_map_from_json(object))),
        other => Err(EnvelopeError::InvalidImageShape {
            image,
            found: json_type_name(other),
        }),
    }
}

fn check_images(
    operation: Operation,
    table: &str,
    before: Option<&FieldMap>,
    after: Option<&FieldMap>,
) -> Result<(), EnvelopeError> {
    let reason = match (operation, before.is_some(), after.is_some()) {
        (Operation::Create, _, false) => Some("after image not provided"),
        (Operation::Create, true, _) => Some("before image provided"),
        (Operation::Update, _, false) => Some("after image not provided"),
        (Operation::Update, false, _) => Some("before image not provided"),
        (Operation::Delete, _, true) => Some("after image provided"),
        (Operation::Delete, false, _) => Some("before image not provided"),
        _ => None,
    };

    match reason {
        Some(reason) => Err(EnvelopeError::InvalidImages {
            operation,
            table: table.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Datatype;

    fn event(envelope: Value) -> ChangeEvent {
        match parse_envelope(&envelope).unwrap() {
            Parsed::Event(event) => event,
            Parsed::Skip(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn update_envelope() {
        let event = event(json!({
            "payload": {
                "op": "u",
                "before": {"id": 1, "name": "a"},
                "after": {"id": 1, "name": "b"},
                "source": {"table": "grp", "snapshot": "false"},
                "ts_ms": 1700000000000i64
            }
        }));

        assert_eq!(event.table, "grp");
        assert_eq!(event.operation, Operation::Update);
        assert_eq!(
            event.after().and_then(|after| after.get("name")),
            Some(&Datatype::Text("b".into()))
        );
        assert_eq!(event.ts_ms, Some(1700000000000));
    }

    #[test]
    fn update_without_before_is_malformed() {
        let result = parse_envelope(&json!({
            "payload": {"op": "u", "before": null, "after": {"id": 1}, "source": {"table": "t"}}
        }));
        assert!(matches!(
            result,
            Err(EnvelopeError::InvalidImages {
                operation: Operation::Update,
                ..
            })
        ));
    }

    #[test]
    fn create_with_before_is_malformed() {
        let result = parse_envelope(&json!({
            "payload": {"op": "c", "before": {"id": 1}, "after": {"id": 1}, "source": {"table": "t"}}
        }));
        assert!(matches!(result, Err(EnvelopeError::InvalidImages { .. })));
    }

    #[test]
    fn delete_envelope() {
        let event = event(json!({
            "payload": {"op": "d", "before": {"id": 4}, "after": null, "source": {"table": "t"}}
        }));
        assert_eq!(event.operation, Operation::Delete);
        assert!(event.after.is_none());
    }

    #[test]
    fn snapshot_is_skipped_for_every_operation() {
        for op in ["c", "r", "u", "d"] {
            let parsed = parse_envelope(&json!({
                "payload": {
                    "op": op,
                    "before": null,
                    "after": {"id": 1},
                    "source": {"table": "t", "snapshot": "true"}
                }
            }))
            .unwrap();
            assert_eq!(parsed, Parsed::Skip(SkipReason::Snapshot));
        }
    }

    #[test]
    fn heartbeat_is_skipped_before_other_checks() {
        let parsed = parse_envelope(&json!({
            "schema": {"name": HEARTBEAT_SCHEMA},
            "payload": {"ts_ms": 1}
        }))
        .unwrap();
        assert_eq!(parsed, Parsed::Skip(SkipReason::Heartbeat));
    }

    #[test]
    fn missing_keys_in_order() {
        let cases = [
            (json!({}), "payload"),
            (json!({"payload": {}}), "payload"),
            (json!({"payload": {"op": "c"}}), "payload.source"),
            (json!({"payload": {"source": {"table": "t"}}}), "payload.op"),
            (
                json!({"payload": {"op": "c", "before": null, "source": {"table": "t"}}}),
                "payload.after",
            ),
            (
                json!({"payload": {"op": "c", "after": {}, "source": {"table": "t"}}}),
                "payload.before",
            ),
            (
                json!({"payload": {"op": "c", "before": null, "after": {}, "source": {"db": "x"}}}),
                "payload.source.table",
            ),
        ];

        for (envelope, key) in cases {
            match parse_envelope(&envelope) {
                Err(EnvelopeError::MissingKey(missing)) => assert_eq!(missing, key),
                other => panic!("expected missing {key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_operation_code() {
        let result = parse_envelope(&json!({
            "payload": {"op": "t", "before": null, "after": null, "source": {"table": "t"}}
        }));
        assert!(matches!(result, Err(EnvelopeError::UnknownOperation(code)) if code == "t"));
    }

    #[test]
    fn reads_are_parsed() {
        let event = event(json!({
            "payload": {"op": "r", "before": null, "after": {"id": 1}, "source": {"table": "t"}}
        }));
        assert_eq!(event.operation, Operation::Read);
    }

    #[test]
    fn image_must_be_an_object() {
        let result = parse_envelope(&json!({
            "payload": {"op": "c", "before": null, "after": [1], "source": {"table": "t"}}
        }));
        assert!(matches!(
            result,
            Err(EnvelopeError::InvalidImageShape {
                image: Image::After,
                found: "an array"
            })
        ));
    }

    #[test]
    fn slice_reports_json_errors() {
        assert!(matches!(
            parse_envelope_slice(b"{not json"),
            Err(EnvelopeError::Json(_))
        ));

        let parsed = parse_envelope_slice(
            br#"{"payload": {"op": "c", "before": null, "after": {"id": 1}, "source": {"table": "t"}}}"#,
        )
        .unwrap();
        assert!(matches!(parsed, Parsed::Event(ChangeEvent { operation: Operation::Create, .. })));
    }

    #[test]
    fn raw_lines_decode_like_values() {
        let line = r#"{"payload": {"op": "d", "before": {"id": 2}, "after": null, "source": {"table": "t"}}}"#;
        let value: Value = serde_json::from_str(line).unwrap();

        assert_eq!(line.to_string().decode().unwrap(), value.decode().unwrap());
        assert!(matches!(
            "{\"payload\": ".to_string().decode(),
            Err(EnvelopeError::Json(_))
        ));
    }
}
