//! Conversion between application JSON values and engine values.
//!
//! Date-time and literal-array columns store a queryable primary value next
//! to a shadow column holding the raw JSON value, so reads return exactly
//! what was written.

use crate::schema::ColumnType;
use lumen_core::Value;
use serde_json::Value as Json;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Separator between literal-array elements in the primary column.
pub const LITERAL_SEPARATOR: &str = "|";

/// Engine values for one application value.
#[derive(Clone, Debug, PartialEq)]
pub struct Encoded {
    pub primary: Value,
    /// Raw value for types with a shadow column.
    pub shadow: Option<Value>,
}

/// Encodes a value written to a column.
pub fn encode(column_type: ColumnType, raw: &Json) -> Encoded {
    let shadow = column_type.has_shadow().then(|| match raw {
        Json::Null => Value::Null,
        other => Value::Json(other.clone()),
    });
    Encoded {
        primary: encode_operand(column_type, raw),
        shadow,
    }
}

/// Encodes a value compared against a column.
///
/// Values that do not fit the column type are passed through in their
/// natural engine representation so the engine reports the mismatch.
pub fn encode_operand(column_type: ColumnType, raw: &Json) -> Value {
    if raw.is_null() {
        return Value::Null;
    }
    match column_type {
        ColumnType::DateTime => Value::DateTime(date_millis(raw)),
        ColumnType::LiteralArray => match raw {
            Json::Array(items) => Value::String(
                items
                    .iter()
                    .map(literal)
                    .collect::<Vec<_>>()
                    .join(LITERAL_SEPARATOR),
            ),
            other => Value::String(literal(other)),
        },
        ColumnType::Integer => match raw.as_f64() {
            Some(f) if raw.as_i64().is_none() && f.fract() == 0.0 => Value::Int64(f as i64),
            _ => natural(raw),
        },
        ColumnType::Object => Value::Json(raw.clone()),
        ColumnType::Bytes => match bytes(raw) {
            Some(b) => Value::Bytes(b),
            None => natural(raw),
        },
        ColumnType::Boolean | ColumnType::Number | ColumnType::String => natural(raw),
    }
}

/// Decodes a stored column back into its application value, preferring the
/// shadow column when there is one.
pub fn decode(column_type: ColumnType, primary: &Value, shadow: Option<&Value>) -> Json {
    if let Some(shadow) = shadow {
        return match shadow {
            Value::Json(raw) => raw.clone(),
            _ => Json::Null,
        };
    }
    match (column_type, primary) {
        (ColumnType::LiteralArray, Value::String(joined)) if joined.is_empty() => {
            Json::Array(Vec::new())
        }
        (ColumnType::LiteralArray, Value::String(joined)) => Json::Array(
            joined
                .split(LITERAL_SEPARATOR)
                .map(|s| Json::String(s.to_string()))
                .collect(),
        ),
        _ => to_json(primary),
    }
}

/// Plain conversion of an engine value to JSON.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Int64(i) => Json::from(*i),
        Value::Float64(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.clone()),
        Value::DateTime(ms) => Json::from(*ms),
        Value::Bytes(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
        Value::Json(j) => j.clone(),
    }
}

fn natural(raw: &Json) -> Value {
    match raw {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => Value::Float64(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(s.clone()),
        other => Value::Json(other.clone()),
    }
}

fn literal(raw: &Json) -> String {
    match raw {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn bytes(raw: &Json) -> Option<Vec<u8>> {
    raw.as_array()?
        .iter()
        .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

/// Milliseconds since the epoch, 0 when the value is not a date.
fn date_millis(raw: &Json) -> i64 {
    match raw {
        Json::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Json::String(text) => parse_millis(text).unwrap_or(0),
        _ => 0,
    }
}

fn parse_millis(text: &str) -> Option<i64> {
    if let Ok(at) = OffsetDateTime::parse(text, &Rfc3339) {
        return i64::try_from(at.unix_timestamp_nanos() / 1_000_000).ok();
    }
    let date = Date::parse(text, format_description!("[year]-[month]-[day]")).ok()?;
    Some(date.midnight().assume_utc().unix_timestamp() * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date_time() {
        let encoded = encode(ColumnType::DateTime, &json!("2020-01-01T00:00:00Z"));
        assert_eq!(encoded.primary, Value::DateTime(1_577_836_800_000));
        assert_eq!(
            encoded.shadow,
            Some(Value::Json(json!("2020-01-01T00:00:00Z")))
        );

        let date_only = encode_operand(ColumnType::DateTime, &json!("2020-01-01"));
        assert_eq!(date_only, Value::DateTime(1_577_836_800_000));
        assert_eq!(
            encode_operand(ColumnType::DateTime, &json!("not a date")),
            Value::DateTime(0)
        );
        assert_eq!(encode_operand(ColumnType::DateTime, &json!(42)), Value::DateTime(42));
    }

    #[test]
    fn test_null_date_time() {
        let encoded = encode(ColumnType::DateTime, &Json::Null);
        assert_eq!(encoded.primary, Value::Null);
        assert_eq!(encoded.shadow, Some(Value::Null));
        assert_eq!(
            decode(ColumnType::DateTime, &encoded.primary, encoded.shadow.as_ref()),
            Json::Null
        );
    }

    #[test]
    fn test_literal_array() {
        let raw = json!(["a", "b", 3]);
        let encoded = encode(ColumnType::LiteralArray, &raw);
        assert_eq!(encoded.primary, Value::String("a|b|3".into()));
        assert_eq!(
            decode(ColumnType::LiteralArray, &encoded.primary, encoded.shadow.as_ref()),
            raw
        );
        assert_eq!(
            decode(ColumnType::LiteralArray, &encoded.primary, None),
            json!(["a", "b", "3"])
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(encode_operand(ColumnType::Integer, &json!(3.0)), Value::Int64(3));
        assert_eq!(encode_operand(ColumnType::Number, &json!(3)), Value::Int64(3));
        assert_eq!(
            encode_operand(ColumnType::Number, &json!(2.5)),
            Value::Float64(2.5)
        );
        assert_eq!(to_json(&Value::Float64(2.5)), json!(2.5));
    }

    #[test]
    fn test_bytes_and_objects() {
        assert_eq!(
            encode_operand(ColumnType::Bytes, &json!([1, 255])),
            Value::Bytes(vec![1, 255])
        );
        assert_eq!(
            encode_operand(ColumnType::Object, &json!({"a": 1})),
            Value::Json(json!({"a": 1}))
        );
        assert_eq!(to_json(&Value::Bytes(vec![7])), json!([7]));
    }

    #[test]
    fn test_mismatch_passes_through() {
        assert_eq!(
            encode_operand(ColumnType::String, &json!(5)),
            Value::Int64(5)
        );
    }
}
