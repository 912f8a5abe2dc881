//! Wire codec for configuration values and field defaults.
//!
//! The codec is asymmetric by field type to keep string-like fields
//! lossless: a string default travels verbatim (no JSON quoting), while
//! structured defaults are JSON-encoded. Decoding picks its strategy from
//! the field type rather than sniffing the payload, so a string field
//! whose value happens to look like JSON is never mangled.

use serde_json::Value;

use super::{Field, FieldType, SchemaError};

/// Encode a field default for the wire.
///
/// String-like fields pass through verbatim; structured fields are
/// JSON-encoded. `None` encodes as an empty string.
#[must_use]
pub fn encode_default(field: &Field, default: Option<&Value>) -> String {
    let Some(value) = default else {
        return String::new();
    };
    if field.effective_type().is_string_like() {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    } else {
        value.to_string()
    }
}

/// Decode a wire string into a typed value for the given field.
///
/// - `Bool` → bool
/// - `Number` → f64
/// - `List` / `Object` / `MultiSelect` / `PredicateList` → decoded JSON
/// - everything else → the raw string
pub fn decode_wire(field: &Field, raw: &str) -> Result<Value, SchemaError> {
    match field.effective_type() {
        FieldType::Bool => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(SchemaError::Validation {
                field: field.name.clone(),
                message: format!("expected a boolean, got {other:?}"),
            }),
        },
        FieldType::Number => raw
            .parse::<f64>()
            .map(|n| {
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            })
            .map_err(|_| SchemaError::Validation {
                field: field.name.clone(),
                message: format!("expected a number, got {raw:?}"),
            }),
        FieldType::List | FieldType::Object | FieldType::MultiSelect | FieldType::PredicateList => {
            serde_json::from_str(raw).map_err(|source| SchemaError::Decode {
                field: field.name.clone(),
                source,
            })
        }
        _ => Ok(Value::String(raw.to_string())),
    }
}

/// Coerce an in-memory value to the field's type.
///
/// This is the counterpart of [`decode_wire`] for values that arrive as
/// JSON already (canvas documents store configuration as JSON, not as wire
/// strings): strings are run through the wire decoder, everything else is
/// checked against the expected shape.
pub fn decode_value(field: &Field, value: &Value) -> Result<Value, SchemaError> {
    match value {
        Value::String(s) => decode_wire(field, s),
        other => match field.effective_type() {
            FieldType::Bool if other.is_boolean() => Ok(other.clone()),
            FieldType::Number if other.is_number() => Ok(other.clone()),
            FieldType::List | FieldType::MultiSelect | FieldType::PredicateList
                if other.is_array() =>
            {
                Ok(other.clone())
            }
            FieldType::Object if other.is_object() => Ok(other.clone()),
            expected => Err(SchemaError::Validation {
                field: field.name.clone(),
                message: format!("expected {expected:?} value, got {other}"),
            }),
        },
    }
}
