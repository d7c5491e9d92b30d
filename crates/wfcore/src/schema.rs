//! Validation of form submissions against the JSON-Schema-like objects
//! carried by form nodes.
//!
//! Only the subset the form builder emits is understood: `type`,
//! `properties`, `required`, `enum`, `minLength`/`maxLength` and
//! `minimum`/`maximum`. Unknown keywords are ignored.

use crate::value::ValueExt;
use crate::SchemaValidationError;
use serde_json::Value;

/// Check `data` against `schema`, collecting every violation.
pub fn validate_submission(
    node_id: &str,
    schema: &Value,
    data: &Value,
) -> Result<(), SchemaValidationError> {
    let mut violations = Vec::new();
    check(schema, data, "$", &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaValidationError {
            node_id: node_id.to_string(),
            violations,
        })
    }
}

fn check(schema: &Value, data: &Value, at: &str, out: &mut Vec<String>) {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, data) {
            out.push(format!("{}: expected {}, got {}", at, expected, data.type_name()));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(data) {
            out.push(format!("{}: value is not one of the allowed options", at));
        }
    }

    match data {
        Value::Object(map) => {
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for field in required.iter().filter_map(Value::as_str) {
                    if map.get(field).map_or(true, Value::is_null) {
                        out.push(format!("{}.{}: required field is missing", at, field));
                    }
                }
            }
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (field, field_schema) in properties {
                    if let Some(value) = map.get(field).filter(|v| !v.is_null()) {
                        check(field_schema, value, &format!("{}.{}", at, field), out);
                    }
                }
            }
        }
        Value::String(s) => {
            let len = s.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if len < min {
                    out.push(format!("{}: shorter than {} characters", at, min));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if len > max {
                    out.push(format!("{}: longer than {} characters", at, max));
                }
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or_default();
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if n < min {
                    out.push(format!("{}: less than minimum {}", at, min));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if n > max {
                    out.push(format!("{}: greater than maximum {}", at, max));
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check(item_schema, item, &format!("{}[{}]", at, i), out);
                }
            }
        }
        _ => {}
    }
}

fn type_matches(expected: &str, data: &Value) -> bool {
    match expected {
        "object" => data.is_object(),
        "array" => data.is_array(),
        "string" => data.is_string(),
        "boolean" => data.is_boolean(),
        "number" => data.is_number(),
        "integer" => {
            data.is_i64() || data.is_u64() || data.as_f64().is_some_and(|n| n.fract() == 0.0)
        }
        "null" => data.is_null(),
        // Unknown type keywords are not enforced.
        _ => true,
    }
}
