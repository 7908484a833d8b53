//! Structural check of a JSON value against the response schema sent to the model.
//!
//! Only the subset of the schema language the registry uses is understood:
//! `type` (case-insensitive), `required`, `properties` and `items`.

use serde_json::Value;

use crate::error::DecodeError;

pub fn check(value: &Value, schema: &Value) -> Result<(), DecodeError> {
    check_at("$", value, schema)
}

fn check_at(path: &str, value: &Value, schema: &Value) -> Result<(), DecodeError> {
    let Some(kind) = schema.get("type").and_then(Value::as_str) else {
        return Ok(());
    };

    match kind.to_ascii_lowercase().as_str() {
        "object" => {
            let object = value.as_object().ok_or_else(|| wrong_type(path, "object", value))?;

            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    if !object.contains_key(key) {
                        return Err(DecodeError::MissingKey {
                            path: format!("{}.{}", path, key),
                        });
                    }
                }
            }

            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (key, property_schema) in properties {
                    if let Some(child) = object.get(key) {
                        check_at(&format!("{}.{}", path, key), child, property_schema)?;
                    }
                }
            }
            Ok(())
        }
        "array" => {
            let items = value.as_array().ok_or_else(|| wrong_type(path, "array", value))?;
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check_at(&format!("{}[{}]", path, i), item, item_schema)?;
                }
            }
            Ok(())
        }
        "string" if !value.is_string() => Err(wrong_type(path, "string", value)),
        "integer" if !(value.is_i64() || value.is_u64()) => Err(wrong_type(path, "integer", value)),
        "number" if !value.is_number() => Err(wrong_type(path, "number", value)),
        "boolean" if !value.is_boolean() => Err(wrong_type(path, "boolean", value)),
        _ => Ok(()),
    }
}

fn wrong_type(path: &str, expected: &str, found: &Value) -> DecodeError {
    DecodeError::WrongType {
        path: path.to_string(),
        expected: expected.to_string(),
        found: type_name(found).to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
