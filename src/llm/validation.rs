//! JSON Schema checks and best-effort repair of model-produced protocols.
//!
//! Only the schema keywords the pipeline relies on are understood:
//! `type` (single or list), `required`, `properties` and `items`.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::ValidationError;
use crate::models::ProtocolMetadata;

/// Placeholder stored when the model returned no summary
pub const MISSING_SUMMARY: &str = "No summary generated";

/// Keys a protocol object must carry
pub const PROTOCOL_KEYS: [&str; 6] = [
    "metadata",
    "participants",
    "agenda_items",
    "summary",
    "decisions",
    "action_items",
];

/// Alternative key spellings models tend to produce
const KEY_ALIASES: [(&str, &str); 3] = [
    ("actions", "action_items"),
    ("meta", "metadata"),
    ("overall_summary", "summary"),
];

fn decision_schema() -> Value {
    json!({
        "type": ["object", "string"],
        "required": ["description"],
        "properties": {
            "id": {"type": ["string", "null"]},
            "description": {"type": "string"}
        }
    })
}

fn action_item_schema() -> Value {
    json!({
        "type": ["object", "string"],
        "required": ["what"],
        "properties": {
            "id": {"type": ["string", "null"]},
            "who": {"type": "string"},
            "what": {"type": "string"},
            "due": {"type": ["string", "null"]},
            "status": {"type": "string"}
        }
    })
}

/// Wire shape of a final protocol
pub fn protocol_schema() -> Value {
    json!({
        "type": "object",
        "required": PROTOCOL_KEYS,
        "properties": {
            "metadata": {
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "date": {"type": "string"},
                    "location": {"type": "string"},
                    "organizer": {"type": "string"},
                    "author": {"type": "string"}
                }
            },
            "participants": {
                "type": "array",
                "items": {
                    "type": ["object", "string"],
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "role": {"type": ["string", "null"]},
                        "present": {"type": "boolean"}
                    }
                }
            },
            "agenda_items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["topic"],
                    "properties": {
                        "id": {"type": ["string", "null"]},
                        "topic": {"type": "string"},
                        "discussion_summary": {"type": "string"},
                        "decisions_made": {"type": "array", "items": decision_schema()},
                        "action_items_assigned": {"type": "array", "items": action_item_schema()}
                    }
                }
            },
            "summary": {"type": "string"},
            "decisions": {"type": "array", "items": decision_schema()},
            "action_items": {"type": "array", "items": action_item_schema()}
        }
    })
}

/// Response shape requested from map and reduce calls
pub fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "required": ["summary", "decisions", "actions", "participants", "agenda_items"],
        "properties": {
            "summary": {"type": "string"},
            "decisions": {"type": "array", "items": decision_schema()},
            "actions": {"type": "array", "items": action_item_schema()},
            "participants": {"type": "array", "items": {"type": ["object", "string"]}},
            "agenda_items": {"type": "array", "items": {"type": ["object", "string"]}}
        }
    })
}

/// Load a replacement schema from disk
pub fn load_schema(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
    let schema: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse schema JSON: {}", path.display()))?;
    if !schema.is_object() {
        anyhow::bail!("Schema in {} is not a JSON object", path.display());
    }
    Ok(schema)
}

/// Check `value` against `schema`, collecting every violation
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    collect_errors(value, schema, "$", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(errors))
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn collect_errors(value: &Value, schema: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    let expected: Vec<&str> = match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    if !expected.is_empty() && !expected.iter().any(|t| type_matches(value, t)) {
        errors.push(format!(
            "{}: expected {}, found {}",
            path,
            expected.join(" or "),
            type_name(value)
        ));
        return;
    }

    if let Value::Object(object) = value {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    errors.push(format!("{}: missing required key '{}'", path, key));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (key, property_schema) in properties {
                if let Some(child) = object.get(key) {
                    collect_errors(child, property_schema, &format!("{}.{}", path, key), errors);
                }
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            collect_errors(item, item_schema, &format!("{}[{}]", path, i), errors);
        }
    }
}

/// Outcome of repairing a refine response
#[derive(Debug, Clone)]
pub struct RepairReport {
    /// Protocol object with every required key present
    pub object: Map<String, Value>,
    /// Keys that were renamed or defaulted
    pub repairs: Vec<String>,
    /// Schema violations left after repair
    pub warnings: Vec<String>,
}

/// Bring a model-produced protocol into shape without rejecting it.
///
/// Aliased keys are renamed, missing keys are defaulted (`metadata` from the
/// caller, lists to empty, `summary` to a placeholder) and whatever the schema
/// still objects to is reported as warnings.
pub fn repair_protocol_json(
    mut object: Map<String, Value>,
    caller_metadata: &ProtocolMetadata,
    schema: &Value,
) -> RepairReport {
    let mut repairs = Vec::new();

    for (alias, canonical) in KEY_ALIASES {
        if object.contains_key(canonical) {
            continue;
        }
        if let Some(value) = object.remove(alias) {
            repairs.push(format!("renamed '{}' to '{}'", alias, canonical));
            object.insert(canonical.to_string(), value);
        }
    }

    if !object.get("metadata").is_some_and(Value::is_object) {
        let fallback = serde_json::to_value(caller_metadata).unwrap_or_else(|_| json!({}));
        repairs.push("defaulted 'metadata' from caller metadata".to_string());
        object.insert("metadata".to_string(), fallback);
    }

    for key in ["participants", "agenda_items", "decisions", "action_items"] {
        if !object.get(key).is_some_and(Value::is_array) {
            repairs.push(format!("defaulted '{}' to an empty list", key));
            object.insert(key.to_string(), json!([]));
        }
    }

    if !object.get("summary").is_some_and(Value::is_string) {
        repairs.push("defaulted 'summary' to placeholder".to_string());
        object.insert("summary".to_string(), json!(MISSING_SUMMARY));
    }

    for repair in &repairs {
        warn!("Protocol repair: {}", repair);
    }

    let warnings = match validate_against_schema(&Value::Object(object.clone()), schema) {
        Ok(()) => Vec::new(),
        Err(error) => {
            warn!("Protocol failed schema validation after repair: {}", error);
            error.errors
        }
    };

    RepairReport {
        object,
        repairs,
        warnings,
    }
}
