//! Field-level schema document for UI forms.
//!
//! Mirrors the top-level field shape of a message, but each value is a
//! descriptor object carrying the field's metadata next to its example value.
//! This is the contract request editors are built against.

use super::example;
use super::model::{FieldInfo, MessageInfo};
use serde_json::{Value, json};

/// Renders the schema document for `msg` as indented JSON.
pub fn generate_request_schema(msg: &MessageInfo) -> String {
    serde_json::to_string_pretty(&schema_object(msg)).unwrap_or_else(|_| "{}".to_string())
}

fn schema_object(msg: &MessageInfo) -> Value {
    let mut object = serde_json::Map::new();
    for field in &msg.fields {
        object.insert(field.name.clone(), field_descriptor(field));
    }
    Value::Object(object)
}

fn field_descriptor(field: &FieldInfo) -> Value {
    let mut desc = serde_json::Map::new();
    desc.insert("type".into(), json!(field.type_name));
    desc.insert("value".into(), example::field_value(field));

    if field.repeated {
        desc.insert("repeated".into(), json!(true));
    }
    if field.optional {
        desc.insert("optional".into(), json!(true));
    }
    if field.required {
        desc.insert("required".into(), json!(true));
    }
    if field.is_map {
        desc.insert("isMap".into(), json!(true));
        desc.insert("mapKey".into(), json!(field.map_key));
        desc.insert("mapValue".into(), json!(field.map_value));
    }
    if field.is_enum {
        desc.insert("isEnum".into(), json!(true));
    }
    if !field.enum_values.is_empty() {
        let names: Vec<&str> = field.enum_values.iter().map(|v| v.name.as_str()).collect();
        desc.insert("enumValues".into(), json!(names));
    }
    if !field.oneof_group.is_empty() {
        desc.insert("oneofGroup".into(), json!(field.oneof_group));
    }
    if let Some(message) = &field.message {
        desc.insert("message".into(), schema_object(message));
    }

    Value::Object(desc)
}
