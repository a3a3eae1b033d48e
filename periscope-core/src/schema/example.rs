//! JSON example rendering.
//!
//! Two flavors over the same zero values:
//!
//! * [`generate_json_example`] — a valid, indented JSON document.
//! * [`generate_json_example_with_comments`] — a hand-formatted string with
//!   `// oneof <group> (choose one):` lines for the editor. Comments make it
//!   non-JSON by design; the editor strips them before sending.

use super::model::{FieldInfo, MessageInfo};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};

/// Timestamp template used for `google.protobuf.Timestamp` fields.
const TIMESTAMP_EXAMPLE: &str = "2026-02-05T14:05:47Z";
/// Duration template used for `google.protobuf.Duration` fields.
const DURATION_EXAMPLE: &str = "1.5s";

/// Renders an indented JSON document with type-appropriate zero values for
/// every field of `msg`, in declaration order.
pub fn generate_json_example(msg: &MessageInfo) -> String {
    to_pretty(&message_value(msg))
}

fn to_pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn message_value(msg: &MessageInfo) -> Value {
    let mut object = serde_json::Map::new();
    for field in &msg.fields {
        object.insert(field.name.clone(), field_value(field));
    }
    Value::Object(object)
}

/// Zero value for one field, honoring repeated/map wrapping.
pub(crate) fn field_value(field: &FieldInfo) -> Value {
    if field.is_map {
        return json!({});
    }
    let value = single_value(field);
    if field.repeated {
        Value::Array(vec![value])
    } else {
        value
    }
}

fn single_value(field: &FieldInfo) -> Value {
    if field.is_well_known {
        return well_known_value(&field.well_known_type);
    }
    if field.is_enum {
        return match field.enum_values.first() {
            Some(first) => Value::String(first.name.clone()),
            None => Value::String(String::new()),
        };
    }
    if let Some(message) = &field.message {
        return message_value(message);
    }
    zero_value(&field.type_name)
}

fn well_known_value(tag: &str) -> Value {
    match tag {
        "timestamp" => json!(TIMESTAMP_EXAMPLE),
        "duration" => json!(DURATION_EXAMPLE),
        "any" => json!({ "@type": "" }),
        "struct" | "empty" => json!({}),
        "value" => Value::Null,
        "list_value" => json!([]),
        _ => json!({}),
    }
}

fn zero_value(type_name: &str) -> Value {
    match type_name {
        "bool" => json!(false),
        "int32" | "int64" | "uint32" | "uint64" | "sint32" | "sint64" | "fixed32" | "fixed64"
        | "sfixed32" | "sfixed64" => json!(0),
        "float" | "double" => json!(0.0),
        "string" | "bytes" => json!(""),
        // Unresolved message types (cycle placeholders without a tree).
        _ => json!({}),
    }
}

/// Renders the same zero-valued document as [`generate_json_example`], but as
/// a hand-formatted string so oneof groups can be annotated in place. Each
/// genuine multi-member group gets exactly one comment per enclosing message,
/// immediately before its first member; two-space indentation per level.
pub fn generate_json_example_with_comments(msg: &MessageInfo) -> String {
    let mut out = String::new();
    write_message(&mut out, msg, 0);
    out
}

fn write_message(out: &mut String, msg: &MessageInfo, depth: usize) {
    out.push_str("{\n");

    let mut group_sizes: HashMap<&str, usize> = HashMap::new();
    for field in &msg.fields {
        if !field.oneof_group.is_empty() {
            *group_sizes.entry(field.oneof_group.as_str()).or_default() += 1;
        }
    }

    let field_indent = "  ".repeat(depth + 1);
    let mut annotated: HashSet<&str> = HashSet::new();

    for (index, field) in msg.fields.iter().enumerate() {
        let group = field.oneof_group.as_str();
        if !group.is_empty()
            && group_sizes.get(group).copied().unwrap_or(0) > 1
            && annotated.insert(group)
        {
            out.push_str(&field_indent);
            out.push_str(&format!("// oneof {} (choose one):\n", group));
        }

        out.push_str(&field_indent);
        out.push_str(&format!("\"{}\": ", field.name));
        write_field_value(out, field, depth + 1);
        if index + 1 < msg.fields.len() {
            out.push(',');
        }
        out.push('\n');
    }

    out.push_str(&"  ".repeat(depth));
    out.push('}');
}

fn write_field_value(out: &mut String, field: &FieldInfo, depth: usize) {
    if field.is_map {
        out.push_str("{}");
        return;
    }

    if field.repeated {
        out.push_str("[\n");
        out.push_str(&"  ".repeat(depth + 1));
        write_single_value(out, field, depth + 1);
        out.push('\n');
        out.push_str(&"  ".repeat(depth));
        out.push(']');
        return;
    }

    write_single_value(out, field, depth);
}

fn write_single_value(out: &mut String, field: &FieldInfo, depth: usize) {
    if let Some(message) = &field.message
        && !field.is_well_known
    {
        if message.fields.is_empty() {
            out.push_str("{}");
        } else {
            write_message(out, message, depth);
        }
        return;
    }

    let value = single_value(field);
    match serde_json::to_string(&value) {
        Ok(rendered) => out.push_str(&rendered),
        Err(_) => out.push_str("null"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::model::EnumValueInfo;

    fn field(name: &str, type_name: &str) -> FieldInfo {
        FieldInfo {
            name: name.to_string(),
            type_name: type_name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_request_zero_values() {
        let msg = MessageInfo {
            name: "testserver.SimpleRequest".into(),
            fields: vec![
                FieldInfo {
                    number: 1,
                    ..field("message", "string")
                },
                FieldInfo {
                    number: 2,
                    ..field("value", "int32")
                },
            ],
        };

        let rendered = generate_json_example(&msg);
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["message"], json!(""));
        assert_eq!(parsed["value"], json!(0));
    }

    #[test]
    fn test_complex_request() {
        let address = MessageInfo {
            name: "testserver.Address".into(),
            fields: vec![field("street", "string"), field("city", "string")],
        };
        let user = MessageInfo {
            name: "testserver.User".into(),
            fields: vec![
                field("id", "int64"),
                field("name", "string"),
                field("active", "bool"),
                field("balance", "double"),
                FieldInfo {
                    message: Some(Box::new(address)),
                    ..field("address", "testserver.Address")
                },
            ],
        };
        let msg = MessageInfo {
            name: "testserver.ComplexRequest".into(),
            fields: vec![
                FieldInfo {
                    message: Some(Box::new(user)),
                    ..field("user", "testserver.User")
                },
                FieldInfo {
                    is_enum: true,
                    enum_values: vec![
                        EnumValueInfo {
                            name: "UNKNOWN".into(),
                            number: 0,
                        },
                        EnumValueInfo {
                            name: "PENDING".into(),
                            number: 1,
                        },
                    ],
                    ..field("status", "testserver.Status")
                },
                FieldInfo {
                    repeated: true,
                    ..field("timestamps", "int64")
                },
            ],
        };

        let parsed: Value = serde_json::from_str(&generate_json_example(&msg)).unwrap();

        assert_eq!(parsed["user"]["name"], json!(""));
        assert_eq!(parsed["user"]["active"], json!(false));
        assert_eq!(parsed["user"]["balance"], json!(0.0));
        assert_eq!(parsed["user"]["address"]["street"], json!(""));
        assert_eq!(parsed["status"], json!("UNKNOWN"));
        let timestamps = parsed["timestamps"].as_array().unwrap();
        assert_eq!(timestamps.len(), 1);
        assert_eq!(timestamps[0], json!(0));
    }

    #[test]
    fn test_maps_render_as_empty_objects() {
        let msg = MessageInfo {
            name: "testserver.WithMaps".into(),
            fields: vec![
                FieldInfo {
                    is_map: true,
                    map_key: "string".into(),
                    map_value: "testserver.User".into(),
                    ..field("user_map", "map<string, testserver.User>")
                },
                FieldInfo {
                    is_map: true,
                    map_key: "string".into(),
                    map_value: "string".into(),
                    ..field("metadata", "map<string, string>")
                },
            ],
        };

        let parsed: Value = serde_json::from_str(&generate_json_example(&msg)).unwrap();
        assert_eq!(parsed["user_map"], json!({}));
        assert_eq!(parsed["metadata"], json!({}));
    }

    #[test]
    fn test_empty_message() {
        let msg = MessageInfo::placeholder("testserver.EmptyRequest");
        assert_eq!(generate_json_example(&msg), "{}");
    }

    #[test]
    fn test_well_known_templates() {
        let msg = MessageInfo {
            name: "test.Event".into(),
            fields: vec![
                FieldInfo {
                    is_well_known: true,
                    well_known_type: "timestamp".into(),
                    ..field("at", "google.protobuf.Timestamp")
                },
                FieldInfo {
                    is_well_known: true,
                    well_known_type: "duration".into(),
                    ..field("timeout", "google.protobuf.Duration")
                },
                FieldInfo {
                    is_well_known: true,
                    well_known_type: "any".into(),
                    ..field("detail", "google.protobuf.Any")
                },
                FieldInfo {
                    is_well_known: true,
                    well_known_type: "value".into(),
                    ..field("raw", "google.protobuf.Value")
                },
                FieldInfo {
                    is_well_known: true,
                    well_known_type: "list_value".into(),
                    ..field("items", "google.protobuf.ListValue")
                },
            ],
        };

        let parsed: Value = serde_json::from_str(&generate_json_example(&msg)).unwrap();
        assert_eq!(parsed["at"], json!("2026-02-05T14:05:47Z"));
        assert_eq!(parsed["timeout"], json!("1.5s"));
        assert_eq!(parsed["detail"], json!({ "@type": "" }));
        assert_eq!(parsed["raw"], Value::Null);
        assert_eq!(parsed["items"], json!([]));
    }

    #[test]
    fn test_cycle_placeholder_renders_as_empty_object() {
        let msg = MessageInfo {
            name: "test.Node".into(),
            fields: vec![FieldInfo {
                message: Some(Box::new(MessageInfo::placeholder("test.Node"))),
                ..field("next", "test.Node")
            }],
        };

        let parsed: Value = serde_json::from_str(&generate_json_example(&msg)).unwrap();
        assert_eq!(parsed["next"], json!({}));
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let msg = MessageInfo {
            name: "test.Ordered".into(),
            fields: vec![field("zulu", "string"), field("alpha", "string")],
        };
        let rendered = generate_json_example(&msg);
        let zulu = rendered.find("\"zulu\"").unwrap();
        let alpha = rendered.find("\"alpha\"").unwrap();
        assert!(zulu < alpha, "output must follow declaration order:\n{rendered}");
    }

    #[test]
    fn test_comments_simple_oneof() {
        let msg = MessageInfo {
            name: "TestMessage".into(),
            fields: vec![
                field("regular_field", "string"),
                FieldInfo {
                    oneof_group: "my_oneof".into(),
                    ..field("oneof_field1", "string")
                },
                FieldInfo {
                    oneof_group: "my_oneof".into(),
                    ..field("oneof_field2", "int32")
                },
            ],
        };

        let result = generate_json_example_with_comments(&msg);
        assert!(result.contains(r#""regular_field": """#), "{result}");
        assert!(result.contains("// oneof my_oneof (choose one):"), "{result}");
        assert!(result.contains(r#""oneof_field1": """#), "{result}");
        assert!(result.contains(r#""oneof_field2": 0"#), "{result}");

        let count = result.matches("// oneof").count();
        assert_eq!(count, 1, "one comment per group:\n{result}");
    }

    #[test]
    fn test_comments_nested_message_oneof() {
        let nested = MessageInfo {
            name: "NestedMessage".into(),
            fields: vec![
                FieldInfo {
                    oneof_group: "nested_oneof".into(),
                    ..field("field1", "string")
                },
                FieldInfo {
                    oneof_group: "nested_oneof".into(),
                    ..field("field2", "string")
                },
            ],
        };
        let msg = MessageInfo {
            name: "OuterMessage".into(),
            fields: vec![FieldInfo {
                message: Some(Box::new(nested)),
                ..field("nested", "NestedMessage")
            }],
        };

        let result = generate_json_example_with_comments(&msg);
        assert!(result.contains(r#""nested": {"#), "{result}");
        assert!(result.contains("// oneof nested_oneof (choose one):"), "{result}");
        assert!(result.contains(r#""field1": """#), "{result}");
    }

    #[test]
    fn test_comments_skip_single_member_groups() {
        let msg = MessageInfo {
            name: "MessageWithOptional".into(),
            fields: vec![FieldInfo {
                is_enum: true,
                oneof_group: "_status".into(),
                enum_values: vec![
                    EnumValueInfo {
                        name: "STATUS_UNKNOWN".into(),
                        number: 0,
                    },
                    EnumValueInfo {
                        name: "STATUS_ACTIVE".into(),
                        number: 1,
                    },
                ],
                ..field("status", "Status")
            }],
        };

        let result = generate_json_example_with_comments(&msg);
        assert!(result.contains(r#""status": "STATUS_UNKNOWN""#), "{result}");
        assert!(!result.contains("// oneof"), "{result}");
    }

    #[test]
    fn test_comments_multiple_groups_annotated_once_each() {
        let msg = MessageInfo {
            name: "MultiOneofMessage".into(),
            fields: vec![
                FieldInfo {
                    oneof_group: "group1".into(),
                    ..field("field1", "string")
                },
                FieldInfo {
                    oneof_group: "group1".into(),
                    ..field("field2", "string")
                },
                FieldInfo {
                    oneof_group: "group2".into(),
                    ..field("field3", "int32")
                },
                FieldInfo {
                    oneof_group: "group2".into(),
                    ..field("field4", "int32")
                },
            ],
        };

        let result = generate_json_example_with_comments(&msg);
        assert_eq!(result.matches("// oneof group1 (choose one):").count(), 1);
        assert_eq!(result.matches("// oneof group2 (choose one):").count(), 1);
    }

    #[test]
    fn test_comments_indentation_and_commas() {
        let msg = MessageInfo {
            name: "Pair".into(),
            fields: vec![field("first", "string"), field("second", "int32")],
        };

        let result = generate_json_example_with_comments(&msg);
        assert_eq!(result, "{\n  \"first\": \"\",\n  \"second\": 0\n}");
    }
}
