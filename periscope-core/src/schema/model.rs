//! Normalized schema tree produced by reflection.
//!
//! These types are the boundary contract: they are serialized into the
//! per-server reflection cache and shipped to the shell as JSON, so the field
//! names (camelCase) are part of the wire format.

use serde::{Deserialize, Serialize};

/// All user-visible services exposed by one server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServicesInfo {
    pub services: Vec<ServiceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceInfo {
    pub name: String,
    pub methods: Vec<MethodInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MethodInfo {
    pub name: String,
    pub request_type: String,
    pub response_type: String,
    pub request: MessageInfo,
    pub response: MessageInfo,
    pub request_example: String,
    pub request_example_with_comments: String,
    pub request_schema: String,
    pub response_example: String,
}

/// A message type with its fields, always identified by fully-qualified name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageInfo {
    pub name: String,
    pub fields: Vec<FieldInfo>,
}

impl MessageInfo {
    /// The sentinel used when a message re-appears along the extraction path:
    /// correct name, no fields. Renderers treat it as `{}`.
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldInfo {
    pub name: String,
    /// Scalar name, fully-qualified message/enum name, or `map<K, V>`.
    #[serde(rename = "type")]
    pub type_name: String,
    pub number: i32,
    #[serde(skip_serializing_if = "is_false")]
    pub repeated: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_map: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub map_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub map_value: String,
    #[serde(skip_serializing_if = "is_false")]
    pub is_enum: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<EnumValueInfo>,
    #[serde(skip_serializing_if = "is_false")]
    pub is_well_known: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub well_known_type: String,
    /// Name of the containing oneof, for genuine multi-member oneofs only.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub oneof_group: String,
    /// Nested tree for message-typed fields; `None` for everything else and
    /// for well-known types, which render via fixed templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Box<MessageInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnumValueInfo {
    pub name: String,
    pub number: i32,
}

fn is_false(v: &bool) -> bool {
    !*v
}
