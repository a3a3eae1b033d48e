//! Walks resolved descriptors into the [`model`] tree.
//!
//! Extraction is recursion-safe: a `visited` set of fully-qualified message
//! names travels down the call stack and is released on unwind, so a message
//! re-encountered along the *current* path collapses to an empty placeholder
//! while siblings still get the full tree.

use super::example;
use super::model::{EnumValueInfo, FieldInfo, MessageInfo, MethodInfo, ServiceInfo};
use super::request_schema;
use prost_reflect::{
    Cardinality, EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor, MethodDescriptor,
    ServiceDescriptor,
};
use std::collections::HashSet;

/// The `google.protobuf` messages that render via fixed templates instead of
/// generic object recursion.
const WELL_KNOWN_TYPES: &[(&str, &str)] = &[
    ("google.protobuf.Timestamp", "timestamp"),
    ("google.protobuf.Duration", "duration"),
    ("google.protobuf.Any", "any"),
    ("google.protobuf.Struct", "struct"),
    ("google.protobuf.Value", "value"),
    ("google.protobuf.ListValue", "list_value"),
    ("google.protobuf.Empty", "empty"),
];

/// Maps a fully-qualified message name onto its well-known tag, if any.
pub fn well_known_type(full_name: &str) -> Option<&'static str> {
    WELL_KNOWN_TYPES
        .iter()
        .find(|(name, _)| *name == full_name)
        .map(|(_, tag)| *tag)
}

pub fn service_info(service: &ServiceDescriptor) -> ServiceInfo {
    ServiceInfo {
        name: service.full_name().to_string(),
        methods: service.methods().map(|m| method_info(&m)).collect(),
    }
}

/// Builds the full method record, including the rendered request/response
/// artifacts the editor consumes.
pub fn method_info(method: &MethodDescriptor) -> MethodInfo {
    let request = message_info(&method.input());
    let response = message_info(&method.output());

    MethodInfo {
        name: method.name().to_string(),
        request_type: method.input().full_name().to_string(),
        response_type: method.output().full_name().to_string(),
        request_example: example::generate_json_example(&request),
        request_example_with_comments: example::generate_json_example_with_comments(&request),
        request_schema: request_schema::generate_request_schema(&request),
        response_example: example::generate_json_example(&response),
        request,
        response,
    }
}

pub fn message_info(message: &MessageDescriptor) -> MessageInfo {
    let mut visited = HashSet::new();
    message_info_inner(message, &mut visited)
}

fn message_info_inner(message: &MessageDescriptor, visited: &mut HashSet<String>) -> MessageInfo {
    let full_name = message.full_name().to_string();
    if !visited.insert(full_name.clone()) {
        return MessageInfo::placeholder(full_name);
    }

    // descriptor_proto() preserves declaration order, which the renderers
    // rely on; fields() would yield number order instead.
    let mut fields = Vec::new();
    for proto in &message.descriptor_proto().field {
        let Some(name) = proto.name.as_deref() else {
            continue;
        };
        let Some(field) = message.get_field_by_name(name) else {
            continue;
        };
        fields.push(field_info(&field, visited));
    }

    visited.remove(&full_name);
    MessageInfo { name: full_name, fields }
}

fn field_info(field: &FieldDescriptor, visited: &mut HashSet<String>) -> FieldInfo {
    let mut info = FieldInfo {
        name: field.name().to_string(),
        number: field.number() as i32,
        ..Default::default()
    };

    let cardinality = field.cardinality();
    info.required = cardinality == Cardinality::Required;
    info.repeated = cardinality == Cardinality::Repeated && !field.is_map();
    info.optional = cardinality == Cardinality::Optional;

    if let Some(oneof) = field.containing_oneof() {
        // proto3 synthetic oneofs have a single member and never annotate.
        if oneof.fields().len() > 1 {
            info.oneof_group = oneof.name().to_string();
        }
    }

    let kind = field.kind();
    if field.is_map() {
        if let Some(entry) = kind.as_message() {
            populate_map_field(&mut info, entry, visited);
        }
        return info;
    }

    match kind {
        Kind::Message(message) => {
            info.type_name = message.full_name().to_string();
            if let Some(tag) = well_known_type(message.full_name()) {
                info.is_well_known = true;
                info.well_known_type = tag.to_string();
            } else {
                info.message = Some(Box::new(message_info_inner(&message, visited)));
            }
        }
        Kind::Enum(en) => {
            info.type_name = en.full_name().to_string();
            info.is_enum = true;
            info.enum_values = enum_values(&en);
        }
        scalar => info.type_name = scalar_name(&scalar).to_string(),
    }

    info
}

fn populate_map_field(
    info: &mut FieldInfo,
    entry: &MessageDescriptor,
    visited: &mut HashSet<String>,
) {
    let key = scalar_name(&entry.map_entry_key_field().kind()).to_string();

    let value_field = entry.map_entry_value_field();
    let value = match value_field.kind() {
        Kind::Message(message) => {
            let name = message.full_name().to_string();
            if well_known_type(&name).is_none() {
                info.message = Some(Box::new(message_info_inner(&message, visited)));
            }
            name
        }
        Kind::Enum(en) => {
            info.enum_values = enum_values(&en);
            en.full_name().to_string()
        }
        scalar => scalar_name(&scalar).to_string(),
    };

    info.is_map = true;
    info.type_name = format!("map<{}, {}>", key, value);
    info.map_key = key;
    info.map_value = value;
}

/// Enum values in declaration order; the first one is the canonical default.
fn enum_values(en: &EnumDescriptor) -> Vec<EnumValueInfo> {
    en.values()
        .map(|v| EnumValueInfo {
            name: v.name().to_string(),
            number: v.number(),
        })
        .collect()
}

fn scalar_name(kind: &Kind) -> &'static str {
    match kind {
        Kind::Double => "double",
        Kind::Float => "float",
        Kind::Int32 => "int32",
        Kind::Int64 => "int64",
        Kind::Uint32 => "uint32",
        Kind::Uint64 => "uint64",
        Kind::Sint32 => "sint32",
        Kind::Sint64 => "sint64",
        Kind::Fixed32 => "fixed32",
        Kind::Fixed64 => "fixed64",
        Kind::Sfixed32 => "sfixed32",
        Kind::Sfixed64 => "sfixed64",
        Kind::Bool => "bool",
        Kind::String => "string",
        Kind::Bytes => "bytes",
        Kind::Message(_) => "message",
        Kind::Enum(_) => "enum",
    }
}
