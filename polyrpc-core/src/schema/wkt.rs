//! Well-known type recognition (§4.1). A native type that maps to a
//! `google.protobuf.*` WKT is *imported*, never redefined: the containing
//! file only records the `google/protobuf/…` dependency, and field
//! references point at the canonical type name.
//!
//! `prost_reflect::DescriptorPool` resolves imports against the files
//! actually present in a `FileDescriptorSet` — it has no built-in knowledge
//! of `google/protobuf/*.proto`. So a file that imports one of these must
//! ship alongside the real descriptor for it. [`well_known_file_descriptors`]
//! hand-builds those descriptors (matching the canonical upstream shape of
//! each file) to complete the closure.

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, OneofDescriptorProto};

/// A recognized `google.protobuf.*` well-known type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnown {
    Timestamp,
    Duration,
    Empty,
    Struct,
    Value,
    ListValue,
    FieldMask,
    Any,
}

impl WellKnown {
    /// Fully-qualified Protobuf type name, e.g. `google.protobuf.Timestamp`.
    pub fn full_name(self) -> &'static str {
        match self {
            WellKnown::Timestamp => "google.protobuf.Timestamp",
            WellKnown::Duration => "google.protobuf.Duration",
            WellKnown::Empty => "google.protobuf.Empty",
            WellKnown::Struct => "google.protobuf.Struct",
            WellKnown::Value => "google.protobuf.Value",
            WellKnown::ListValue => "google.protobuf.ListValue",
            WellKnown::FieldMask => "google.protobuf.FieldMask",
            WellKnown::Any => "google.protobuf.Any",
        }
    }

    /// The `.proto` file this type is defined in, recorded as a file
    /// dependency rather than redefined locally.
    pub fn proto_file(self) -> &'static str {
        match self {
            WellKnown::Timestamp => "google/protobuf/timestamp.proto",
            WellKnown::Duration => "google/protobuf/duration.proto",
            WellKnown::Empty => "google/protobuf/empty.proto",
            WellKnown::Struct | WellKnown::Value | WellKnown::ListValue => {
                "google/protobuf/struct.proto"
            }
            WellKnown::FieldMask => "google/protobuf/field_mask.proto",
            WellKnown::Any => "google/protobuf/any.proto",
        }
    }
}

fn scalar_field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn message_field(name: &str, number: i32, type_name: &str, repeated: bool) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(if repeated { Label::Repeated as i32 } else { Label::Optional as i32 }),
        r#type: Some(Type::Message as i32),
        type_name: Some(type_name.to_string()),
        ..Default::default()
    }
}

fn file(name: &str, messages: Vec<DescriptorProto>) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: Some("google.protobuf".to_string()),
        message_type: messages,
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

/// Real `FileDescriptorProto`s for every `google/protobuf/*.proto` file a
/// [`WellKnown`] variant may declare as a dependency, keyed by
/// [`WellKnown::proto_file`]. Callers append the ones actually referenced to
/// a `FileDescriptorSet` before handing it to `DescriptorPool`.
pub fn well_known_file_descriptor(proto_file: &str) -> Option<FileDescriptorProto> {
    match proto_file {
        "google/protobuf/timestamp.proto" => Some(file(
            proto_file,
            vec![DescriptorProto {
                name: Some("Timestamp".to_string()),
                field: vec![
                    scalar_field("seconds", 1, Type::Int64),
                    scalar_field("nanos", 2, Type::Int32),
                ],
                ..Default::default()
            }],
        )),
        "google/protobuf/duration.proto" => Some(file(
            proto_file,
            vec![DescriptorProto {
                name: Some("Duration".to_string()),
                field: vec![
                    scalar_field("seconds", 1, Type::Int64),
                    scalar_field("nanos", 2, Type::Int32),
                ],
                ..Default::default()
            }],
        )),
        "google/protobuf/empty.proto" => Some(file(
            proto_file,
            vec![DescriptorProto {
                name: Some("Empty".to_string()),
                ..Default::default()
            }],
        )),
        "google/protobuf/field_mask.proto" => Some(file(
            proto_file,
            vec![DescriptorProto {
                name: Some("FieldMask".to_string()),
                field: vec![FieldDescriptorProto {
                    label: Some(Label::Repeated as i32),
                    ..scalar_field("paths", 1, Type::String)
                }],
                ..Default::default()
            }],
        )),
        "google/protobuf/any.proto" => Some(file(
            proto_file,
            vec![DescriptorProto {
                name: Some("Any".to_string()),
                field: vec![
                    scalar_field("type_url", 1, Type::String),
                    scalar_field("value", 2, Type::Bytes),
                ],
                ..Default::default()
            }],
        )),
        "google/protobuf/struct.proto" => Some(file(
            proto_file,
            vec![
                DescriptorProto {
                    name: Some("Struct".to_string()),
                    field: vec![message_field("fields", 1, ".google.protobuf.Struct.FieldsEntry", true)],
                    nested_type: vec![DescriptorProto {
                        name: Some("FieldsEntry".to_string()),
                        field: vec![
                            scalar_field("key", 1, Type::String),
                            message_field("value", 2, ".google.protobuf.Value", false),
                        ],
                        options: Some(prost_types::MessageOptions {
                            map_entry: Some(true),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("Value".to_string()),
                    field: vec![
                        FieldDescriptorProto { oneof_index: Some(0), ..scalar_field("null_value", 1, Type::Enum) },
                        FieldDescriptorProto { oneof_index: Some(0), ..scalar_field("number_value", 2, Type::Double) },
                        FieldDescriptorProto { oneof_index: Some(0), ..scalar_field("string_value", 3, Type::String) },
                        FieldDescriptorProto { oneof_index: Some(0), ..scalar_field("bool_value", 4, Type::Bool) },
                        FieldDescriptorProto { oneof_index: Some(0), ..message_field("struct_value", 5, ".google.protobuf.Struct", false) },
                        FieldDescriptorProto { oneof_index: Some(0), ..message_field("list_value", 6, ".google.protobuf.ListValue", false) },
                    ],
                    oneof_decl: vec![OneofDescriptorProto { name: Some("kind".to_string()), options: None }],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("ListValue".to_string()),
                    field: vec![message_field("values", 1, ".google.protobuf.Value", true)],
                    ..Default::default()
                },
            ],
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_maps_to_canonical_name_and_file() {
        assert_eq!(WellKnown::Timestamp.full_name(), "google.protobuf.Timestamp");
        assert_eq!(WellKnown::Timestamp.proto_file(), "google/protobuf/timestamp.proto");
    }

    #[test]
    fn struct_family_shares_one_file() {
        assert_eq!(WellKnown::Struct.proto_file(), WellKnown::Value.proto_file());
        assert_eq!(WellKnown::Value.proto_file(), WellKnown::ListValue.proto_file());
    }

    #[test]
    fn every_proto_file_has_a_matching_descriptor() {
        for wkt in [
            WellKnown::Timestamp,
            WellKnown::Duration,
            WellKnown::Empty,
            WellKnown::Struct,
            WellKnown::Value,
            WellKnown::ListValue,
            WellKnown::FieldMask,
            WellKnown::Any,
        ] {
            assert!(
                well_known_file_descriptor(wkt.proto_file()).is_some(),
                "missing descriptor for {}",
                wkt.proto_file()
            );
        }
    }
}
