//! Render a `FileDescriptor` back to `.proto` source text, for the
//! `GET /proto` family of router endpoints. Output follows the same layout
//! `protoprint.Printer` produces: short names within the file's own package,
//! fully-qualified dotted names elsewhere, fields sorted by number.

use std::collections::HashSet;

use prost_reflect::{EnumDescriptor, EnumValueDescriptor, FieldDescriptor, FileDescriptor, Kind, MessageDescriptor, MethodDescriptor, OneofDescriptor, ServiceDescriptor};

pub fn format_proto_file(fd: &FileDescriptor) -> String {
    let proto = fd.file_descriptor_proto();
    let mut out = String::new();

    let syntax = proto.syntax.as_deref().unwrap_or("proto3");
    out.push_str(&format!("syntax = \"{syntax}\";\n"));

    if let Some(pkg) = proto.package.as_deref().filter(|p| !p.is_empty()) {
        out.push('\n');
        out.push_str(&format!("package {pkg};\n"));
    }

    if !proto.dependency.is_empty() {
        out.push('\n');
        for dep in &proto.dependency {
            out.push_str(&format!("import \"{dep}\";\n"));
        }
    }

    let pkg = proto.package.as_deref().unwrap_or("");

    for msg in fd.messages() {
        out.push('\n');
        out.push_str(&format_message(&msg, pkg));
        out.push('\n');
    }

    for e in fd.enums() {
        out.push('\n');
        out.push_str(&format_enum(&e));
        out.push('\n');
    }

    for svc in fd.services() {
        out.push('\n');
        out.push_str(&format_service(&svc, pkg));
        out.push('\n');
    }

    out
}

fn short_name(full_name: &str, pkg: &str) -> String {
    if pkg.is_empty() {
        return full_name.to_string();
    }
    let prefix = format!("{pkg}.");
    match full_name.strip_prefix(&prefix) {
        Some(short) => short.to_string(),
        None => format!(".{full_name}"),
    }
}

fn format_service(svc: &ServiceDescriptor, pkg: &str) -> String {
    let mut out = format!("service {} {{\n", svc.name());
    let methods: Vec<_> = svc.methods().collect();
    for (i, method) in methods.iter().enumerate() {
        out.push_str("  ");
        out.push_str(&format_method(method, pkg));
        out.push('\n');
        if i + 1 < methods.len() {
            out.push('\n');
        }
    }
    out.push('}');
    out
}

fn format_method(method: &MethodDescriptor, pkg: &str) -> String {
    let client_stream = if method.is_client_streaming() { "stream " } else { "" };
    let server_stream = if method.is_server_streaming() { "stream " } else { "" };
    format!(
        "rpc {} ( {}{} ) returns ( {}{} );",
        method.name(),
        client_stream,
        short_name(method.input().full_name(), pkg),
        server_stream,
        short_name(method.output().full_name(), pkg),
    )
}

struct FieldEntry {
    number: u32,
    text: String,
}

fn format_message(msg: &MessageDescriptor, pkg: &str) -> String {
    let mut out = format!("message {} {{\n", msg.name());
    let mut entries = Vec::new();

    let mut oneof_fields: HashSet<u32> = HashSet::new();
    for oneof in msg.oneofs() {
        if is_synthetic_oneof(&oneof) {
            continue;
        }
        for field in oneof.fields() {
            oneof_fields.insert(field.number());
        }
    }

    for field in msg.fields() {
        if oneof_fields.contains(&field.number()) {
            continue;
        }
        entries.push(FieldEntry { number: field.number(), text: format_field(&field, pkg) });
    }

    for oneof in msg.oneofs() {
        if is_synthetic_oneof(&oneof) {
            continue;
        }
        let min_number = oneof.fields().map(|f| f.number()).min().unwrap_or(u32::MAX);
        entries.push(FieldEntry { number: min_number, text: format_oneof(&oneof, pkg) });
    }

    for nested in msg.child_messages() {
        if nested.is_map_entry() {
            continue;
        }
        let min_number = nested.fields().map(|f| f.number()).min().unwrap_or(u32::MAX);
        entries.push(FieldEntry { number: min_number, text: format_message(&nested, pkg) });
    }

    for nested_enum in msg.child_enums() {
        let min_number = nested_enum.values().map(|v| v.number() as u32).min().unwrap_or(u32::MAX);
        entries.push(FieldEntry { number: min_number, text: format_enum(&nested_enum) });
    }

    entries.sort_by_key(|e| e.number);
    for (i, entry) in entries.iter().enumerate() {
        for line in entry.text.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        if i + 1 < entries.len() {
            out.push('\n');
        }
    }

    out.push('}');
    out
}

fn format_field(field: &FieldDescriptor, pkg: &str) -> String {
    if field.is_map() {
        if let Kind::Message(entry_msg) = field.kind() {
            let key_field = entry_msg.get_field_by_name("key").expect("map entry has key");
            let val_field = entry_msg.get_field_by_name("value").expect("map entry has value");
            let key_type = type_name(&key_field, pkg);
            let val_type = type_name(&val_field, pkg);
            return format!("map<{}, {}> {} = {};", key_type, val_type, field.name(), field.number());
        }
    }
    let repeated = if field.is_list() { "repeated " } else { "" };
    format!("{}{} {} = {};", repeated, type_name(field, pkg), field.name(), field.number())
}

fn format_oneof(oneof: &OneofDescriptor, pkg: &str) -> String {
    let mut out = format!("oneof {} {{\n", oneof.name());
    let mut fields: Vec<_> = oneof.fields().collect();
    fields.sort_by_key(|f| f.number());
    for field in &fields {
        out.push_str("  ");
        out.push_str(&format_field(field, pkg));
        out.push('\n');
    }
    out.push('}');
    out
}

fn format_enum(e: &EnumDescriptor) -> String {
    let mut out = format!("enum {} {{\n", e.name());
    let mut values: Vec<_> = e.values().collect();
    values.sort_by_key(|v| v.number());
    for (i, val) in values.iter().enumerate() {
        out.push_str("  ");
        out.push_str(&format_enum_value(val));
        out.push('\n');
        if i + 1 < values.len() {
            out.push('\n');
        }
    }
    out.push('}');
    out
}

fn format_enum_value(val: &EnumValueDescriptor) -> String {
    format!("{} = {};", val.name(), val.number())
}

fn type_name(field: &FieldDescriptor, pkg: &str) -> String {
    match field.kind() {
        Kind::Double => "double".into(),
        Kind::Float => "float".into(),
        Kind::Int64 => "int64".into(),
        Kind::Uint64 => "uint64".into(),
        Kind::Int32 => "int32".into(),
        Kind::Fixed64 => "fixed64".into(),
        Kind::Fixed32 => "fixed32".into(),
        Kind::Bool => "bool".into(),
        Kind::String => "string".into(),
        Kind::Bytes => "bytes".into(),
        Kind::Uint32 => "uint32".into(),
        Kind::Sfixed32 => "sfixed32".into(),
        Kind::Sfixed64 => "sfixed64".into(),
        Kind::Sint32 => "sint32".into(),
        Kind::Sint64 => "sint64".into(),
        Kind::Message(msg) => short_name(msg.full_name(), pkg),
        Kind::Enum(e) => short_name(e.full_name(), pkg),
    }
}

/// A synthetic oneof is the compiler-generated wrapper for a proto3
/// `optional` field: exactly one member, and that field carries
/// `proto3_optional`.
fn is_synthetic_oneof(oneof: &OneofDescriptor) -> bool {
    let fields: Vec<_> = oneof.fields().collect();
    fields.len() == 1 && fields[0].field_descriptor_proto().proto3_optional.unwrap_or(false)
}
