//! `GET /openapi.json` (§4.6): a cached-at-call-time OpenAPI 3.0.3 document
//! derived straight from the descriptor pool. Message types become
//! `components/schemas`; each registered method becomes a `POST` path
//! returning its output schema at 200.

use std::collections::HashMap;

use prost_reflect::{DescriptorPool, FieldDescriptor, Kind, MessageDescriptor};
use serde_json::{json, Value};

use crate::service::Service;

pub fn build(pool: &DescriptorPool, services: &HashMap<String, Service>) -> Value {
    let mut schemas = serde_json::Map::new();
    for message in pool.all_messages() {
        schemas.insert(message.full_name().to_string(), message_schema(&message));
    }

    let mut paths = serde_json::Map::new();
    for service in services.values() {
        for method in service.methods() {
            let path = format!("/{}/{}", service.name, method.name);
            paths.insert(
                path,
                json!({
                    "post": {
                        "operationId": format!("{}_{}", service.name, method.name),
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": format!("#/components/schemas/{}", method.input_type) }
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "OK",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": format!("#/components/schemas/{}", method.output_type) }
                                    }
                                }
                            }
                        }
                    }
                }),
            );
        }
    }

    json!({
        "openapi": "3.0.3",
        "info": { "title": "polyrpc services", "version": "1.0.0" },
        "paths": Value::Object(paths),
        "components": { "schemas": Value::Object(schemas) },
    })
}

/// Every field in canonical proto3 JSON is optional (zero values are
/// indistinguishable from absence outside `optional`/oneof fields), so the
/// schema never declares a `required` list.
fn message_schema(message: &MessageDescriptor) -> Value {
    let mut properties = serde_json::Map::new();
    for field in message.fields() {
        properties.insert(field.name().to_string(), field_schema(&field));
    }
    json!({
        "type": "object",
        "properties": Value::Object(properties),
    })
}

fn field_schema(field: &FieldDescriptor) -> Value {
    if field.is_map() {
        if let Kind::Message(entry) = field.kind() {
            let value_field = entry.get_field_by_name("value").expect("map entry has value");
            return json!({ "type": "object", "additionalProperties": scalar_or_ref(&value_field) });
        }
    }
    let item = scalar_or_ref(field);
    if field.is_list() {
        json!({ "type": "array", "items": item })
    } else {
        item
    }
}

fn scalar_or_ref(field: &FieldDescriptor) -> Value {
    match field.kind() {
        Kind::Double | Kind::Float => json!({ "type": "number" }),
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 | Kind::Fixed32 | Kind::Uint32 => json!({ "type": "integer" }),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 | Kind::Fixed64 | Kind::Uint64 => {
            json!({ "type": "string", "format": "int64" })
        }
        Kind::Bool => json!({ "type": "boolean" }),
        Kind::String => json!({ "type": "string" }),
        Kind::Bytes => json!({ "type": "string", "format": "byte" }),
        Kind::Enum(e) => json!({ "type": "string", "enum": e.values().map(|v| v.name().to_string()).collect::<Vec<_>>() }),
        Kind::Message(msg) => json!({ "$ref": format!("#/components/schemas/{}", msg.full_name()) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Method as RpcMethod, ServiceOptions};
    use prost_types::{field_descriptor_proto::Label, field_descriptor_proto::Type, DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};

    fn pool() -> DescriptorPool {
        let fds = FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("openapi_test.proto".to_string()),
                package: Some("oa.v1".to_string()),
                message_type: vec![DescriptorProto {
                    name: Some("Greeting".to_string()),
                    field: vec![FieldDescriptorProto {
                        name: Some("text".to_string()),
                        number: Some(1),
                        label: Some(Label::Optional as i32),
                        r#type: Some(Type::String as i32),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                syntax: Some("proto3".to_string()),
                ..Default::default()
            }],
        };
        DescriptorPool::from_file_descriptor_set(fds).unwrap()
    }

    #[test]
    fn builds_schema_and_path_for_registered_method() {
        let pool = pool();
        let handler: crate::service::UnaryHandler = std::sync::Arc::new(|ctx, req| Box::pin(async move { (ctx, Ok(req)) }));
        let mut service = Service::new("oa.v1.Greeter", ServiceOptions::default());
        service.register(RpcMethod::unary("Greet", "oa.v1.Greeting", "oa.v1.Greeting", handler));
        let mut services = HashMap::new();
        services.insert(service.name.clone(), service);

        let doc = build(&pool, &services);
        assert!(doc["components"]["schemas"]["oa.v1.Greeting"].is_object());
        assert!(doc["paths"]["/oa.v1.Greeter/Greet"]["post"].is_object());
    }
}
