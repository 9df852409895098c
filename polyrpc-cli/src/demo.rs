//! The CLI's bundled smoke-test service: one unary `Echo` method. Kept
//! deliberately smaller than `testing/echoserver`'s fixture, which also
//! covers a multi-method, server-streaming service.

use std::sync::Arc;

use polyrpc_core::error::PolyError;
use polyrpc_core::schema::{FieldSpec, MethodSpec, Reflect, Scalar, SchemaBuilder, TypeDescriptor};
use polyrpc_core::service::{Method, Service, ServiceOptions};
use prost_reflect::{DescriptorPool, DynamicMessage, Value};
use prost_types::FileDescriptorSet;

pub struct EchoRequest;
impl Reflect for EchoRequest {
    fn type_descriptor() -> TypeDescriptor {
        const FIELDS: &[FieldSpec] = &[FieldSpec::scalar("message", 1, Scalar::String)];
        TypeDescriptor { name: "EchoRequest", fields: FIELDS, wkt: None }
    }
}

pub struct EchoResponse;
impl Reflect for EchoResponse {
    fn type_descriptor() -> TypeDescriptor {
        const FIELDS: &[FieldSpec] = &[FieldSpec::scalar("message", 1, Scalar::String)];
        TypeDescriptor { name: "EchoResponse", fields: FIELDS, wkt: None }
    }
}

pub fn build() -> Result<(Service, FileDescriptorSet), PolyError> {
    let builder = SchemaBuilder::new("demo.v1");
    let methods = [MethodSpec {
        name: "Echo",
        input: EchoRequest::type_descriptor,
        output: EchoResponse::type_descriptor,
        client_streaming: false,
        server_streaming: false,
    }];
    let descriptor_set = builder.build_complete_file_descriptor_set("Echoer", "demo/v1/demo.proto", &methods)?;

    let pool = DescriptorPool::from_file_descriptor_set(descriptor_set.clone())
        .map_err(|e| PolyError::internal(format!("demo descriptor pool: {e}")))?;
    let output = pool
        .get_message_by_name("demo.v1.EchoResponse")
        .ok_or_else(|| PolyError::internal("demo.v1.EchoResponse missing from pool"))?;

    let mut service = Service::new("demo.v1.Echoer", ServiceOptions { validation: true, reflection: true });
    service.register(Method::unary(
        "Echo",
        "demo.v1.EchoRequest",
        "demo.v1.EchoResponse",
        Arc::new(move |ctx, req: DynamicMessage| {
            let output = output.clone();
            Box::pin(async move {
                let text = req
                    .get_field_by_name("message")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                let mut resp = DynamicMessage::new(output);
                resp.set_field_by_name("message", Value::String(text));
                (ctx, Ok(resp))
            })
        }),
    ));

    Ok((service, descriptor_set))
}
