//! Demo services: a trivial `Echoer` and a multi-method `Greeter` with one
//! server-streaming RPC, registered as plain native function handlers the
//! way the core's design notes describe — no `.proto` file, no codegen.
//!
//! Handlers operate on `prost_reflect::DynamicMessage` directly rather than
//! through a generated struct, since the codec layer has no struct<->dynamic
//! bridge (see DESIGN.md); the `Reflect` impls below exist purely to hand
//! the schema builder a field list.

use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use polyrpc_core::error::PolyError;
use polyrpc_core::schema::{FieldSpec, MethodSpec, Reflect, Scalar, SchemaBuilder, TypeDescriptor};
use polyrpc_core::service::{Handler, Method, Service, ServiceOptions, StreamKind, UnaryHandler};
use polyrpc_core::stream::ServerStream;
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

pub struct GreetRequest;
impl Reflect for GreetRequest {
    fn type_descriptor() -> TypeDescriptor {
        const FIELDS: &[FieldSpec] = &[FieldSpec::scalar("name", 1, Scalar::String)];
        TypeDescriptor { name: "GreetRequest", fields: FIELDS, wkt: None }
    }
}

pub struct GreetResponse;
impl Reflect for GreetResponse {
    fn type_descriptor() -> TypeDescriptor {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::scalar("message", 1, Scalar::String),
            FieldSpec::scalar("sequence", 2, Scalar::Int32),
        ];
        TypeDescriptor { name: "GreetResponse", fields: FIELDS, wkt: None }
    }
}

fn unary_echo_handler(output: prost_reflect::MessageDescriptor) -> UnaryHandler {
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
    })
}

fn unary_greet_handler(output: prost_reflect::MessageDescriptor) -> UnaryHandler {
    Arc::new(move |ctx, req: DynamicMessage| {
        let output = output.clone();
        Box::pin(async move {
            let name = req
                .get_field_by_name("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            if name.is_empty() {
                return (ctx, Err(PolyError::invalid_argument("name must not be empty")));
            }
            let mut resp = DynamicMessage::new(output);
            resp.set_field_by_name("message", Value::String(format!("Hello, {name}!")));
            resp.set_field_by_name("sequence", Value::I32(1));
            (ctx, Ok(resp))
        })
    })
}

fn server_stream_greet_handler(
    output: prost_reflect::MessageDescriptor,
) -> polyrpc_core::service::ServerStreamHandler {
    const TICKS: i32 = 3;
    Arc::new(move |ctx, req: DynamicMessage, mut stream: ServerStream| {
        let output = output.clone();
        Box::pin(async move {
            let name = req
                .get_field_by_name("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();

            let mut result = Ok(());
            for seq in 1..=TICKS {
                if stream.is_canceled() {
                    result = Err(PolyError::canceled());
                    break;
                }
                let mut resp = DynamicMessage::new(output.clone());
                resp.set_field_by_name("message", Value::String(format!("Hello, {name}! ({seq}/{TICKS})")));
                resp.set_field_by_name("sequence", Value::I32(seq));
                if let Err(err) = stream.send(&resp).await {
                    result = Err(err);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }

            let final_result = result.clone();
            stream.finish(result, HeaderMap::new()).await;
            (ctx, final_result)
        })
    })
}

/// Builds the `Echoer` service (one unary method) and its descriptor set.
pub fn build_echoer() -> Result<(Service, FileDescriptorSet), PolyError> {
    let builder = SchemaBuilder::new("echo.v1");
    let methods = [MethodSpec {
        name: "Echo",
        input: EchoRequest::type_descriptor,
        output: EchoResponse::type_descriptor,
        client_streaming: false,
        server_streaming: false,
    }];
    let descriptor_set = builder.build_complete_file_descriptor_set("Echoer", "echo/v1/echo.proto", &methods)?;

    let pool = DescriptorPool::from_file_descriptor_set(descriptor_set.clone())
        .map_err(|e| PolyError::internal(format!("echoer descriptor pool: {e}")))?;
    let output = pool
        .get_message_by_name("echo.v1.EchoResponse")
        .ok_or_else(|| PolyError::internal("echo.v1.EchoResponse missing from pool"))?;

    let mut service = Service::new("echo.v1.Echoer", ServiceOptions { validation: true, reflection: true });
    service.register(Method::unary(
        "Echo",
        "echo.v1.EchoRequest",
        "echo.v1.EchoResponse",
        unary_echo_handler(output),
    ));

    Ok((service, descriptor_set))
}

/// Builds the `Greeter` service (one unary, one server-streaming method) and
/// its descriptor set.
pub fn build_greeter() -> Result<(Service, FileDescriptorSet), PolyError> {
    let builder = SchemaBuilder::new("greet.v1");
    let methods = [
        MethodSpec {
            name: "Greet",
            input: GreetRequest::type_descriptor,
            output: GreetResponse::type_descriptor,
            client_streaming: false,
            server_streaming: false,
        },
        MethodSpec {
            name: "GreetStream",
            input: GreetRequest::type_descriptor,
            output: GreetResponse::type_descriptor,
            client_streaming: false,
            server_streaming: true,
        },
        MethodSpec {
            name: "GreetBidi",
            input: GreetRequest::type_descriptor,
            output: GreetResponse::type_descriptor,
            client_streaming: true,
            server_streaming: true,
        },
    ];
    let descriptor_set = builder.build_complete_file_descriptor_set("Greeter", "greet/v1/greet.proto", &methods)?;

    let pool = DescriptorPool::from_file_descriptor_set(descriptor_set.clone())
        .map_err(|e| PolyError::internal(format!("greeter descriptor pool: {e}")))?;
    let output = pool
        .get_message_by_name("greet.v1.GreetResponse")
        .ok_or_else(|| PolyError::internal("greet.v1.GreetResponse missing from pool"))?;

    let mut service = Service::new("greet.v1.Greeter", ServiceOptions { validation: true, reflection: true });
    service.register(Method::unary(
        "Greet",
        "greet.v1.GreetRequest",
        "greet.v1.GreetResponse",
        unary_greet_handler(output.clone()),
    ));
    service.register(Method::server_stream(
        "GreetStream",
        "greet.v1.GreetRequest",
        "greet.v1.GreetResponse",
        server_stream_greet_handler(output),
    ));
    // `BidiStream` is a reserved shape (§4.5): registered so it shows up in
    // reflection and the OpenAPI/proto export, but dispatch always answers
    // `unimplemented` for it, same as `ClientStream`.
    service.register(Method {
        name: "GreetBidi".to_string(),
        stream_kind: StreamKind::BidiStream,
        input_type: "greet.v1.GreetRequest".to_string(),
        output_type: "greet.v1.GreetResponse".to_string(),
        handler: Handler::BidiStream,
        interceptors: Vec::new(),
        validate: None,
        description: Some("reserved bidi-streaming shape, not yet dispatched".to_string()),
    });

    Ok((service, descriptor_set))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_handler_returns_input_message() {
        let (service, set) = build_echoer().unwrap();
        let method = service.method("Echo").unwrap();
        let polyrpc_core::service::Handler::Unary(handler) = method.handler.clone() else {
            panic!("expected unary handler");
        };

        let pool = DescriptorPool::from_file_descriptor_set(set).unwrap();
        let input_desc = pool.get_message_by_name("echo.v1.EchoRequest").unwrap();
        let mut req = DynamicMessage::new(input_desc);
        req.set_field_by_name("message", Value::String("hi".into()));

        let ctx = polyrpc_core::service::HandlerContextPool::default().acquire();
        let (_ctx, result) = handler(ctx, req).await;
        let resp = result.unwrap();
        assert_eq!(resp.get_field_by_name("message").unwrap().as_str(), Some("hi"));
    }

    #[tokio::test]
    async fn greet_handler_rejects_empty_name() {
        let (service, set) = build_greeter().unwrap();
        let method = service.method("Greet").unwrap();
        let polyrpc_core::service::Handler::Unary(handler) = method.handler.clone() else {
            panic!("expected unary handler");
        };

        let pool = DescriptorPool::from_file_descriptor_set(set).unwrap();
        let input_desc = pool.get_message_by_name("greet.v1.GreetRequest").unwrap();
        let req = DynamicMessage::new(input_desc);

        let ctx = polyrpc_core::service::HandlerContextPool::default().acquire();
        let (_ctx, result) = handler(ctx, req).await;
        assert_eq!(result.unwrap_err().code, polyrpc_core::error::PolyCode::InvalidArgument);
    }

    #[tokio::test]
    async fn greet_stream_emits_one_tick_per_sequence_number() {
        use tokio_util::sync::CancellationToken;

        let (service, set) = build_greeter().unwrap();
        let method = service.method("GreetStream").unwrap();
        let polyrpc_core::service::Handler::ServerStream(handler) = method.handler.clone() else {
            panic!("expected server-stream handler");
        };

        let pool = DescriptorPool::from_file_descriptor_set(set).unwrap();
        let input_desc = pool.get_message_by_name("greet.v1.GreetRequest").unwrap();
        let mut req = DynamicMessage::new(input_desc);
        req.set_field_by_name("name", Value::String("Ada".into()));

        let (stream, mut rx) = ServerStream::new(
            polyrpc_core::dispatch::protocol::Protocol::Connect,
            polyrpc_core::dispatch::protocol::PayloadEncoding::Json,
            HeaderMap::new(),
            CancellationToken::new(),
            Duration::from_millis(0),
        );

        let ctx = polyrpc_core::service::HandlerContextPool::default().acquire();
        tokio::spawn(async move {
            let _ = handler(ctx, req, stream).await;
        });

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        assert!(chunks.iter().any(|c| matches!(c, polyrpc_core::stream::StreamChunk::Headers(_))));
        assert!(chunks.iter().filter(|c| matches!(c, polyrpc_core::stream::StreamChunk::Data(_))).count() >= 3);
    }

    #[tokio::test]
    async fn greet_bidi_is_registered_but_dispatch_reports_unimplemented() {
        let (service, _set) = build_greeter().unwrap();
        let method = service.method("GreetBidi").unwrap();
        assert_eq!(method.stream_kind, polyrpc_core::service::StreamKind::BidiStream);
        assert!(matches!(method.handler, polyrpc_core::service::Handler::BidiStream));

        let codec_in = polyrpc_core::codec::Codec::new(
            DescriptorPool::from_file_descriptor_set(_set).unwrap().get_message_by_name("greet.v1.GreetRequest").unwrap(),
            polyrpc_core::codec::CodecOptions::default(),
        );
        let codec_out = polyrpc_core::codec::Codec::new(codec_in.descriptor().clone(), polyrpc_core::codec::CodecOptions::default());
        let pool = polyrpc_core::service::HandlerContextPool::default();

        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        let req = polyrpc_core::dispatch::RequestMeta {
            http_method: http::Method::POST,
            headers,
            is_jsonrpc_route: false,
        };
        let resp = polyrpc_core::dispatch::dispatch_rpc(&service, "GreetBidi", &req, bytes::Bytes::new(), &pool, &codec_in, &codec_out).await;
        assert!(String::from_utf8_lossy(&resp.body).contains("unimplemented"));
    }
}
