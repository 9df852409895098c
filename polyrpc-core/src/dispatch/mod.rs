//! §4.3 Dispatch Core: turns a decoded HTTP request into a handler
//! invocation with the right codec, protocol framing, timeout, and
//! interceptor chain, then turns the result back into wire bytes.
//!
//! Built directly on `http`/`hyper` types rather than `tonic::Server`
//! because the pipeline itself decides gRPC vs gRPC-Web vs Connect vs
//! JSON-RPC framing per request on one port — a decision `tonic`'s server
//! type does not expose as a public seam. `tonic::Status`/`Code`/
//! `MetadataMap` are still reused where they already model exactly what's
//! needed (see `error.rs`).

pub mod decode;
pub mod encode;
pub mod errors;
pub mod protocol;
pub mod timeout;

use std::time::Instant;

use bytes::Bytes;
use http::{HeaderMap, Method as HttpMethod, StatusCode};
use tokio::sync::mpsc;

use crate::codec::Codec;
use crate::error::PolyError;
use crate::framing::jsonrpc;
use crate::service::{HandlerContext, HandlerContextPool, Handler, Method as RpcMethod, Service};
use crate::stream::{ServerStream, StreamChunk, DEFAULT_FLUSH_PERIOD};

use protocol::{detect, PayloadEncoding, Protocol};

pub struct RequestMeta {
    pub http_method: HttpMethod,
    pub headers: HeaderMap,
    pub is_jsonrpc_route: bool,
}

pub struct DispatchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub trailers: Option<HeaderMap>,
    pub body: Bytes,
    /// `Some` for a server-streaming response: the transport drains this
    /// channel for the framed body instead of using `body`/`trailers`
    /// (§4.5 — headers/data/trailers all ride the channel so the first
    /// chunk can still be lazy).
    pub stream: Option<mpsc::Receiver<StreamChunk>>,
}

impl DispatchResponse {
    fn from_error(err: &PolyError, protocol: Protocol, wants_json: bool) -> Self {
        let rendered = errors::emit(err, protocol, wants_json);
        DispatchResponse {
            status: rendered.status,
            headers: rendered.headers,
            trailers: rendered.trailers,
            body: rendered.body,
            stream: None,
        }
    }
}

/// Dispatch one unary request. `codec_in`/`codec_out` are the method's
/// bound input/output codecs, looked up by the caller (typically the
/// router) from its codec registry.
pub async fn dispatch_unary(
    service: &Service,
    method_name: &str,
    req: &RequestMeta,
    body: Bytes,
    ctx_pool: &HandlerContextPool,
    codec_in: &Codec,
    codec_out: &Codec,
) -> DispatchResponse {
    if req.http_method != HttpMethod::POST {
        let err = PolyError::unimplemented("only POST is accepted");
        return DispatchResponse::from_error(&err, Protocol::Connect, true);
    }

    let Some(method) = service.method(method_name) else {
        let err = PolyError::not_found(format!("unknown method {method_name}"));
        return DispatchResponse::from_error(&err, Protocol::Connect, true);
    };

    let detected = detect(&req.headers, req.is_jsonrpc_route);
    let wants_json = detected.encoding == PayloadEncoding::Json;

    let mut ctx = ctx_pool.acquire();
    ctx.method_name = method_name.to_string();
    ctx.request_headers = req.headers.clone();
    if let Some(d) = timeout::connect_timeout(&req.headers).or_else(|| timeout::grpc_timeout(&req.headers)) {
        ctx.deadline = Some(Instant::now() + d);
    }

    let decoded = match decode::decode_request(detected.protocol, &req.headers, &body, detected.grpc_web_text) {
        Ok(d) => d,
        Err(err) => {
            ctx_pool.release(ctx);
            return DispatchResponse::from_error(&err, detected.protocol, wants_json);
        }
    };

    let request_message = if wants_json {
        codec_in.unmarshal_json(&decoded.payload)
    } else {
        codec_in.unmarshal(&decoded.payload)
    };
    let request_message = match request_message {
        Ok(m) => m,
        Err(err) => {
            ctx_pool.release(ctx);
            return DispatchResponse::from_error(&err, detected.protocol, wants_json);
        }
    };

    let Outcome { response_headers, response_trailers, result } =
        invoke_method(service, method, ctx, request_message, ctx_pool).await;

    match result {
        Ok(response_message) => {
            let body = if wants_json {
                match codec_out.marshal_json(&response_message) {
                    Ok(b) => b,
                    Err(err) => return DispatchResponse::from_error(&err, detected.protocol, wants_json),
                }
            } else {
                codec_out.marshal(&response_message)
            };
            let (body, compressed) = encode::maybe_compress(&req.headers, Bytes::from(body));
            let mut headers = response_headers;
            if compressed {
                headers.insert("content-encoding", "gzip".parse().unwrap());
            }
            let content_type = encode::response_content_type(
                req.headers.get("accept").and_then(|v| v.to_str().ok()),
                req.headers.get("content-type").and_then(|v| v.to_str().ok()),
            );
            if let Ok(value) = content_type.parse() {
                headers.insert("content-type", value);
            }
            DispatchResponse {
                status: StatusCode::OK,
                headers,
                trailers: Some(response_trailers),
                body,
                stream: None,
            }
        }
        Err(err) => DispatchResponse::from_error(&err, detected.protocol, wants_json),
    }
}

/// Dispatch one JSON-RPC request or batch. Each element is decoded, routed
/// by bare method name through `service_for`/`codec_for` (JSON-RPC method
/// names are not service-qualified, so a router spanning several services
/// resolves both per call), and re-assembled per §4.4's batch response
/// rules.
pub async fn dispatch_jsonrpc<'a>(
    service_for: impl Fn(&str) -> Option<&'a Service>,
    body: &[u8],
    ctx_pool: &HandlerContextPool,
    codec_for: impl Fn(&str) -> Option<(Codec, Codec)>,
) -> DispatchResponse {
    let was_batch = jsonrpc::is_batch(body);
    let requests = match jsonrpc::parse(body) {
        Ok(r) => r,
        Err(e) => {
            let err = PolyError::invalid_argument(format!("invalid json-rpc request: {e}"));
            return DispatchResponse::from_error(&err, Protocol::JsonRpc, true);
        }
    };

    let mut responses = Vec::new();
    for request in requests {
        let notification = request.is_notification();
        let id = request.id.clone().unwrap_or(serde_json::Value::Null);

        let (Some(service), Some((codec_in, codec_out))) = (service_for(&request.method), codec_for(&request.method)) else {
            if !notification {
                responses.push(jsonrpc::Response::failure(id, &PolyError::not_found("unknown method")));
            }
            continue;
        };

        let params = serde_json::to_vec(&request.params).unwrap_or_default();
        let request_message = codec_in.unmarshal_json(&params);
        let result = match request_message {
            Ok(msg) => dispatch_one_jsonrpc(service, &request.method, msg, ctx_pool).await,
            Err(err) => Err(err),
        };

        if notification {
            continue;
        }
        match result {
            Ok(msg) => match codec_out.marshal_json(&msg) {
                Ok(bytes) => {
                    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
                    responses.push(jsonrpc::Response::success(id, value));
                }
                Err(err) => responses.push(jsonrpc::Response::failure(id, &err)),
            },
            Err(err) => responses.push(jsonrpc::Response::failure(id, &err)),
        }
    }

    match jsonrpc::render_responses(responses, was_batch) {
        Some(body) => {
            let mut headers = HeaderMap::new();
            headers.insert("content-type", "application/json".parse().unwrap());
            DispatchResponse {
                status: StatusCode::OK,
                headers,
                trailers: None,
                body: Bytes::from(body),
                stream: None,
            }
        }
        None => DispatchResponse {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            trailers: None,
            body: Bytes::new(),
            stream: None,
        },
    }
}

/// Dispatch one request to whichever handler shape `method_name` is
/// registered with (§4.3/§4.5). Unary and server-streaming share decode and
/// codec lookup; client- and bidi-streaming are reserved shapes that always
/// answer `unimplemented`.
pub async fn dispatch_rpc(
    service: &Service,
    method_name: &str,
    req: &RequestMeta,
    body: Bytes,
    ctx_pool: &HandlerContextPool,
    codec_in: &Codec,
    codec_out: &Codec,
) -> DispatchResponse {
    match service.method(method_name).map(|m| m.stream_kind) {
        Some(crate::service::StreamKind::Unary) => {
            dispatch_unary(service, method_name, req, body, ctx_pool, codec_in, codec_out).await
        }
        Some(crate::service::StreamKind::ServerStream) => {
            dispatch_server_stream(service, method_name, req, body, ctx_pool, codec_in, codec_out).await
        }
        Some(crate::service::StreamKind::ClientStream) | Some(crate::service::StreamKind::BidiStream) => {
            let err = errors::unimplemented("client-streaming and bidi-streaming are not yet served");
            DispatchResponse::from_error(&err, detect(&req.headers, req.is_jsonrpc_route).protocol, true)
        }
        None => {
            let err = PolyError::not_found(format!("unknown method {method_name}"));
            DispatchResponse::from_error(&err, detect(&req.headers, req.is_jsonrpc_route).protocol, true)
        }
    }
}

/// Dispatch one server-streaming call. Decode and codec handling mirror
/// [`dispatch_unary`]; the handler itself owns the [`ServerStream`] and
/// decides when to finish it, so this only needs to start it running and
/// hand the transport the chunk channel to drain as it fills.
async fn dispatch_server_stream(
    service: &Service,
    method_name: &str,
    req: &RequestMeta,
    body: Bytes,
    ctx_pool: &HandlerContextPool,
    codec_in: &Codec,
    _codec_out: &Codec,
) -> DispatchResponse {
    if req.http_method != HttpMethod::POST {
        let err = PolyError::unimplemented("only POST is accepted");
        return DispatchResponse::from_error(&err, Protocol::Connect, true);
    }

    let Some(method) = service.method(method_name) else {
        let err = PolyError::not_found(format!("unknown method {method_name}"));
        return DispatchResponse::from_error(&err, Protocol::Connect, true);
    };
    let Handler::ServerStream(handler) = method.handler.clone() else {
        let err = errors::unimplemented("method is not server-streaming");
        return DispatchResponse::from_error(&err, Protocol::Connect, true);
    };

    let detected = detect(&req.headers, req.is_jsonrpc_route);
    let wants_json = detected.encoding == PayloadEncoding::Json;

    let mut ctx = ctx_pool.acquire();
    ctx.method_name = method_name.to_string();
    ctx.request_headers = req.headers.clone();
    if let Some(d) = timeout::connect_timeout(&req.headers).or_else(|| timeout::grpc_timeout(&req.headers)) {
        ctx.deadline = Some(Instant::now() + d);
    }

    let decoded = match decode::decode_request(detected.protocol, &req.headers, &body, detected.grpc_web_text) {
        Ok(d) => d,
        Err(err) => {
            ctx_pool.release(ctx);
            return DispatchResponse::from_error(&err, detected.protocol, wants_json);
        }
    };

    let request_message = if wants_json {
        codec_in.unmarshal_json(&decoded.payload)
    } else {
        codec_in.unmarshal(&decoded.payload)
    };
    let request_message = match request_message {
        Ok(m) => m,
        Err(err) => {
            ctx_pool.release(ctx);
            return DispatchResponse::from_error(&err, detected.protocol, wants_json);
        }
    };

    let cancellation = ctx.cancellation.clone();
    let response_headers = ctx.response_headers.clone();
    let (server_stream, rx) =
        ServerStream::new(detected.protocol, detected.encoding, response_headers, cancellation, DEFAULT_FLUSH_PERIOD);

    // Streaming handlers run detached; the context is dropped rather than
    // returned to the pool when they finish.
    tokio::spawn(async move {
        let _ = handler(ctx, request_message, server_stream).await;
    });

    DispatchResponse {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        trailers: None,
        body: Bytes::new(),
        stream: Some(rx),
    }
}

async fn dispatch_one_jsonrpc(
    service: &Service,
    method_name: &str,
    request_message: prost_reflect::DynamicMessage,
    ctx_pool: &HandlerContextPool,
) -> Result<prost_reflect::DynamicMessage, PolyError> {
    let method: &RpcMethod = service
        .method(method_name)
        .ok_or_else(|| PolyError::not_found(format!("unknown method {method_name}")))?;
    let mut ctx = ctx_pool.acquire();
    ctx.method_name = method_name.to_string();
    let outcome = invoke_method(service, method, ctx, request_message, ctx_pool).await;
    outcome.result
}

struct Outcome {
    response_headers: HeaderMap,
    response_trailers: HeaderMap,
    result: Result<prost_reflect::DynamicMessage, PolyError>,
}

/// Run the interceptor chain for `method`, catching handler panics at the
/// outermost boundary (§7) and folding a deadline/cancellation that fired
/// during the call into `canceled`.
async fn invoke_method(
    service: &Service,
    method: &RpcMethod,
    ctx: HandlerContext,
    request_message: prost_reflect::DynamicMessage,
    ctx_pool: &HandlerContextPool,
) -> Outcome {
    let chain_interceptors: Vec<_> = method
        .interceptors
        .iter()
        .cloned()
        .chain(service.interceptors.iter().cloned())
        .collect();

    let Handler::Unary(handler) = &method.handler else {
        ctx_pool.release(ctx);
        return Outcome {
            response_headers: HeaderMap::new(),
            response_trailers: HeaderMap::new(),
            result: Err(errors::unimplemented("method is not unary")),
        };
    };

    // §4.1/§4.3 Validation: oneof exclusivity and any method-supplied
    // `validate` run before the interceptor chain, gated by the service's
    // validation switch the same way reflection is gated by its own.
    if service.options.validation {
        if let Err(err) = crate::schema::validate_oneofs(&request_message).and_then(|()| {
            method.validate.as_ref().map_or(Ok(()), |validate| validate(&request_message))
        }) {
            ctx_pool.release(ctx);
            return Outcome {
                response_headers: HeaderMap::new(),
                response_trailers: HeaderMap::new(),
                result: Err(err),
            };
        }
    }

    // §8 "deadline equal to zero causes immediate deadline_exceeded before
    // the handler runs": a deadline already in the past never reaches the
    // interceptor chain at all.
    if ctx.deadline.is_some_and(|d| Instant::now() >= d) {
        ctx_pool.release(ctx);
        return Outcome {
            response_headers: HeaderMap::new(),
            response_trailers: HeaderMap::new(),
            result: Err(errors::timeout_error()),
        };
    }

    let deadline = ctx.deadline;
    let cancellation = ctx.cancellation.clone();

    let chain = crate::service::compose_chain(&chain_interceptors, handler.clone());

    // A handler panic must not take the whole dispatch loop down with it
    // (§7: caught at the outermost interceptor boundary, surfaced as
    // `internal`). `catch_unwind` only catches panics raised while polling
    // the future it wraps, not ones raised later during an `.await`, so the
    // call is driven on its own task and a panic there surfaces as a
    // `JoinError` instead.
    let join_handle = tokio::spawn(chain(ctx, request_message));

    // A deadline races the handler's own task: on elapse the cancellation
    // token is fired (cooperative — a handler has to check it to actually
    // stop early) and `deadline_exceeded` is returned to the caller right
    // away without waiting for the detached task to finish.
    let joined = match deadline {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, join_handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancellation.cancel();
                    return Outcome {
                        response_headers: HeaderMap::new(),
                        response_trailers: HeaderMap::new(),
                        result: Err(errors::timeout_error()),
                    };
                }
            }
        }
        None => join_handle.await,
    };

    let (ctx, result) = match joined {
        Ok((ctx, result)) => (ctx, result),
        Err(join_err) if join_err.is_panic() => {
            let err = PolyError::from_panic(join_err.into_panic());
            (ctx_pool.acquire(), Err(err))
        }
        Err(_) => (ctx_pool.acquire(), Err(errors::canceled_error())),
    };

    let response_headers = ctx.response_headers.clone();
    let response_trailers = ctx.response_trailers.clone();
    let deadline_passed = ctx.deadline.is_some_and(|d| Instant::now() >= d);
    let is_canceled = ctx.cancellation.is_cancelled();
    ctx_pool.release(ctx);

    // Deadline takes priority over a plain cancellation when both are true,
    // so the two failure modes stay distinguishable on the wire (§4.3/§7).
    let result = if result.is_err() && deadline_passed {
        Err(errors::timeout_error())
    } else if result.is_err() && is_canceled {
        Err(errors::canceled_error())
    } else {
        result
    };

    Outcome {
        response_headers,
        response_trailers,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecOptions;
    use crate::service::{Method as RpcMethod, Service, ServiceOptions};
    use prost_reflect::DescriptorPool;

    fn echo_descriptor() -> prost_reflect::MessageDescriptor {
        let mut set = prost_types::FileDescriptorSet::default();
        set.file.push(prost_types::FileDescriptorProto {
            name: Some("dispatch_test.proto".to_string()),
            package: Some("dt.v1".to_string()),
            message_type: vec![prost_types::DescriptorProto {
                name: Some("Echo".to_string()),
                field: vec![prost_types::FieldDescriptorProto {
                    name: Some("text".to_string()),
                    number: Some(1),
                    label: Some(prost_types::field_descriptor_proto::Label::Optional as i32),
                    r#type: Some(prost_types::field_descriptor_proto::Type::String as i32),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        });
        DescriptorPool::from_file_descriptor_set(set)
            .unwrap()
            .get_message_by_name("dt.v1.Echo")
            .unwrap()
    }

    fn echo_service() -> Service {
        let handler: crate::service::UnaryHandler = std::sync::Arc::new(|ctx, req| {
            Box::pin(async move { (ctx, Ok(req)) })
        });
        let mut service = Service::new("dt.v1.Echoer", ServiceOptions::default());
        service.register(RpcMethod::unary("Echo", "dt.v1.Echo", "dt.v1.Echo", handler));
        service
    }

    #[tokio::test]
    async fn unary_json_round_trip_over_connect() {
        let service = echo_service();
        let desc = echo_descriptor();
        let codec_in = Codec::new(desc.clone(), CodecOptions::default());
        let codec_out = Codec::new(desc, CodecOptions::default());
        let pool = HandlerContextPool::default();

        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        let req = RequestMeta {
            http_method: HttpMethod::POST,
            headers,
            is_jsonrpc_route: false,
        };

        let resp = dispatch_unary(&service, "Echo", &req, Bytes::from_static(br#"{"text":"hi"}"#), &pool, &codec_in, &codec_out).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&resp.body).contains("hi"));
    }

    #[tokio::test]
    async fn non_post_is_rejected() {
        let service = echo_service();
        let desc = echo_descriptor();
        let codec_in = Codec::new(desc.clone(), CodecOptions::default());
        let codec_out = Codec::new(desc, CodecOptions::default());
        let pool = HandlerContextPool::default();

        let req = RequestMeta {
            http_method: HttpMethod::GET,
            headers: HeaderMap::new(),
            is_jsonrpc_route: false,
        };
        let resp = dispatch_unary(&service, "Echo", &req, Bytes::new(), &pool, &codec_in, &codec_out).await;
        assert!(String::from_utf8_lossy(&resp.body).contains("unimplemented"));
    }

    #[tokio::test]
    async fn panicking_handler_surfaces_as_internal() {
        let handler: crate::service::UnaryHandler = std::sync::Arc::new(|_ctx, _req| {
            Box::pin(async move { panic!("boom") })
        });
        let mut service = Service::new("dt.v1.Echoer", ServiceOptions::default());
        service.register(RpcMethod::unary("Echo", "dt.v1.Echo", "dt.v1.Echo", handler));

        let desc = echo_descriptor();
        let codec_in = Codec::new(desc.clone(), CodecOptions::default());
        let codec_out = Codec::new(desc, CodecOptions::default());
        let pool = HandlerContextPool::default();

        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        let req = RequestMeta {
            http_method: HttpMethod::POST,
            headers,
            is_jsonrpc_route: false,
        };
        let resp = dispatch_unary(&service, "Echo", &req, Bytes::from_static(br#"{"text":"hi"}"#), &pool, &codec_in, &codec_out).await;
        assert!(String::from_utf8_lossy(&resp.body).contains("internal"));
    }

    #[tokio::test]
    async fn method_level_validate_runs_before_the_handler() {
        let handler: crate::service::UnaryHandler = std::sync::Arc::new(|ctx, req| Box::pin(async move { (ctx, Ok(req)) }));
        let validate: std::sync::Arc<dyn Fn(&prost_reflect::DynamicMessage) -> Result<(), PolyError> + Send + Sync> =
            std::sync::Arc::new(|msg| {
                let text = msg.get_field_by_name("text").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
                if text.is_empty() {
                    Err(PolyError::invalid_argument("text must not be empty"))
                } else {
                    Ok(())
                }
            });
        let mut service = Service::new("dt.v1.Echoer", ServiceOptions { validation: true, ..Default::default() });
        service.register(RpcMethod::unary("Echo", "dt.v1.Echo", "dt.v1.Echo", handler).with_validate(validate));

        let desc = echo_descriptor();
        let codec_in = Codec::new(desc.clone(), CodecOptions::default());
        let codec_out = Codec::new(desc, CodecOptions::default());
        let pool = HandlerContextPool::default();

        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        let req = RequestMeta { http_method: HttpMethod::POST, headers, is_jsonrpc_route: false };

        let resp = dispatch_unary(&service, "Echo", &req, Bytes::from_static(br#"{"text":""}"#), &pool, &codec_in, &codec_out).await;
        assert!(String::from_utf8_lossy(&resp.body).contains("invalid_argument"));
    }

    #[tokio::test]
    async fn zero_deadline_short_circuits_before_the_handler_runs() {
        let handler: crate::service::UnaryHandler = std::sync::Arc::new(|ctx, req| Box::pin(async move { (ctx, Ok(req)) }));
        let mut service = Service::new("dt.v1.Echoer", ServiceOptions::default());
        service.register(RpcMethod::unary("Echo", "dt.v1.Echo", "dt.v1.Echo", handler));

        let desc = echo_descriptor();
        let codec_in = Codec::new(desc.clone(), CodecOptions::default());
        let codec_out = Codec::new(desc, CodecOptions::default());
        let pool = HandlerContextPool::default();

        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("connect-timeout-ms", "0".parse().unwrap());
        let req = RequestMeta { http_method: HttpMethod::POST, headers, is_jsonrpc_route: false };

        let resp = dispatch_unary(&service, "Echo", &req, Bytes::from_static(br#"{"text":"hi"}"#), &pool, &codec_in, &codec_out).await;
        assert!(String::from_utf8_lossy(&resp.body).contains("deadline_exceeded"));
    }

    #[tokio::test]
    async fn handler_slower_than_the_deadline_is_reported_as_deadline_exceeded() {
        let handler: crate::service::UnaryHandler = std::sync::Arc::new(|ctx, req| {
            Box::pin(async move {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                (ctx, Ok(req))
            })
        });
        let mut service = Service::new("dt.v1.Echoer", ServiceOptions::default());
        service.register(RpcMethod::unary("Echo", "dt.v1.Echo", "dt.v1.Echo", handler));

        let desc = echo_descriptor();
        let codec_in = Codec::new(desc.clone(), CodecOptions::default());
        let codec_out = Codec::new(desc, CodecOptions::default());
        let pool = HandlerContextPool::default();

        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("connect-timeout-ms", "5".parse().unwrap());
        let req = RequestMeta { http_method: HttpMethod::POST, headers, is_jsonrpc_route: false };

        let resp = dispatch_unary(&service, "Echo", &req, Bytes::from_static(br#"{"text":"hi"}"#), &pool, &codec_in, &codec_out).await;
        assert!(String::from_utf8_lossy(&resp.body).contains("deadline_exceeded"));
    }

    #[tokio::test]
    async fn jsonrpc_batch_skips_notifications() {
        let service = echo_service();
        let desc = echo_descriptor();
        let pool = HandlerContextPool::default();

        let body = br#"[{"jsonrpc":"2.0","method":"Echo","params":{"text":"a"},"id":1},
                         {"jsonrpc":"2.0","method":"Echo","params":{"text":"b"}}]"#;
        let desc_for_lookup = desc.clone();
        let resp = dispatch_jsonrpc(
            |method| if method == "Echo" { Some(&service) } else { None },
            body,
            &pool,
            move |method| {
                if method == "Echo" {
                    Some((
                        Codec::new(desc_for_lookup.clone(), CodecOptions::default()),
                        Codec::new(desc_for_lookup.clone(), CodecOptions::default()),
                    ))
                } else {
                    None
                }
            },
        )
        .await;

        let parsed: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
    }
}
