//! §4.3 error classification and per-protocol emission.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::error::{PolyCode, PolyError};
use crate::framing::connect::{encode_end_of_stream, ConnectErrorBody, EndStreamPayload};
use crate::framing::grpc_web;
use crate::metadata::render_trailer_block;

use super::protocol::Protocol;

/// §4.3 "Error classification": turn an opaque handler failure into a
/// canonical code. Explicit `PolyError`s bypass this entirely and keep
/// their declared code.
pub fn classify(err: &(dyn std::error::Error + Send + Sync)) -> PolyError {
    PolyError::classify(err)
}

/// The fully-formed pieces of an error response: status, headers/trailers,
/// and body, ready for whichever transport layer is driving the response.
pub struct ErrorResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub trailers: Option<HeaderMap>,
    pub body: Bytes,
}

/// Render `err` the way `protocol` expects it on the wire (§4.3).
pub fn emit(err: &PolyError, protocol: Protocol, wants_json: bool) -> ErrorResponse {
    match protocol {
        Protocol::Connect => emit_connect(err, wants_json),
        Protocol::Grpc => emit_grpc(err),
        Protocol::GrpcWeb => emit_grpc_web(err),
        Protocol::JsonRpc => emit_jsonrpc(err),
    }
}

fn emit_connect(err: &PolyError, wants_json: bool) -> ErrorResponse {
    let mut headers = HeaderMap::new();
    let body = if wants_json {
        let body = ConnectErrorBody::from(err);
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        Bytes::from(serde_json::to_vec(&body).expect("error body always serializes"))
    } else {
        // Proto error bodies reuse the same JSON shape over the wire in
        // practice for Connect unary errors (the `Status`-style payload has
        // no canonical binary proto encoding distinct from JSON here); see
        // DESIGN.md for the rationale.
        let body = ConnectErrorBody::from(err);
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        Bytes::from(serde_json::to_vec(&body).expect("error body always serializes"))
    };
    ErrorResponse {
        status: StatusCode::OK,
        headers,
        trailers: None,
        body,
    }
}

fn emit_grpc(err: &PolyError) -> ErrorResponse {
    let mut trailers = HeaderMap::new();
    trailers.insert(
        "grpc-status",
        HeaderValue::from_str(&err.code.to_grpc_code().to_string()).unwrap(),
    );
    trailers.insert("grpc-message", HeaderValue::from_str(&err.message).unwrap_or(HeaderValue::from_static("")));
    ErrorResponse {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        trailers: Some(trailers),
        body: Bytes::new(),
    }
}

fn emit_grpc_web(err: &PolyError) -> ErrorResponse {
    let mut trailers = HeaderMap::new();
    trailers.insert(
        "grpc-status",
        HeaderValue::from_str(&err.code.to_grpc_code().to_string()).unwrap(),
    );
    trailers.insert("grpc-message", HeaderValue::from_str(&err.message).unwrap_or(HeaderValue::from_static("")));
    let trailer_block = render_trailer_block(&trailers);

    let mut body = Vec::new();
    body.extend(grpc_web::encode_data_frame(&[], false));
    body.extend(grpc_web::encode_trailer_frame(&trailer_block));

    ErrorResponse {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        trailers: None,
        body: Bytes::from(body),
    }
}

fn emit_jsonrpc(err: &PolyError) -> ErrorResponse {
    let resp = crate::framing::jsonrpc::Response::failure(serde_json::Value::Null, err);
    ErrorResponse {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        trailers: None,
        body: Bytes::from(serde_json::to_vec(&resp).expect("json-rpc error always serializes")),
    }
}

/// A Connect streaming error terminates the stream with an end-of-stream
/// envelope rather than a plain error response.
pub fn connect_stream_end(err: Option<&PolyError>) -> Bytes {
    let body = EndStreamPayload {
        error: err.map(ConnectErrorBody::from),
        metadata: Default::default(),
    };
    Bytes::from(encode_end_of_stream(&body))
}

/// §4.3: timeouts surface as `deadline_exceeded` regardless of protocol.
pub fn timeout_error() -> PolyError {
    PolyError::deadline_exceeded()
}

pub fn canceled_error() -> PolyError {
    PolyError::canceled()
}

/// `Unimplemented` for reserved stream shapes and unknown paths.
pub fn unimplemented(message: impl Into<String>) -> PolyError {
    PolyError::unimplemented(message)
}
