//! §4.3 request decode: strip whatever envelope the detected protocol uses
//! and hand back the raw message payload.

use bytes::Bytes;
use http::HeaderMap;

use crate::error::PolyError;
use crate::framing::{connect, grpc, grpc_web};

use super::protocol::Protocol;

/// The decoded payload for one request, plus whether it still needs a
/// content-encoding-gzip pass applied (non-gRPC protocols carry that as a
/// separate header rather than a frame flag).
pub struct Decoded {
    pub payload: Bytes,
}

pub fn decode_request(
    protocol: Protocol,
    headers: &HeaderMap,
    body: &[u8],
    grpc_web_text: bool,
) -> Result<Decoded, PolyError> {
    let payload = match protocol {
        Protocol::Grpc => {
            // gRPC frame/transport failures are not the caller's fault in the
            // way a malformed Connect/gRPC-Web payload is — §7 maps them to
            // `internal`, not `invalid_argument`.
            let (frame, _) = grpc::decode_frame(body)
                .map_err(|e| PolyError::internal(e.to_string()))?
                .ok_or_else(|| PolyError::internal("truncated grpc frame"))?;
            Bytes::from(frame)
        }
        Protocol::Connect => Bytes::copy_from_slice(connect::strip_unary_envelope(body)),
        Protocol::GrpcWeb => {
            let binary = if grpc_web_text {
                grpc_web::text_decode(std::str::from_utf8(body).map_err(|_| {
                    PolyError::invalid_argument("grpc-web-text body is not valid utf-8")
                })?)
                .map_err(|e| PolyError::invalid_argument(e.to_string()))?
            } else {
                body.to_vec()
            };
            let (frame, _) = grpc_web::decode_frame(&binary, false)
                .map_err(|e| PolyError::invalid_argument(e.to_string()))?
                .ok_or_else(|| PolyError::invalid_argument("truncated grpc-web frame"))?;
            match frame {
                crate::framing::grpc_web::WebFrame::Data { payload, .. } => Bytes::from(payload),
                crate::framing::grpc_web::WebFrame::Trailer { .. } => {
                    return Err(PolyError::invalid_argument("trailer frame in request"))
                }
            }
        }
        Protocol::JsonRpc => Bytes::copy_from_slice(body),
    };

    let payload = maybe_decompress_content_encoding(protocol, headers, payload)?;
    Ok(Decoded { payload })
}

/// Content-Encoding gzip applies after reading for non-gRPC requests (§4.3);
/// gRPC's own compression flag is already handled inside the frame decode.
fn maybe_decompress_content_encoding(protocol: Protocol, headers: &HeaderMap, payload: Bytes) -> Result<Bytes, PolyError> {
    if matches!(protocol, Protocol::Grpc) {
        return Ok(payload);
    }
    let is_gzip = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
    if !is_gzip {
        return Ok(payload);
    }
    use std::io::Read;
    let mut decoder = flate2::read::GzDecoder::new(&payload[..]);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PolyError::invalid_argument(format!("gzip decode failed: {e}")))?;
    Ok(Bytes::from(out))
}
