//! gRPC-Web frames: identical layout to gRPC frames, but flag `0x80` marks a
//! *trailer frame* whose payload is an HTTP/1-style header block
//! (`lowercase-name: value\r\n` pairs). Text mode (`application/grpc-web-text`)
//! wraps the whole stream in base64; binary mode writes raw bytes.

use base64::Engine;

use super::grpc::FLAG_COMPRESSED;
use super::{read_envelope, write_envelope, Frame, FrameError};

pub const FLAG_TRAILER: u8 = 0x80;

/// One decoded gRPC-Web frame, already distinguished as data or trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebFrame {
    Data { payload: Vec<u8>, compressed: bool },
    Trailer { payload: Vec<u8> },
}

pub fn encode_data_frame(payload: &[u8], compressed: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let flags = if compressed { FLAG_COMPRESSED } else { 0 };
    write_envelope(&mut out, flags, payload);
    out
}

pub fn encode_trailer_frame(trailer_block: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_envelope(&mut out, FLAG_TRAILER, trailer_block);
    out
}

/// Decode one binary-mode gRPC-Web frame from the front of `buf`.
///
/// `allow_trailer` controls whether a trailer frame is acceptable here: the
/// request path only ever contains data frames (§4.3), so a trailer frame
/// there is an error; the response path allows both.
pub fn decode_frame(
    buf: &[u8],
    allow_trailer: bool,
) -> Result<Option<(WebFrame, usize)>, FrameError> {
    let Some((Frame { flags, payload }, consumed)) = read_envelope(buf)? else {
        return Ok(None);
    };
    if flags & FLAG_TRAILER != 0 {
        if !allow_trailer {
            return Err(FrameError::TrailerFrameInRequest);
        }
        Ok(Some((WebFrame::Trailer { payload }, consumed)))
    } else {
        Ok(Some((
            WebFrame::Data {
                payload,
                compressed: flags & FLAG_COMPRESSED != 0,
            },
            consumed,
        )))
    }
}

/// Base64-encode a binary gRPC-Web stream for `application/grpc-web-text`.
/// Per §4.4 the writer conceptually buffers until flushed; here that's
/// modeled as "encode what you have so far" since callers control flush
/// timing themselves (see `stream.rs`).
pub fn text_encode(binary: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(binary)
}

pub fn text_decode(text: &str) -> Result<Vec<u8>, FrameError> {
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|_| FrameError::InvalidBase64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{parse_trailer_block, render_trailer_block};

    #[test]
    fn data_then_trailer_round_trip_binary() {
        let mut stream = Vec::new();
        stream.extend(encode_data_frame(b"payload-1", false));
        stream.extend(encode_trailer_frame(b"grpc-status: 0\r\n"));

        let (f1, n1) = decode_frame(&stream, true).unwrap().unwrap();
        assert_eq!(
            f1,
            WebFrame::Data {
                payload: b"payload-1".to_vec(),
                compressed: false
            }
        );
        let (f2, _) = decode_frame(&stream[n1..], true).unwrap().unwrap();
        assert_eq!(
            f2,
            WebFrame::Trailer {
                payload: b"grpc-status: 0\r\n".to_vec()
            }
        );
    }

    #[test]
    fn trailer_frame_rejected_in_request() {
        let stream = encode_trailer_frame(b"grpc-status: 0\r\n");
        let err = decode_frame(&stream, false).unwrap_err();
        assert_eq!(err, FrameError::TrailerFrameInRequest);
    }

    #[test]
    fn text_mode_round_trips_through_base64() {
        let mut stream = Vec::new();
        stream.extend(encode_data_frame(b"abc", false));
        stream.extend(encode_trailer_frame(b"grpc-status: 0\r\n"));

        let text = text_encode(&stream);
        let decoded = text_decode(&text).unwrap();
        assert_eq!(decoded, stream);
    }

    #[test]
    fn trailer_payload_decodes_to_status_zero() {
        let mut map = http::HeaderMap::new();
        map.insert("grpc-status", "0".parse().unwrap());
        let block = render_trailer_block(&map);
        let frame = encode_trailer_frame(&block);
        let (parsed, _) = decode_frame(&frame, true).unwrap().unwrap();
        let WebFrame::Trailer { payload } = parsed else {
            panic!("expected trailer frame");
        };
        let trailers = parse_trailer_block(&payload);
        assert_eq!(trailers.get("grpc-status").unwrap(), "0");
    }
}
