//! §4.4 Framing Layer: gRPC frames, gRPC-Web frames (binary & base64),
//! Connect streaming envelopes, and JSON-RPC batch detection.
//!
//! Each framing scheme shares the same 5-byte envelope shape —
//! `[1-byte flags][4-byte BE length][payload]` — but assigns different
//! meaning to the flags byte and (for gRPC-Web) to a dedicated trailer
//! frame. Keeping them as separate small modules, rather than one generic
//! "envelope" type with a protocol enum, mirrors how distinctly the three
//! wire formats are actually driven by the dispatch core: a gRPC reader
//! never needs to know about end-of-stream markers, and a Connect writer
//! never needs trailer-frame flags.

pub mod connect;
pub mod grpc;
pub mod grpc_web;
pub mod jsonrpc;

/// Error surfaced while decoding a frame: malformed header, truncated
/// payload, or (gRPC-Web request path) a disallowed trailer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Truncated,
    TrailerFrameInRequest,
    InvalidBase64,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Truncated => write!(f, "truncated frame"),
            FrameError::TrailerFrameInRequest => write!(f, "trailer frame not allowed in request"),
            FrameError::InvalidBase64 => write!(f, "invalid base64"),
        }
    }
}

impl std::error::Error for FrameError {}

/// One decoded 5-byte-prefixed frame: the raw flags byte and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flags: u8,
    pub payload: Vec<u8>,
}

/// Write the shared `[flags][BE u32 length][payload]` envelope.
pub(crate) fn write_envelope(out: &mut Vec<u8>, flags: u8, payload: &[u8]) {
    out.push(flags);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
}

/// Read one `[flags][BE u32 length][payload]` envelope from the front of
/// `buf`, returning the frame and the number of bytes consumed, or `None`
/// if `buf` doesn't yet contain a complete frame.
pub(crate) fn read_envelope(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    if buf.len() < 5 {
        return Ok(None);
    }
    let flags = buf[0];
    let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    if buf.len() < 5 + len {
        return Ok(None);
    }
    let payload = buf[5..5 + len].to_vec();
    Ok(Some((Frame { flags, payload }, 5 + len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips() {
        let mut buf = Vec::new();
        write_envelope(&mut buf, 0x00, b"hello");
        write_envelope(&mut buf, 0x02, b"");

        let (f1, n1) = read_envelope(&buf).unwrap().unwrap();
        assert_eq!(f1.flags, 0x00);
        assert_eq!(f1.payload, b"hello");

        let (f2, n2) = read_envelope(&buf[n1..]).unwrap().unwrap();
        assert_eq!(f2.flags, 0x02);
        assert!(f2.payload.is_empty());
        assert_eq!(n1 + n2, buf.len());
    }

    #[test]
    fn truncated_envelope_is_none_not_error() {
        let mut buf = Vec::new();
        write_envelope(&mut buf, 0, b"0123456789");
        let short = &buf[..buf.len() - 1];
        assert_eq!(read_envelope(short).unwrap(), None);
    }
}
