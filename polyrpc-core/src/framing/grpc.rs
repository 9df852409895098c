//! gRPC frame: `[1-byte flags][4-byte BE length][payload]`; flag bit 0 means
//! the payload is gzip-compressed.

use std::io::{Read, Write};

use super::{read_envelope, write_envelope, Frame, FrameError};

pub const FLAG_COMPRESSED: u8 = 0x01;

/// Encode one gRPC data frame, gzip-compressing the payload first when
/// `compress` is set.
pub fn encode_frame(payload: &[u8], compress: bool) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    if compress {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(payload)?;
        let compressed = encoder.finish()?;
        write_envelope(&mut out, FLAG_COMPRESSED, &compressed);
    } else {
        write_envelope(&mut out, 0, payload);
    }
    Ok(out)
}

/// Decode one gRPC frame from the front of `buf`: reads the 5-byte header,
/// reads `length` payload bytes, and gzip-decompresses when the compressed
/// flag bit is set. Returns the decoded payload and bytes consumed.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, FrameError> {
    let Some((Frame { flags, payload }, consumed)) = read_envelope(buf)? else {
        return Ok(None);
    };
    if flags & FLAG_COMPRESSED != 0 {
        let mut decoder = flate2::read::GzDecoder::new(payload.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|_| FrameError::Truncated)?;
        Ok(Some((out, consumed)))
    } else {
        Ok(Some((payload, consumed)))
    }
}
