//! §4.3 response encode: content-type negotiation and the
//! compress-above-1-KiB gzip policy.

use bytes::Bytes;
use http::HeaderMap;

const GZIP_THRESHOLD: usize = 1024;

/// Pick the response content type: explicit `Accept` wins, else mirror the
/// request's content type, else default to `application/json`.
pub fn response_content_type(accept: Option<&str>, request_content_type: Option<&str>) -> String {
    match accept {
        Some(a) if !a.is_empty() && a != "*/*" => a.to_string(),
        _ => request_content_type.unwrap_or("application/json").to_string(),
    }
}

/// Compress `body` with gzip if the client advertised `Accept-Encoding:
/// gzip`, the body is at least `GZIP_THRESHOLD` bytes, and compression
/// actually shrinks it. Returns `(body, was_compressed)`.
pub fn maybe_compress(headers: &HeaderMap, body: Bytes) -> (Bytes, bool) {
    let accepts_gzip = headers
        .get("accept-encoding")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));
    if !accepts_gzip || body.len() < GZIP_THRESHOLD {
        return (body, false);
    }

    use std::io::Write;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    if encoder.write_all(&body).is_err() {
        return (body, false);
    }
    match encoder.finish() {
        Ok(compressed) if compressed.len() < body.len() => (Bytes::from(compressed), true),
        _ => (body, false),
    }
}
