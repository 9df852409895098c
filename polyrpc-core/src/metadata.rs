//! Header/trailer string helpers shared by the dispatch core and the stream
//! runtime. Grounded on the teacher's `metadata.rs`, trimmed to the subset
//! this core actually needs: parsing `"name: value"` pairs into an
//! `http::HeaderMap` and rendering gRPC-Web trailer frames.

use http::{HeaderMap, HeaderName, HeaderValue};

/// Parse a single `"name: value"` string into a lowercased `(name, value)`
/// pair. No colon means an empty value, matching the teacher's
/// `metadata_from_headers` behavior.
pub fn parse_header_line(line: &str) -> (String, String) {
    match line.split_once(':') {
        Some((n, v)) => (n.trim().to_lowercase(), v.trim().to_string()),
        None => (line.trim().to_lowercase(), String::new()),
    }
}

/// Insert a `"name: value"` pair into a header map, dropping (and logging)
/// entries with a name or value that isn't valid ASCII header syntax rather
/// than failing the whole request.
pub fn insert_header(map: &mut HeaderMap, name: &str, value: &str) {
    match (HeaderName::try_from(name), HeaderValue::from_str(value)) {
        (Ok(name), Ok(value)) => {
            map.append(name, value);
        }
        _ => {
            tracing::debug!(name, value, "dropping malformed header");
        }
    }
}

/// Render a gRPC-Web/Connect trailer block: `lowercase-name: value\r\n` pairs,
/// per §4.4.
pub fn render_trailer_block(trailers: &HeaderMap) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in trailers.iter() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Parse a trailer block back into a header map (used when reading gRPC-Web
/// trailer frames and in round-trip tests).
pub fn parse_trailer_block(block: &[u8]) -> HeaderMap {
    let mut map = HeaderMap::new();
    let text = String::from_utf8_lossy(block);
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (name, value) = parse_header_line(line);
        insert_header(&mut map, &name, &value);
    }
    map
}
