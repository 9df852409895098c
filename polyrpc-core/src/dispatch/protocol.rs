//! §4.3 protocol detection: a single function inspects `Content-Type`,
//! `Accept`, and the gRPC-Web/Connect signal headers and yields which wire
//! protocol and payload encoding a request is using.

use http::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Connect,
    Grpc,
    GrpcWeb,
    JsonRpc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Json,
    Proto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detected {
    pub protocol: Protocol,
    pub encoding: PayloadEncoding,
    /// `application/grpc-web-text`: the body is base64-encoded.
    pub grpc_web_text: bool,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Run protocol detection against request headers, per the priority order
/// in §4.3. `jsonrpc_path` lets the router flag a request that matched the
/// JSON-RPC endpoint path before header-based detection even runs — JSON-RPC
/// has no dedicated headers, so the router decides it by path, not here;
/// pass `false` when calling from a context that isn't the JSON-RPC route.
pub fn detect(headers: &HeaderMap, is_jsonrpc_route: bool) -> Detected {
    if is_jsonrpc_route {
        return Detected {
            protocol: Protocol::JsonRpc,
            encoding: PayloadEncoding::Json,
            grpc_web_text: false,
        };
    }

    let content_type = header_str(headers, "content-type").unwrap_or("");
    let accept = header_str(headers, "accept").unwrap_or("");

    let grpc_web_text = content_type.contains("grpc-web-text");

    let is_grpc_web = content_type.contains("grpc-web")
        || header_str(headers, "x-grpc-web") == Some("1")
        || header_str(headers, "grpc-web") == Some("1");

    let protocol = if is_grpc_web {
        Protocol::GrpcWeb
    } else if content_type.starts_with("application/grpc") {
        Protocol::Grpc
    } else if header_str(headers, "connect-protocol-version") == Some("1") {
        Protocol::Connect
    } else {
        // No explicit signal: default to Connect, the most permissive
        // unary-over-HTTP shape.
        Protocol::Connect
    };

    let mut encoding = encoding_from_content_type(content_type).unwrap_or(PayloadEncoding::Proto);
    if protocol == Protocol::Grpc && encoding_from_content_type(content_type).is_none() {
        // "gRPC defaults to Protobuf unless JSON explicitly requested."
        encoding = PayloadEncoding::Proto;
    }

    if !accept.is_empty() && accept != "*/*" {
        if let Some(from_accept) = encoding_from_content_type(accept) {
            encoding = from_accept;
        }
    }

    Detected {
        protocol,
        encoding,
        grpc_web_text,
    }
}

fn encoding_from_content_type(value: &str) -> Option<PayloadEncoding> {
    if value.ends_with("+json") || value.ends_with("/json") {
        Some(PayloadEncoding::Json)
    } else if value.ends_with("+proto") || value.contains("protobuf") {
        Some(PayloadEncoding::Proto)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn grpc_web_content_type_wins_over_everything() {
        let h = headers(&[("content-type", "application/grpc-web+proto")]);
        let d = detect(&h, false);
        assert_eq!(d.protocol, Protocol::GrpcWeb);
        assert_eq!(d.encoding, PayloadEncoding::Proto);
    }

    #[test]
    fn grpc_web_header_flag_without_content_type() {
        let h = headers(&[("content-type", "application/json"), ("x-grpc-web", "1")]);
        assert_eq!(detect(&h, false).protocol, Protocol::GrpcWeb);
    }

    #[test]
    fn plain_grpc_content_type() {
        let h = headers(&[("content-type", "application/grpc+proto")]);
        let d = detect(&h, false);
        assert_eq!(d.protocol, Protocol::Grpc);
        assert_eq!(d.encoding, PayloadEncoding::Proto);
    }

    #[test]
    fn grpc_json_content_type() {
        let h = headers(&[("content-type", "application/grpc+json")]);
        assert_eq!(detect(&h, false).encoding, PayloadEncoding::Json);
    }

    #[test]
    fn connect_protocol_version_header() {
        let h = headers(&[
            ("content-type", "application/json"),
            ("connect-protocol-version", "1"),
        ]);
        assert_eq!(detect(&h, false).protocol, Protocol::Connect);
    }

    #[test]
    fn accept_overrides_content_type_when_explicit() {
        let h = headers(&[("content-type", "application/json"), ("accept", "application/proto")]);
        assert_eq!(detect(&h, false).encoding, PayloadEncoding::Proto);
    }

    #[test]
    fn wildcard_accept_does_not_override() {
        let h = headers(&[("content-type", "application/json"), ("accept", "*/*")]);
        assert_eq!(detect(&h, false).encoding, PayloadEncoding::Json);
    }

    #[test]
    fn grpc_web_text_flag_detected() {
        let h = headers(&[("content-type", "application/grpc-web-text")]);
        assert!(detect(&h, false).grpc_web_text);
    }

    #[test]
    fn jsonrpc_route_short_circuits_header_inspection() {
        let h = headers(&[("content-type", "application/grpc")]);
        assert_eq!(detect(&h, true).protocol, Protocol::JsonRpc);
    }
}
