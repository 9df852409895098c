//! JSON-RPC 2.0 framing: no length-prefixed envelope, one JSON document per
//! request. Batches are JSON arrays; the batch detector skips leading
//! whitespace and checks for `[`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PolyError;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

impl Request {
    /// A request with no `id` is a notification: it must not receive a
    /// response (§4.4).
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Response {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, err: &PolyError) -> Self {
        let data = if err.details.is_empty() {
            None
        } else {
            Some(Value::Array(
                err.details
                    .iter()
                    .map(|d| {
                        serde_json::json!({
                            "type": d.type_url,
                            "value": base64_encode(&d.value),
                        })
                    })
                    .collect(),
            ))
        };
        Response {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(ResponseError {
                code: err.code.to_jsonrpc_code(),
                message: err.message.clone(),
                data,
            }),
        }
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Detect whether a request body is a JSON-RPC batch: skip leading
/// whitespace and check for a `[`.
pub fn is_batch(body: &[u8]) -> bool {
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'[')
}

/// Parse a body as either a single request or a batch of requests.
pub fn parse(body: &[u8]) -> Result<Vec<Request>, serde_json::Error> {
    if is_batch(body) {
        serde_json::from_slice(body)
    } else {
        let single: Request = serde_json::from_slice(body)?;
        Ok(vec![single])
    }
}

/// Serialize a batch's responses: a single response unwrapped unless the
/// request was a batch (in which case it stays an array, even a
/// one-element one), matching Connect/grpcurl-adjacent JSON-RPC servers'
/// convention of mirroring shape for shape.
pub fn render_responses(responses: Vec<Response>, was_batch: bool) -> Option<Vec<u8>> {
    if responses.is_empty() {
        return None;
    }
    if was_batch {
        Some(serde_json::to_vec(&responses).expect("responses always serialize"))
    } else {
        Some(serde_json::to_vec(&responses[0]).expect("response always serializes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_batch_with_leading_whitespace() {
        assert!(is_batch(b"   [{}]"));
        assert!(!is_batch(b"  {\"id\":1}"));
    }

    #[test]
    fn parses_single_request() {
        let body = br#"{"jsonrpc":"2.0","method":"SayHello","params":{"name":"Alice"},"id":1}"#;
        let reqs = parse(body).unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, "SayHello");
        assert!(!reqs[0].is_notification());
    }

    #[test]
    fn parses_batch_request() {
        let body = br#"[{"jsonrpc":"2.0","method":"SayHello","params":{"name":"Alice"},"id":1},
                         {"jsonrpc":"2.0","method":"SayHello","params":{"name":"Bob"},"id":2}]"#;
        let reqs = parse(body).unwrap();
        assert_eq!(reqs.len(), 2);
    }

    #[test]
    fn notification_has_no_id() {
        let body = br#"{"jsonrpc":"2.0","method":"Ping","params":{}}"#;
        let reqs = parse(body).unwrap();
        assert!(reqs[0].is_notification());
    }

    #[test]
    fn all_notifications_render_no_response() {
        assert_eq!(render_responses(vec![], true), None);
    }

    #[test]
    fn non_batch_response_is_unwrapped_object() {
        let resp = Response::success(Value::from(1), serde_json::json!({"ok": true}));
        let bytes = render_responses(vec![resp], false).unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(parsed.is_object());
    }

    #[test]
    fn batch_response_stays_array() {
        let resp = Response::success(Value::from(1), serde_json::json!({"ok": true}));
        let bytes = render_responses(vec![resp], true).unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(parsed.is_array());
    }
}
