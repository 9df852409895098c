//! Connect streaming envelope: `[1-byte flags][4-byte BE length][payload]`;
//! flag bit `0x02` marks *end-of-stream*, whose payload is a JSON object
//! possibly containing `{"error": {...}}`.

use serde::{Deserialize, Serialize};

use super::{read_envelope, write_envelope, Frame, FrameError};
use crate::error::{ErrorDetail, PolyCode, PolyError};

pub const FLAG_END_OF_STREAM: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFrame {
    Data(Vec<u8>),
    EndOfStream(EndStreamPayload),
}

/// Body of the end-of-stream envelope: empty on success, or carrying the
/// canonical error plus any trailers collected during the stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndStreamPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ConnectErrorBody>,
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub metadata: std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ConnectErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectErrorDetail {
    #[serde(rename = "type")]
    pub type_url: String,
    pub value: String,
}

impl From<&PolyError> for ConnectErrorBody {
    fn from(err: &PolyError) -> Self {
        ConnectErrorBody {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err
                .details
                .iter()
                .map(|d| ConnectErrorDetail {
                    type_url: d.type_url.clone(),
                    value: base64_no_pad(&d.value),
                })
                .collect(),
        }
    }
}

impl ConnectErrorBody {
    pub fn to_poly_error(&self) -> PolyError {
        let code = CANONICAL_NAMES
            .iter()
            .find(|(name, _)| *name == self.code)
            .map(|(_, code)| *code)
            .unwrap_or(PolyCode::Unknown);
        let details = self
            .details
            .iter()
            .filter_map(|d| {
                base64_no_pad_decode(&d.value).map(|value| ErrorDetail {
                    type_url: d.type_url.clone(),
                    value,
                })
            })
            .collect();
        PolyError::new(code, self.message.clone()).with_details(details)
    }
}

const CANONICAL_NAMES: &[(&str, PolyCode)] = &[
    ("canceled", PolyCode::Canceled),
    ("unknown", PolyCode::Unknown),
    ("invalid_argument", PolyCode::InvalidArgument),
    ("deadline_exceeded", PolyCode::DeadlineExceeded),
    ("not_found", PolyCode::NotFound),
    ("already_exists", PolyCode::AlreadyExists),
    ("permission_denied", PolyCode::PermissionDenied),
    ("resource_exhausted", PolyCode::ResourceExhausted),
    ("failed_precondition", PolyCode::FailedPrecondition),
    ("aborted", PolyCode::Aborted),
    ("out_of_range", PolyCode::OutOfRange),
    ("unimplemented", PolyCode::Unimplemented),
    ("internal", PolyCode::Internal),
    ("unavailable", PolyCode::Unavailable),
    ("data_loss", PolyCode::DataLoss),
    ("unauthenticated", PolyCode::Unauthenticated),
];

fn base64_no_pad(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes)
}

fn base64_no_pad_decode(s: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD_NO_PAD.decode(s).ok()
}

pub fn encode_data(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_envelope(&mut out, 0, payload);
    out
}

pub fn encode_end_of_stream(body: &EndStreamPayload) -> Vec<u8> {
    let json = serde_json::to_vec(body).expect("end-of-stream payload always serializes");
    let mut out = Vec::new();
    write_envelope(&mut out, FLAG_END_OF_STREAM, &json);
    out
}

pub fn decode_frame(buf: &[u8]) -> Result<Option<(ConnectFrame, usize)>, FrameError> {
    let Some((Frame { flags, payload }, consumed)) = read_envelope(buf)? else {
        return Ok(None);
    };
    if flags & FLAG_END_OF_STREAM != 0 {
        let body: EndStreamPayload = serde_json::from_slice(&payload).unwrap_or_default();
        Ok(Some((ConnectFrame::EndOfStream(body), consumed)))
    } else {
        Ok(Some((ConnectFrame::Data(payload), consumed)))
    }
}

/// A Connect unary request body carries its envelope only when the caller
/// used streaming-style framing; a plain unary Connect request is just the
/// raw message with no envelope at all. §4.3 says: strip the envelope only
/// if the first 5 bytes look like a valid frame whose length matches
/// `len(body) - 5`.
pub fn strip_unary_envelope(body: &[u8]) -> &[u8] {
    if body.len() >= 5 {
        let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
        if len == body.len() - 5 {
            return &body[5..];
        }
    }
    body
}
