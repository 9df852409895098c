use std::fmt;

/// The 16 canonical gRPC status codes, used as the core's internal error
/// representation regardless of which wire protocol a request arrived on.
///
/// Each wire protocol maps these to its own idiom: HTTP status, gRPC numeric
/// code, or JSON-RPC integer code (see `to_http_status`, `to_grpc_code`,
/// `to_jsonrpc_code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolyCode {
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl PolyCode {
    /// The snake_case canonical name used on the wire by Connect and JSON-RPC.
    pub fn as_str(self) -> &'static str {
        match self {
            PolyCode::Canceled => "canceled",
            PolyCode::Unknown => "unknown",
            PolyCode::InvalidArgument => "invalid_argument",
            PolyCode::DeadlineExceeded => "deadline_exceeded",
            PolyCode::NotFound => "not_found",
            PolyCode::AlreadyExists => "already_exists",
            PolyCode::PermissionDenied => "permission_denied",
            PolyCode::ResourceExhausted => "resource_exhausted",
            PolyCode::FailedPrecondition => "failed_precondition",
            PolyCode::Aborted => "aborted",
            PolyCode::OutOfRange => "out_of_range",
            PolyCode::Unimplemented => "unimplemented",
            PolyCode::Internal => "internal",
            PolyCode::Unavailable => "unavailable",
            PolyCode::DataLoss => "data_loss",
            PolyCode::Unauthenticated => "unauthenticated",
        }
    }

    /// The numeric gRPC status code (same ordinal gRPC itself assigns).
    pub fn to_grpc_code(self) -> u32 {
        match self {
            PolyCode::Canceled => 1,
            PolyCode::Unknown => 2,
            PolyCode::InvalidArgument => 3,
            PolyCode::DeadlineExceeded => 4,
            PolyCode::NotFound => 5,
            PolyCode::AlreadyExists => 6,
            PolyCode::PermissionDenied => 7,
            PolyCode::ResourceExhausted => 8,
            PolyCode::FailedPrecondition => 9,
            PolyCode::Aborted => 10,
            PolyCode::OutOfRange => 11,
            PolyCode::Unimplemented => 12,
            PolyCode::Internal => 13,
            PolyCode::Unavailable => 14,
            PolyCode::DataLoss => 15,
            PolyCode::Unauthenticated => 16,
        }
    }

    /// The `tonic::Code` equivalent, since the dispatch core reuses tonic's
    /// status/metadata types on the wire.
    pub fn to_tonic_code(self) -> tonic::Code {
        match self {
            PolyCode::Canceled => tonic::Code::Cancelled,
            PolyCode::Unknown => tonic::Code::Unknown,
            PolyCode::InvalidArgument => tonic::Code::InvalidArgument,
            PolyCode::DeadlineExceeded => tonic::Code::DeadlineExceeded,
            PolyCode::NotFound => tonic::Code::NotFound,
            PolyCode::AlreadyExists => tonic::Code::AlreadyExists,
            PolyCode::PermissionDenied => tonic::Code::PermissionDenied,
            PolyCode::ResourceExhausted => tonic::Code::ResourceExhausted,
            PolyCode::FailedPrecondition => tonic::Code::FailedPrecondition,
            PolyCode::Aborted => tonic::Code::Aborted,
            PolyCode::OutOfRange => tonic::Code::OutOfRange,
            PolyCode::Unimplemented => tonic::Code::Unimplemented,
            PolyCode::Internal => tonic::Code::Internal,
            PolyCode::Unavailable => tonic::Code::Unavailable,
            PolyCode::DataLoss => tonic::Code::DataLoss,
            PolyCode::Unauthenticated => tonic::Code::Unauthenticated,
        }
    }

    /// HTTP status for plain (non-Connect, non-gRPC) HTTP responses. Connect
    /// and gRPC-Web always answer HTTP 200 regardless of this mapping (§4.3).
    pub fn to_http_status(self) -> http::StatusCode {
        use http::StatusCode as S;
        match self {
            PolyCode::Canceled => S::from_u16(499).unwrap(),
            PolyCode::Unknown | PolyCode::Internal | PolyCode::DataLoss => {
                S::INTERNAL_SERVER_ERROR
            }
            PolyCode::InvalidArgument | PolyCode::OutOfRange | PolyCode::FailedPrecondition => {
                S::BAD_REQUEST
            }
            PolyCode::DeadlineExceeded => S::GATEWAY_TIMEOUT,
            PolyCode::NotFound => S::NOT_FOUND,
            PolyCode::AlreadyExists | PolyCode::Aborted => S::CONFLICT,
            PolyCode::PermissionDenied => S::FORBIDDEN,
            PolyCode::ResourceExhausted => S::TOO_MANY_REQUESTS,
            PolyCode::Unimplemented => S::NOT_IMPLEMENTED,
            PolyCode::Unavailable => S::SERVICE_UNAVAILABLE,
            PolyCode::Unauthenticated => S::UNAUTHORIZED,
        }
    }

    /// JSON-RPC 2.0 integer error code (§4.3).
    pub fn to_jsonrpc_code(self) -> i64 {
        match self {
            PolyCode::NotFound | PolyCode::Unimplemented => -32601,
            PolyCode::InvalidArgument => -32602,
            PolyCode::Internal => -32603,
            _ => -32000,
        }
    }

    pub fn from_grpc_code(n: u32) -> PolyCode {
        match n {
            1 => PolyCode::Canceled,
            2 => PolyCode::Unknown,
            3 => PolyCode::InvalidArgument,
            4 => PolyCode::DeadlineExceeded,
            5 => PolyCode::NotFound,
            6 => PolyCode::AlreadyExists,
            7 => PolyCode::PermissionDenied,
            8 => PolyCode::ResourceExhausted,
            9 => PolyCode::FailedPrecondition,
            10 => PolyCode::Aborted,
            11 => PolyCode::OutOfRange,
            12 => PolyCode::Unimplemented,
            13 => PolyCode::Internal,
            14 => PolyCode::Unavailable,
            15 => PolyCode::DataLoss,
            16 => PolyCode::Unauthenticated,
            _ => PolyCode::Unknown,
        }
    }
}

impl fmt::Display for PolyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One typed error detail, `{type, value}` per spec.md §3. `value` is kept as
/// raw bytes; callers that want a typed payload decode it with their own
/// message type. Base64 encoding only happens at the wire-serialization
/// boundary (Connect/JSON-RPC), never here.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub type_url: String,
    pub value: Vec<u8>,
}

/// The canonical error type threaded through dispatch, handlers, and
/// interceptors. Maps to spec.md §3's `{code, message, details?}`.
#[derive(Debug, Clone)]
pub struct PolyError {
    pub code: PolyCode,
    pub message: String,
    pub details: Vec<ErrorDetail>,
}

impl PolyError {
    pub fn new(code: PolyCode, message: impl Into<String>) -> Self {
        PolyError {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(PolyCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(PolyCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(PolyCode::Internal, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(PolyCode::Unimplemented, message)
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(PolyCode::DeadlineExceeded, "deadline exceeded")
    }

    pub fn canceled() -> Self {
        Self::new(PolyCode::Canceled, "canceled")
    }

    /// §7 "recovered locally": classify an opaque handler error into a
    /// canonical code by inspecting its message. Explicit `PolyError`s
    /// returned by handlers bypass this and pass through unchanged.
    pub fn classify(err: &(dyn std::error::Error + Send + Sync)) -> PolyError {
        let msg = err.to_string();
        if msg.contains("validation failed") {
            PolyError::new(PolyCode::InvalidArgument, msg)
        } else {
            PolyError::new(PolyCode::Internal, msg)
        }
    }

    /// §7: a panic caught at the outermost interceptor becomes `internal`
    /// with the panic payload folded into the message.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> PolyError {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        PolyError::new(PolyCode::Internal, message)
    }
}

impl fmt::Display for PolyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PolyError {}

impl From<tonic::Status> for PolyError {
    fn from(status: tonic::Status) -> Self {
        PolyError::new(PolyCode::from_grpc_code(status.code() as u32), status.message())
    }
}

pub type Result<T> = std::result::Result<T, PolyError>;
