use std::fmt;
use std::sync::Arc;

/// The canonical gRPC status codes.
///
/// Numeric values match the gRPC wire protocol (`grpc-status` is this value
/// encoded as decimal text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl StatusCode {
    /// Parses a `grpc-status` value. Returns `None` for anything that isn't a
    /// non-negative integer in the known range, matching §4.4's "not a
    /// non-negative integer" rejection.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let value: i32 = raw.parse().ok()?;
        Self::from_i32(value)
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        use StatusCode::*;
        Some(match value {
            0 => Ok,
            1 => Cancelled,
            2 => Unknown,
            3 => InvalidArgument,
            4 => DeadlineExceeded,
            5 => NotFound,
            6 => AlreadyExists,
            7 => PermissionDenied,
            8 => ResourceExhausted,
            9 => FailedPrecondition,
            10 => Aborted,
            11 => OutOfRange,
            12 => Unimplemented,
            13 => Internal,
            14 => Unavailable,
            15 => DataLoss,
            16 => Unauthenticated,
            _ => return None,
        })
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        };
        f.write_str(name)
    }
}

/// The terminal `{code, detail}` pair every call converges to, plus an
/// optional debug exception carried along for diagnostics (never serialized
/// to the wire).
#[derive(Debug, Clone)]
pub struct Status {
    code: StatusCode,
    detail: String,
    debug_exception: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Status {
    pub fn new(code: StatusCode, detail: impl Into<String>) -> Self {
        Status {
            code,
            detail: detail.into(),
            debug_exception: None,
        }
    }

    pub fn with_exception(
        code: StatusCode,
        detail: impl Into<String>,
        exception: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Status {
            code,
            detail: detail.into(),
            debug_exception: Some(Arc::new(exception)),
        }
    }

    pub fn ok() -> Self {
        Status::new(StatusCode::Ok, "")
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn debug_exception(&self) -> Option<&(dyn std::error::Error + Send + Sync)> {
        self.debug_exception.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    pub fn cancelled(detail: impl Into<String>) -> Self {
        Status::new(StatusCode::Cancelled, detail)
    }

    pub fn deadline_exceeded(detail: impl Into<String>) -> Self {
        Status::new(StatusCode::DeadlineExceeded, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Status::new(StatusCode::Internal, detail)
    }

    pub fn unimplemented(detail: impl Into<String>) -> Self {
        Status::new(StatusCode::Unimplemented, detail)
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Status::new(StatusCode::Unavailable, detail)
    }

    pub fn resource_exhausted(detail: impl Into<String>) -> Self {
        Status::new(StatusCode::ResourceExhausted, detail)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

impl std::error::Error for Status {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.debug_exception
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// HTTP status → gRPC status mapping used when a response carries no
/// `grpc-status` at all (§4.4). `http_status` is the numeric HTTP status code.
pub fn status_code_from_http(http_status: u16) -> StatusCode {
    match http_status {
        400 | 431 => StatusCode::Internal,
        401 => StatusCode::Unauthenticated,
        403 => StatusCode::PermissionDenied,
        404 => StatusCode::Unimplemented,
        429 | 502 | 503 | 504 => StatusCode::Unavailable,
        100..=199 => StatusCode::Internal,
        400..=499 => StatusCode::Internal,
        500..=599 => StatusCode::Unknown,
        _ => StatusCode::Unknown,
    }
}
