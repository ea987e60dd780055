//! Structured errors with a fixed mapping to HTTP status codes
//!
//! Every layer reports failures as an [`Error`] carrying an [`ErrorKind`].
//! The kind decides the status code; the message is what the client sees;
//! the call site is kept for logs only.

use std::fmt;
use std::panic::Location;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::web::Encoder;

/// Closed set of error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    /// Detailed failure meant for the log sink only. The pipeline rewrites
    /// it to [`ErrorKind::Internal`] before anything is sent to the client.
    InternalOnly,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Canceled => "Canceled",
            ErrorKind::Unknown => "Unknown",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::DeadlineExceeded => "DeadlineExceeded",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::ResourceExhausted => "ResourceExhausted",
            ErrorKind::FailedPrecondition => "FailedPrecondition",
            ErrorKind::Aborted => "Aborted",
            ErrorKind::OutOfRange => "OutOfRange",
            ErrorKind::Unimplemented => "Unimplemented",
            ErrorKind::Internal => "Internal",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::DataLoss => "DataLoss",
            ErrorKind::InternalOnly => "InternalOnly",
        }
    }

    /// Numeric wire code; 0 is reserved for success.
    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::Canceled => 1,
            ErrorKind::Unknown => 2,
            ErrorKind::InvalidArgument => 3,
            ErrorKind::DeadlineExceeded => 4,
            ErrorKind::NotFound => 5,
            ErrorKind::AlreadyExists => 6,
            ErrorKind::PermissionDenied => 7,
            ErrorKind::Unauthenticated => 8,
            ErrorKind::ResourceExhausted => 9,
            ErrorKind::FailedPrecondition => 10,
            ErrorKind::Aborted => 11,
            ErrorKind::OutOfRange => 12,
            ErrorKind::Unimplemented => 13,
            ErrorKind::Internal => 14,
            ErrorKind::Unavailable => 15,
            ErrorKind::DataLoss => 16,
            ErrorKind::InternalOnly => 17,
        }
    }

    /// The kind a client ends up seeing once InternalOnly is rewritten.
    pub fn client_facing(&self) -> Self {
        match self {
            ErrorKind::InternalOnly => ErrorKind::Internal,
            kind => *kind,
        }
    }

    /// HTTP status for this kind
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorKind::Canceled => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::FailedPrecondition => StatusCode::BAD_REQUEST,
            ErrorKind::Aborted => StatusCode::CONFLICT,
            ErrorKind::OutOfRange => StatusCode::BAD_REQUEST,
            ErrorKind::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InternalOnly => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Closest kind for a bare failure status produced outside our handlers
    /// (router fallbacks, extractor rejections).
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST
            | StatusCode::UNPROCESSABLE_ENTITY
            | StatusCode::PAYLOAD_TOO_LARGE
            | StatusCode::UNSUPPORTED_MEDIA_TYPE => ErrorKind::InvalidArgument,
            StatusCode::UNAUTHORIZED => ErrorKind::Unauthenticated,
            StatusCode::FORBIDDEN => ErrorKind::PermissionDenied,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::METHOD_NOT_ALLOWED => ErrorKind::Unimplemented,
            StatusCode::NOT_IMPLEMENTED => ErrorKind::Unimplemented,
            StatusCode::REQUEST_TIMEOUT => ErrorKind::Canceled,
            StatusCode::CONFLICT => ErrorKind::Aborted,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::ResourceExhausted,
            StatusCode::SERVICE_UNAVAILABLE => ErrorKind::Unavailable,
            StatusCode::GATEWAY_TIMEOUT => ErrorKind::DeadlineExceeded,
            s if s.is_client_error() => ErrorKind::InvalidArgument,
            s if s.is_server_error() => ErrorKind::Internal,
            _ => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    location: &'static Location<'static>,
}

impl Error {
    /// Creates an error, recording the caller as its source location.
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[track_caller]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Failure talking to an upstream backend. Timeouts become
    /// DeadlineExceeded, everything else Unavailable.
    #[track_caller]
    pub fn upstream(context: &str, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::DeadlineExceeded
        } else {
            ErrorKind::Unavailable
        };
        Self::new(kind, format!("{context}: {err}"))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `file:line` of the code that raised the error
    pub fn source_location(&self) -> String {
        format!("{}:{}", self.location.file(), self.location.line())
    }

    pub fn http_status(&self) -> StatusCode {
        self.kind.http_status()
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u16,
    message: &'a str,
}

impl Encoder for Error {
    fn encode(&self) -> Result<(Vec<u8>, &'static str), Error> {
        let body = ErrorBody {
            code: self.kind.code(),
            message: &self.message,
        };
        serde_json::to_vec(&body)
            .map(|bytes| (bytes, "application/json"))
            .map_err(|e| Error::internal(format!("marshal error: {e}")))
    }

    fn http_status(&self) -> StatusCode {
        self.kind.http_status()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let mut response = match self.encode() {
            Ok((body, content_type)) => {
                (self.http_status(), [(header::CONTENT_TYPE, content_type)], body).into_response()
            }
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        };

        // Outer middleware inspects the structured value, not the body.
        response.extensions_mut().insert(self);
        response
    }
}
