//! Transport-neutral call status.
//!
//! Codes follow the gRPC numbering; `http_status` gives the Connect mapping
//! used by the HTTP adapter.

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
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

impl StatusCode {
    pub fn code(&self) -> i32 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::Cancelled => 1,
            StatusCode::Unknown => 2,
            StatusCode::InvalidArgument => 3,
            StatusCode::DeadlineExceeded => 4,
            StatusCode::NotFound => 5,
            StatusCode::AlreadyExists => 6,
            StatusCode::PermissionDenied => 7,
            StatusCode::ResourceExhausted => 8,
            StatusCode::FailedPrecondition => 9,
            StatusCode::Aborted => 10,
            StatusCode::OutOfRange => 11,
            StatusCode::Unimplemented => 12,
            StatusCode::Internal => 13,
            StatusCode::Unavailable => 14,
            StatusCode::DataLoss => 15,
            StatusCode::Unauthenticated => 16,
        }
    }

    /// Connect protocol name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "ok",
            StatusCode::Cancelled => "canceled",
            StatusCode::Unknown => "unknown",
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::NotFound => "not_found",
            StatusCode::AlreadyExists => "already_exists",
            StatusCode::PermissionDenied => "permission_denied",
            StatusCode::ResourceExhausted => "resource_exhausted",
            StatusCode::FailedPrecondition => "failed_precondition",
            StatusCode::Aborted => "aborted",
            StatusCode::OutOfRange => "out_of_range",
            StatusCode::Unimplemented => "unimplemented",
            StatusCode::Internal => "internal",
            StatusCode::Unavailable => "unavailable",
            StatusCode::DataLoss => "data_loss",
            StatusCode::Unauthenticated => "unauthenticated",
        }
    }

    /// HTTP status for a unary Connect error response.
    pub fn http_status(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Cancelled => 499,
            StatusCode::Unknown => 500,
            StatusCode::InvalidArgument => 400,
            StatusCode::DeadlineExceeded => 504,
            StatusCode::NotFound => 404,
            StatusCode::AlreadyExists => 409,
            StatusCode::PermissionDenied => 403,
            StatusCode::ResourceExhausted => 429,
            StatusCode::FailedPrecondition => 400,
            StatusCode::Aborted => 409,
            StatusCode::OutOfRange => 400,
            StatusCode::Unimplemented => 501,
            StatusCode::Internal => 500,
            StatusCode::Unavailable => 503,
            StatusCode::DataLoss => 500,
            StatusCode::Unauthenticated => 401,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The outcome of a failed call as seen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Status {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.code.http_status())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_connect_shape() {
        let status = Status::new(StatusCode::NotFound, "book 7 not found");
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "code": "not_found", "message": "book 7 not found" })
        );
        assert_eq!(status.code.code(), 5);
        assert_eq!(status.code.http_status(), 404);
    }
}
