//! Error taxonomy of the attendance service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Every failure a session, ledger or account operation can report
#[derive(Error, Debug)]
pub enum AttendanceError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    /// Missing, unknown or expired bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Role or allow-list violation
    #[error("{0}")]
    Forbidden(String),

    /// Unknown slot, session or attendee
    #[error("{0}")]
    NotFound(String),

    /// Duplicate check-in, account or active session
    #[error("{0}")]
    Conflict(String),

    /// The slot has no active session to end
    #[error("no active session")]
    NotActive,

    /// The slot never had a session
    #[error("no session")]
    NoSession,

    /// Ticket does not match the slot's current session
    #[error("session mismatch")]
    SessionMismatch,

    /// The session was ended or its time box elapsed
    #[error("session has ended")]
    Ended,

    /// Login throttled
    #[error("too many attempts, try again later")]
    TooManyRequests,

    /// Store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Token backend failure
    #[error("token store error: {0}")]
    Cache(#[from] common::error::CacheError),

    /// Anything else that is our fault
    #[error("internal error: {0}")]
    Internal(String),
}

impl AttendanceError {
    pub fn status(&self) -> StatusCode {
        match self {
            AttendanceError::Validation(_)
            | AttendanceError::NotActive
            | AttendanceError::NoSession
            | AttendanceError::SessionMismatch
            | AttendanceError::Ended => StatusCode::BAD_REQUEST,
            AttendanceError::Unauthorized => StatusCode::UNAUTHORIZED,
            AttendanceError::Forbidden(_) => StatusCode::FORBIDDEN,
            AttendanceError::NotFound(_) => StatusCode::NOT_FOUND,
            AttendanceError::Conflict(_) => StatusCode::CONFLICT,
            AttendanceError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AttendanceError::Store(_)
            | AttendanceError::Cache(_)
            | AttendanceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AttendanceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for attendance results
pub type AttendanceResult<T> = Result<T, AttendanceError>;

/// Returns the trimmed value of a required request field.
pub fn required<'a>(value: &'a Option<String>, field: &str) -> AttendanceResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AttendanceError::Validation(format!("missing field: {field}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AttendanceError::Ended.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AttendanceError::SessionMismatch.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AttendanceError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AttendanceError::Forbidden("no".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AttendanceError::Unauthorized.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AttendanceError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_required_rejects_blank() {
        assert_eq!(required(&Some(" C1 ".into()), "courseId").unwrap(), "C1");
        assert!(matches!(
            required(&Some("  ".into()), "courseId"),
            Err(AttendanceError::Validation(_))
        ));
        assert!(required(&None, "courseId").is_err());
    }
}
