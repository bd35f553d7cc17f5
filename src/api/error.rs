//! API error handling.
//!
//! Failures are reported as a status code plus a terse `{"detail": "..."}`
//! body. Authentication failures never say why they failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::crypto::AuthError;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    ValidationError,
    InternalError,
    DatabaseError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::DatabaseError => "database_error",
        }
    }
}

/// Response body for every failure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
        }
    }

    /// Unauthorized error (401), always with the same message
    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "Unauthorized")
    }

    /// Validation error (400) for a single field
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ValidationError,
            format!("{}: {}", field, message.into()),
        )
    }

    /// Internal server error (500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error (500)
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                detail: self.message,
            }),
        )
            .into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "Database error");
        ApiError::database("Internal Server Error")
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        tracing::debug!(reason = %err, "Request not authenticated");
        ApiError::unauthorized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::ValidationError.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::DatabaseError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_auth_errors_collapse() {
        let missing = ApiError::from(AuthError::MissingCredential);
        let invalid = ApiError::from(AuthError::InvalidOrExpired);
        assert_eq!(missing.code, invalid.code);
        assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
        assert_eq!(missing.message, invalid.message);
    }

    #[test]
    fn test_database_error_hides_details() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal Server Error");
    }

    #[test]
    fn test_validation_message_names_field() {
        let err = ApiError::validation_field("role", "is too long");
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.message, "role: is too long");
    }
}
