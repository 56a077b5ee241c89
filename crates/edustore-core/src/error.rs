// Error codes and the API error envelope shared by every EduStore crate.
//
// `ErrorCode` is the machine-readable half of a failure, `ApiError` pairs it
// with an HTTP status and the human-readable message sent as `{ "error": .. }`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-readable error codes returned next to the `error` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    InvalidToken,
    InvalidOrExpiredCode,
    Forbidden,
    NotFound,
    UserNotFound,
    AdminNotFound,
    OrderNotFound,
    DownloadNotAvailable,
    Conflict,
    UserAlreadyExists,
    AdminHasOrders,
    InvalidStatusTransition,
    RateLimited,
    InternalServerError,
}

impl ErrorCode {
    /// The code as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidOrExpiredCode => "INVALID_OR_EXPIRED_CODE",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::AdminNotFound => "ADMIN_NOT_FOUND",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::DownloadNotAvailable => "DOWNLOAD_NOT_AVAILABLE",
            Self::Conflict => "CONFLICT",
            Self::UserAlreadyExists => "USER_ALREADY_EXISTS",
            Self::AdminHasOrders => "ADMIN_HAS_ORDERS",
            Self::InvalidStatusTransition => "INVALID_STATUS_TRANSITION",
            Self::RateLimited => "RATE_LIMITED",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::ValidationError => "Invalid request",
            Self::Unauthorized => "Access denied. No token provided.",
            Self::InvalidToken => "Invalid token",
            Self::InvalidOrExpiredCode => "Invalid or expired OTP",
            Self::Forbidden => "Access denied. Insufficient permissions.",
            Self::NotFound => "Not found",
            Self::UserNotFound => "User not found",
            Self::AdminNotFound => "Admin not found",
            Self::OrderNotFound => "Order not found",
            Self::DownloadNotAvailable => "Download not available",
            Self::Conflict => "Conflict",
            Self::UserAlreadyExists => "User with this email already exists",
            Self::AdminHasOrders => "Admin has orders and cannot be deleted",
            Self::InvalidStatusTransition => "Invalid status transition",
            Self::RateLimited => "Too many requests",
            Self::InternalServerError => "Internal server error",
        };
        write!(f, "{msg}")
    }
}

/// HTTP status codes used by the API error system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpStatus {
    Ok = 200,
    Created = 201,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    Conflict = 409,
    TooManyRequests = 429,
    InternalServerError = 500,
}

impl HttpStatus {
    pub fn status_code(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code())
    }
}

/// API error: an HTTP status, an error code and the message shown to the caller.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status} {code:?}: {message}")]
pub struct ApiError {
    pub status: HttpStatus,
    pub code: ErrorCode,
    pub message: String,
    /// Seconds the caller should wait before retrying (429 only).
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: HttpStatus, code: ErrorCode) -> Self {
        Self {
            message: code.to_string(),
            status,
            code,
            retry_after: None,
        }
    }

    pub fn with_message(status: HttpStatus, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn bad_request(code: ErrorCode) -> Self {
        Self::new(HttpStatus::BadRequest, code)
    }

    pub fn unauthorized(code: ErrorCode) -> Self {
        Self::new(HttpStatus::Unauthorized, code)
    }

    pub fn forbidden(code: ErrorCode) -> Self {
        Self::new(HttpStatus::Forbidden, code)
    }

    pub fn not_found(code: ErrorCode) -> Self {
        Self::new(HttpStatus::NotFound, code)
    }

    pub fn conflict(code: ErrorCode) -> Self {
        Self::new(HttpStatus::Conflict, code)
    }

    pub fn internal() -> Self {
        Self::new(HttpStatus::InternalServerError, ErrorCode::InternalServerError)
    }

    pub fn too_many_requests(message: impl Into<String>, retry_after: u64) -> Self {
        Self {
            status: HttpStatus::TooManyRequests,
            code: ErrorCode::RateLimited,
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }

    /// Build the JSON body for the error response.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.message,
            "code": self.code,
        });
        if let Some(retry_after) = self.retry_after {
            body["retryAfter"] = serde_json::json!(retry_after);
        }
        body
    }
}

/// Internal (non-HTTP) error raised by storage backends, configuration
/// loading and other infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum EduStoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unique constraint violated on {model}.{field}")]
    UniqueViolation { model: String, field: String },

    /// A delete was refused because other rows still reference the row.
    #[error("{model} row is still referenced by {referenced_by}")]
    ForeignKeyViolation { model: String, referenced_by: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<serde_json::Error> for EduStoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Unified result type for EduStore infrastructure.
pub type Result<T> = std::result::Result<T, EduStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::DownloadNotAvailable).unwrap();
        assert_eq!(json, "\"DOWNLOAD_NOT_AVAILABLE\"");
        assert_eq!(ErrorCode::DownloadNotAvailable.as_str(), "DOWNLOAD_NOT_AVAILABLE");
    }

    #[test]
    fn test_api_error_json_has_error_field() {
        let err = ApiError::not_found(ErrorCode::OrderNotFound);
        let body = err.to_json();
        assert_eq!(body["error"], "Order not found");
        assert_eq!(body["code"], "ORDER_NOT_FOUND");
        assert!(body.get("retryAfter").is_none());
        assert_eq!(err.status.status_code(), 404);
    }

    #[test]
    fn test_too_many_requests_carries_retry_after() {
        let err = ApiError::too_many_requests("Please wait 1 minute before requesting another OTP", 60);
        let body = err.to_json();
        assert_eq!(body["retryAfter"], 60);
        assert_eq!(err.status, HttpStatus::TooManyRequests);
    }

    #[test]
    fn test_unique_violation_display() {
        let err = EduStoreError::UniqueViolation {
            model: "user".into(),
            field: "email".into(),
        };
        assert_eq!(err.to_string(), "Unique constraint violated on user.email");
    }
}
