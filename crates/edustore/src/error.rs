// Domain errors.
//
// Every operation of the service returns `ServiceError`; the HTTP layer turns
// it into the core `ApiError` envelope with `to_api_error()`.

use edustore_core::error::{ApiError, EduStoreError, ErrorCode, HttpStatus};

use crate::store::StoreError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    /// Missing or malformed input (400).
    #[error("{0}")]
    Validation(String),

    /// No bearer token, or a token that does not verify (401).
    #[error("Access denied. No token provided.")]
    Unauthorized,

    /// A token presented for refresh failed signature or expiry checks (401).
    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid or expired OTP")]
    InvalidOrExpiredCode,

    #[error("Access denied. Insufficient permissions.")]
    Forbidden,

    /// Absent, or present but not visible to the caller (404).
    #[error("{0}")]
    NotFound(ErrorCode),

    /// Uniform refusal for every failed redemption (404).
    #[error("Download not available")]
    DownloadNotAvailable,

    #[error("{message}")]
    Conflict { code: ErrorCode, message: String },

    #[error("{message}")]
    RateLimited { retry_after: u64, message: String },

    /// Unexpected store or transport failure. The detail is logged, never returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        match self {
            Self::Validation(msg) => {
                ApiError::with_message(HttpStatus::BadRequest, ErrorCode::ValidationError, msg)
            }
            Self::Unauthorized => ApiError::unauthorized(ErrorCode::Unauthorized),
            Self::InvalidToken => ApiError::unauthorized(ErrorCode::InvalidToken),
            Self::InvalidOrExpiredCode => ApiError::bad_request(ErrorCode::InvalidOrExpiredCode),
            Self::Forbidden => ApiError::forbidden(ErrorCode::Forbidden),
            Self::NotFound(code) => ApiError::not_found(*code),
            Self::DownloadNotAvailable => ApiError::not_found(ErrorCode::DownloadNotAvailable),
            Self::Conflict { code, message } => {
                ApiError::with_message(HttpStatus::Conflict, *code, message)
            }
            Self::RateLimited {
                retry_after,
                message,
            } => ApiError::too_many_requests(message, *retry_after),
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                ApiError::internal()
            }
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate { model, field } => Self::conflict(
                ErrorCode::Conflict,
                format!("A {model} with this {field} already exists"),
            ),
            StoreError::Referenced { model, .. } => Self::conflict(
                ErrorCode::Conflict,
                format!("This {model} is still in use and cannot be deleted"),
            ),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<EduStoreError> for ServiceError {
    fn from(e: EduStoreError) -> Self {
        StoreError::from(e).into()
    }
}
