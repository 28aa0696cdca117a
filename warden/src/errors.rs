use crate::cache::CacheError;
use crate::db::errors::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;

/// Infrastructure-level failure. These terminate the current operation and
/// surface a generic message; expected business outcomes use [`Denial`].
#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided or not valid
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Authenticated user lacks the permission code required by the route
    #[error("Insufficient permissions: {permission} required")]
    InsufficientPermissions { permission: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Cache store operation error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { permission } => {
                format!("Insufficient permissions: {permission} required")
            }
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Cache(_) => "Internal server error".to_string(),
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details; the response body carries only the user-safe message
        match &self {
            Error::Database(DbError::Other(_)) | Error::Cache(_) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

/// The business outcome of an operation: either the value or a [`Denial`].
///
/// Services return `Result<Outcome<T>>` so that infrastructure failures and
/// expected rejections stay on separate tracks and callers must branch on
/// the rejection explicitly instead of unwinding through it.
pub type Outcome<T> = std::result::Result<T, Denial>;

/// Classification of a business-expected rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenialKind {
    CaptchaInvalid,
    UserNameInvalid,
    PasswordInvalid,
    Conflict,
    NotAcceptable,
    NotFound,
}

impl DenialKind {
    /// Transport mapping, applied only at the HTTP boundary.
    pub fn status_code(self) -> StatusCode {
        match self {
            DenialKind::CaptchaInvalid | DenialKind::UserNameInvalid | DenialKind::PasswordInvalid => StatusCode::BAD_REQUEST,
            DenialKind::Conflict => StatusCode::CONFLICT,
            DenialKind::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            DenialKind::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

/// A business-expected failure carried as data rather than an error.
///
/// Captcha mismatch, bad credentials, name conflicts and the role guards are
/// routine user-facing outcomes; they never travel through `?`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub kind: DenialKind,
    pub message: String,
}

impl Denial {
    pub fn new(kind: DenialKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn captcha_invalid() -> Self {
        Self::new(DenialKind::CaptchaInvalid, "Captcha is invalid")
    }

    pub fn user_name_invalid() -> Self {
        Self::new(DenialKind::UserNameInvalid, "UserName is invalid")
    }

    pub fn password_invalid() -> Self {
        Self::new(DenialKind::PasswordInvalid, "Password is invalid")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(DenialKind::Conflict, message)
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::new(DenialKind::NotAcceptable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(DenialKind::NotFound, message)
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        tracing::debug!("Request denied: {:?}: {}", self.kind, self.message);
        let body = serde_json::json!({ "message": self.message });
        (self.kind.status_code(), axum::response::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_status_codes() {
        assert_eq!(Denial::captcha_invalid().kind.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Denial::user_name_invalid().kind.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Denial::password_invalid().kind.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Denial::conflict("x").kind.status_code(), StatusCode::CONFLICT);
        assert_eq!(Denial::not_acceptable("x").kind.status_code(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(Denial::not_found("x").kind.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_hard_error_messages_do_not_leak() {
        let err = Error::Internal {
            operation: "connect to secret backend at 10.0.0.1".to_string(),
        };
        assert_eq!(err.user_message(), "Internal server error");
    }
}
