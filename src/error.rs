/// Unified error types for the moderation desk
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for report and appeal operations
#[derive(Error, Debug)]
pub enum ModerationError {
    /// Malformed or incomplete input
    #[error("Validation error: {0}")]
    Validation(String),

    /// An active report already exists for this reporter and target
    #[error("Duplicate report: {0}")]
    DuplicateReport(String),

    /// An appeal already exists for this appellant and cause
    #[error("Duplicate appeal: {0}")]
    DuplicateAppeal(String),

    /// Record absent or already deleted
    #[error("Not found: {0}")]
    NotFound(String),

    /// Actor lacks the role or ownership required
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Hard delete attempted on an appeal outside the deletable statuses
    #[error("Appeal {appeal_id} cannot be deleted while in status '{status}'")]
    NonDeletableStatus { appeal_id: String, status: String },

    /// Store or audit trail timed out or was unavailable
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Missing or invalid credentials on the HTTP surface
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Database errors that are neither transient nor constraint violations
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ModerationError {
    /// Only transient failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModerationError::Transient(_))
    }

    /// Stable label used for metrics and response bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ModerationError::Validation(_) => "ValidationError",
            ModerationError::DuplicateReport(_) => "DuplicateReport",
            ModerationError::DuplicateAppeal(_) => "DuplicateAppeal",
            ModerationError::NotFound(_) => "NotFound",
            ModerationError::Forbidden(_) => "Forbidden",
            ModerationError::NonDeletableStatus { .. } => "NonDeletableStatus",
            ModerationError::Transient(_) => "Transient",
            ModerationError::Authentication(_) => "AuthenticationRequired",
            ModerationError::Database(_)
            | ModerationError::Io(_)
            | ModerationError::Internal(_) => "InternalServerError",
        }
    }
}

/// Busy/locked databases, exhausted pools and broken connections are
/// transient; everything else the driver reports is internal.
impl From<sqlx::Error> for ModerationError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                ModerationError::Transient(err.to_string())
            }
            sqlx::Error::Database(db_err) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
                let busy = db_err
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| matches!(code & 0xff, 5 | 6))
                    .unwrap_or(false);
                if busy {
                    ModerationError::Transient(err.to_string())
                } else {
                    ModerationError::Database(err)
                }
            }
            _ => ModerationError::Database(err),
        }
    }
}

/// Malformed request bodies and query strings are caller errors
impl From<JsonRejection> for ModerationError {
    fn from(rejection: JsonRejection) -> Self {
        ModerationError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ModerationError {
    fn from(rejection: QueryRejection) -> Self {
        ModerationError::Validation(rejection.body_text())
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert ModerationError to HTTP response
impl IntoResponse for ModerationError {
    fn into_response(self) -> Response {
        let status = match &self {
            ModerationError::Validation(_) => StatusCode::BAD_REQUEST,
            ModerationError::DuplicateReport(_)
            | ModerationError::DuplicateAppeal(_)
            | ModerationError::NonDeletableStatus { .. } => StatusCode::CONFLICT,
            ModerationError::NotFound(_) => StatusCode::NOT_FOUND,
            ModerationError::Forbidden(_) => StatusCode::FORBIDDEN,
            ModerationError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            ModerationError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ModerationError::Database(_)
            | ModerationError::Io(_)
            | ModerationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed with internal error");
            "Internal server error".to_string() // Don't leak details
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for moderation operations
pub type ModResult<T> = Result<T, ModerationError>;
