//! Session manager error types.
//!
//! All errors map to one HTTP status code via the `IntoResponse` impl.
//! Messages returned to clients stay generic where the underlying cause
//! could leak internal details; the actual errors are logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Session manager error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401
/// - Forbidden: 403
/// - NotFound: 404
/// - Conflict: 409
/// - PreconditionRequired: 428
/// - Database, Internal: 500
/// - NotImplemented: 501
/// - BadGateway: 502
/// - ServiceUnavailable: 503
#[derive(Debug, Error)]
pub enum SmError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition required: {0}")]
    PreconditionRequired(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Not implemented")]
    NotImplemented,

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl SmError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            SmError::Unauthorized(_) => 401,
            SmError::Forbidden(_) => 403,
            SmError::NotFound(_) => 404,
            SmError::Conflict(_) => 409,
            SmError::PreconditionRequired(_) => 428,
            SmError::Database(_) | SmError::Internal(_) => 500,
            SmError::NotImplemented => 501,
            SmError::BadGateway(_) => 502,
            SmError::ServiceUnavailable(_) => 503,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for SmError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            SmError::Unauthorized(reason) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", reason.clone())
            }
            SmError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            SmError::NotFound(resource) => (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone()),
            SmError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            SmError::PreconditionRequired(reason) => (
                StatusCode::PRECONDITION_REQUIRED,
                "PRECONDITION_REQUIRED",
                reason.clone(),
            ),
            SmError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "sm.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            SmError::Internal(err) => {
                tracing::error!(target: "sm.internal", error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            SmError::NotImplemented => (
                StatusCode::NOT_IMPLEMENTED,
                "NOT_IMPLEMENTED",
                "Not implemented".to_string(),
            ),
            SmError::BadGateway(reason) => {
                tracing::warn!(target: "sm.gateway", reason = %reason, "Upstream dependency failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "BAD_GATEWAY",
                    "An upstream dependency failed".to_string(),
                )
            }
            SmError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "sm.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) =
                "Bearer realm=\"session-manager\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

/// Convert sqlx errors to SmError.
///
/// Row lookups that come back empty map to NotFound; constraint
/// violations keep their semantics (duplicate key -> Conflict, missing
/// foreign row -> PreconditionRequired).
impl From<sqlx::Error> for SmError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => SmError::NotFound("no such row".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                SmError::Conflict("row already exists".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                SmError::PreconditionRequired("referenced row does not exist".to_string())
            }
            _ => SmError::Database(err.to_string()),
        }
    }
}
