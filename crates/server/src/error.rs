//! Structured errors for the admin REST surface.
//!
//! Every variant maps to an HTTP status and a JSON body
//! `{ "code": ..., "message": ... }`. Storage and remote failures never echo
//! their underlying text to the client.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pagemirror_core::Error;
use serde::Serialize;

/// Structured errors for the admin REST surface.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request parameters or body.
    #[error("{0}")]
    InvalidParam(String),

    #[error("{0}")]
    NotFound(String),

    /// A slug or page type is already taken.
    #[error("{0}")]
    Conflict(String),

    /// Not signed in, or the platform rejected the stored credentials.
    #[error("{0}")]
    Auth(String),

    #[error("a sync is already running")]
    SyncInProgress,

    /// The content platform could not be reached or answered with an error.
    #[error("the content platform request failed")]
    Remote(#[source] Error),

    #[error("storage failure")]
    Storage(#[source] Error),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidParam(_) | ApiError::Auth(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::SyncInProgress => StatusCode::CONFLICT,
            ApiError::Remote(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidParam(_) => "rest_invalid_param",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "name_conflict",
            ApiError::Auth(_) => "auth_error",
            ApiError::SyncInProgress => "sync_in_progress",
            ApiError::Remote(_) => "remote_error",
            ApiError::Storage(_) => "storage_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => ApiError::InvalidParam(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::Auth(msg) => ApiError::Auth(msg),
            Error::SyncInProgress => ApiError::SyncInProgress,
            e if e.is_constraint_violation() => ApiError::Conflict("slug or page type is already in use".into()),
            e if e.is_storage() => ApiError::Storage(e),
            e => ApiError::Remote(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Storage(source) | ApiError::Remote(source) => {
                tracing::error!(error = %source, code = self.code(), "admin request failed");
            }
            _ => tracing::debug!(error = %self, code = self.code(), "admin request rejected"),
        }

        let body = ErrorBody { code: self.code(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}
