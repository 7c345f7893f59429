//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use tabula_types::error::{RegistryError, SessionError, StoreError};

use super::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Session(SessionError),
    Registry(RegistryError),
    /// Malformed request input.
    Validation(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        AppError::Registry(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Session(e.into())
    }
}

impl AppError {
    /// Status code and machine-readable error code.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Registry(RegistryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND")
            }
            AppError::Registry(RegistryError::Busy(_)) => (StatusCode::CONFLICT, "SESSION_BUSY"),
            AppError::Session(SessionError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "DATASET_NOT_FOUND")
            }
            AppError::Session(SessionError::ImmutabilityViolation { .. }) => {
                (StatusCode::CONFLICT, "IMMUTABILITY_VIOLATION")
            }
            AppError::Session(SessionError::InvalidStep { .. } | SessionError::NotLoaded) => {
                (StatusCode::CONFLICT, "INVALID_STEP")
            }
            AppError::Session(SessionError::Cancelled) => (StatusCode::CONFLICT, "SESSION_CANCELLED"),
            AppError::Session(SessionError::Dataset(_)) | AppError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::Session(SessionError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::Session(e) => e.to_string(),
            AppError::Registry(e) => e.to_string(),
            AppError::Validation(msg) | AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(code, error = %self.message(), "request failed");
        }
        let body = ApiResponse::error(code, &self.message());
        (status, axum::Json(body)).into_response()
    }
}
