use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{repository::StoreError, storage::StorageError};

/// AuthError
///
/// Token verification failures. Each variant maps to the `error` code a client uses
/// to decide between refreshing, re-authenticating, or attaching a token at all.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization token is required")]
    Missing,
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Missing => "authorization_required",
            AuthError::Expired => "token_expired",
            AuthError::Invalid => "invalid_token",
        }
    }
}

/// AppError
///
/// The HTTP-facing error taxonomy. Every handler returns `Result<_, AppError>`; the
/// lower layers' errors convert into it through `From`, so `?` is enough to surface
/// them with the right status and code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Unauthenticated(#[from] AuthError),
    #[error("{0}")]
    InvalidCredentials(&'static str),
    #[error("Admin access required")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(label: &str) -> Self {
        AppError::NotFound(format!("{label} not found"))
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Unauthenticated(e) => (StatusCode::UNAUTHORIZED, e.code()),
            AppError::InvalidCredentials(_) => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "admin_access_required"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::BAD_REQUEST, "conflict"),
            AppError::Unexpected(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    error: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            message: self.to_string(),
            error: code,
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => {
                AppError::Conflict(format!("A record with this {field} already exists"))
            }
            StoreError::MissingReference(field) => {
                AppError::Validation(format!("{field} does not reference an existing record"))
            }
            StoreError::Blocked(message) => AppError::Conflict(message.to_string()),
            StoreError::Database(e) => AppError::Unexpected(e.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::EmptyFile(_) => AppError::Validation(err.to_string()),
            StorageError::Io(_) => AppError::Unexpected(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_of(err: AppError) -> (StatusCode, Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn expired_token_maps_to_401_token_expired() {
        let (status, body) = body_of(AuthError::Expired.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "token_expired");
        assert_eq!(body["message"], "Token has expired");
    }

    #[tokio::test]
    async fn guarded_delete_is_a_400_conflict() {
        let err: AppError = StoreError::Blocked("Cannot delete department with staff members").into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "conflict");
        assert_eq!(body["message"], "Cannot delete department with staff members");
    }

    #[tokio::test]
    async fn unexpected_surfaces_underlying_message() {
        let (status, body) = body_of(AppError::Unexpected("disk full".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "disk full");
    }
}
