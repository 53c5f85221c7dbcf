use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Every failure the credential core can report to its caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("user not found")]
    NotFound,
    #[error("invalid credentials")]
    Unauthorized,
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("hashing error: {0}")]
    Hashing(String),
    #[error("signing error: {0}")]
    Signing(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AuthError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            AuthError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AuthError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            AuthError::Unauthorized | AuthError::MissingToken => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, "token_invalid"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired"),
            AuthError::Store(_) | AuthError::Hashing(_) | AuthError::Signing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

/// Malformed or incomplete request bodies are client errors like any other
/// validation failure.
impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error: kind, message })).into_response()
    }
}
