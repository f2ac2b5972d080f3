//! Authentication error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Malformed token")]
    TokenMalformed,

    #[error("Token signature mismatch")]
    TokenSignatureInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Insufficient role")]
    InsufficientRole,

    #[error("Identity has no role assigned")]
    MissingRole,

    #[error("Request path is not canonical")]
    InvalidPath,

    #[error("Invalid auth configuration: {0}")]
    Configuration(String),

    #[error("Token signing error: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Credential store error: {0}")]
    Database(#[from] gateway_db::DbError),
}

impl AuthError {
    /// Whether the error is a server-side failure rather than a client rejection
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthError::Configuration(_)
                | AuthError::Signing(_)
                | AuthError::PasswordHash(_)
                | AuthError::Database(_)
        )
    }

    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::TokenMalformed => "token_malformed",
            AuthError::TokenSignatureInvalid => "token_signature_invalid",
            AuthError::TokenExpired => "token_expired",
            AuthError::MissingToken => "missing_token",
            AuthError::InsufficientRole => "insufficient_role",
            AuthError::MissingRole => "missing_role",
            AuthError::InvalidPath => "invalid_path",
            AuthError::Configuration(_) => "configuration",
            AuthError::Signing(_) => "signing",
            AuthError::PasswordHash(_) => "password_hash",
            AuthError::Database(_) => "database",
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        if self.is_internal() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else if matches!(self, AuthError::InsufficientRole) {
            StatusCode::FORBIDDEN
        } else if matches!(self, AuthError::InvalidPath) {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::UNAUTHORIZED
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Causes stay in the logs; callers only learn the status class.
        let message = match status {
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::BAD_REQUEST => "Bad request",
            _ => "Internal error",
        };

        let body = axum::Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
