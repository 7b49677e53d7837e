//! Authentication errors.
//!
//! Failures on the authenticated REST/WS surface. A failed dev login is not
//! represented here; the login handler answers it directly with an API-level
//! unauthorized response.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials on a request that requires them.
    #[error("missing authorization header")]
    MissingAuthHeader,

    /// Authorization header present but not a well-formed bearer token.
    #[error("invalid authorization header format")]
    InvalidAuthHeader,

    /// Token failed signature or claim validation.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    /// Authenticated, but the role does not permit the operation.
    #[error("insufficient permissions: {0}")]
    InsufficientPermissions(String),

    /// A `dev:` token named a user that is not configured.
    #[error("user not found")]
    UserNotFound,

    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_)
            | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::InsufficientPermissions(_) => "insufficient_permissions",
            AuthError::UserNotFound => "user_not_found",
            AuthError::Internal(_) => "internal_error",
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorResponse {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });

        (status, body).into_response()
    }
}
