//! HTTP-facing error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::error;

use crate::auth::AuthError;
use crate::game::RoomError;
use crate::social::SocialError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests")]
    TooManyRequests,

    /// Logged, never shown to the client
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests".to_string(),
            ),
            AppError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingHeader
            | AuthError::InvalidFormat
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::InvalidCredentials
            | AuthError::InvalidCode => AppError::Unauthorized(e.to_string()),
            AuthError::TwoFactorAlreadyEnabled
            | AuthError::TwoFactorNotEnabled
            | AuthError::TwoFactorNotPending
            | AuthError::Validation(_) => AppError::BadRequest(e.to_string()),
            AuthError::Conflict(what) => AppError::Conflict(what.to_string()),
            AuthError::RateLimited => AppError::TooManyRequests,
            AuthError::Store(e) => AppError::Internal(e.to_string()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<SocialError> for AppError {
    fn from(e: SocialError) -> Self {
        match e {
            SocialError::Validation(msg) => AppError::BadRequest(msg),
            SocialError::NotFound(_) => AppError::NotFound(e.to_string()),
            SocialError::Forbidden(_) => AppError::Forbidden(e.to_string()),
            SocialError::Conflict(what) => AppError::Conflict(what.to_string()),
            SocialError::Store(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<RoomError> for AppError {
    fn from(e: RoomError) -> Self {
        match e {
            RoomError::NotFound => AppError::NotFound(e.to_string()),
            RoomError::NotInRoom => AppError::NotFound(e.to_string()),
            RoomError::AlreadyInRoom(_) | RoomError::NotJoinable | RoomError::Full => {
                AppError::Conflict(e.to_string())
            }
        }
    }
}
