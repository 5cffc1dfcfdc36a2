//! Authentication middleware

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::AuthError;

use super::error::AppError;

/// Authenticated user extractor result
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

/// Middleware to require a valid access token
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = match &bearer {
        Some(TypedHeader(Authorization(bearer))) => bearer.token(),
        None if request.headers().contains_key(header::AUTHORIZATION) => {
            return Err(AuthError::InvalidFormat.into());
        }
        None => return Err(AuthError::MissingHeader.into()),
    };

    let claims = state.auth.authenticate(token)?;

    let auth_user = AuthenticatedUser {
        user_id: claims.sub,
    };

    // Insert into request extensions for handlers to access
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}
