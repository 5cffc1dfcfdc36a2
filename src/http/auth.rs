//! Account endpoints: register, login and the second factor

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::{AuthSession, LoginOutcome, TwoFactorSetup};

use super::error::AppError;
use super::middleware::AuthenticatedUser;

#[derive(Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
    username: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    Authenticated { user_id: Uuid, token: String },
    TwoFactorRequired { challenge_token: String },
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    challenge_token: String,
    code: String,
}

#[derive(Deserialize)]
pub struct CodeRequest {
    code: String,
}

#[derive(Serialize)]
pub struct BackupCodesResponse {
    backup_codes: Vec<String>,
}

pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthSession>), AppError> {
    let session = state
        .auth
        .register(&req.email, &req.password, &req.username)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let response = match state.auth.login(&req.email, &req.password).await? {
        LoginOutcome::Authenticated(session) => LoginResponse::Authenticated {
            user_id: session.user_id,
            token: session.token,
        },
        LoginOutcome::TwoFactorRequired { challenge_token } => {
            LoginResponse::TwoFactorRequired { challenge_token }
        }
    };
    Ok(Json(response))
}

pub async fn verify_two_factor_handler(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<AuthSession>, AppError> {
    let session = state
        .auth
        .verify_two_factor(&req.challenge_token, &req.code)
        .await?;
    Ok(Json(session))
}

pub async fn setup_two_factor_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<TwoFactorSetup>, AppError> {
    Ok(Json(state.auth.setup_two_factor(auth.user_id).await?))
}

pub async fn enable_two_factor_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<BackupCodesResponse>, AppError> {
    let backup_codes = state.auth.enable_two_factor(auth.user_id, &req.code).await?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}

pub async fn disable_two_factor_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<CodeRequest>,
) -> Result<StatusCode, AppError> {
    state.auth.disable_two_factor(auth.user_id, &req.code).await?;
    Ok(StatusCode::NO_CONTENT)
}
