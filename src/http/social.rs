//! Profile, search and friend endpoints

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::social::friends::{FriendshipView, PendingRequests};
use crate::social::profiles::{MeView, ProfileView};

use super::error::AppError;
use super::middleware::AuthenticatedUser;

// ============================================================================
// Profiles
// ============================================================================

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    username: String,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

pub async fn me_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<MeView>, AppError> {
    Ok(Json(state.profiles.me(auth.user_id).await?))
}

pub async fn profile_handler(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(state.profiles.get(user_id).await?))
}

pub async fn update_profile_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(state.profiles.rename(auth.user_id, &req.username).await?))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ProfileView>>, AppError> {
    Ok(Json(state.profiles.search(auth.user_id, &query.q).await?))
}

// ============================================================================
// Friends
// ============================================================================

#[derive(Deserialize)]
pub struct FriendRequestBody {
    username: String,
}

pub async fn friends_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<FriendshipView>>, AppError> {
    Ok(Json(state.friends.friends(auth.user_id).await?))
}

pub async fn friend_requests_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<PendingRequests>, AppError> {
    Ok(Json(state.friends.pending(auth.user_id).await?))
}

pub async fn send_friend_request_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<FriendRequestBody>,
) -> Result<(StatusCode, Json<FriendshipView>), AppError> {
    let friendship = state.friends.request(auth.user_id, &req.username).await?;
    Ok((StatusCode::CREATED, Json(friendship)))
}

pub async fn accept_friend_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<FriendshipView>, AppError> {
    Ok(Json(state.friends.accept(auth.user_id, request_id).await?))
}

pub async fn decline_friend_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(request_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.friends.decline(auth.user_id, request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_friend_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(other_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.friends.remove(auth.user_id, other_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
