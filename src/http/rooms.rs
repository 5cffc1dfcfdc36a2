//! Game room endpoints

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{GameRoom, RoomStatus};

use super::error::AppError;
use super::middleware::AuthenticatedUser;

#[derive(Serialize)]
pub struct RoomResponse {
    room: GameRoom,
    /// Relative socket path, token still to be appended by the client
    ws_path: String,
}

impl From<GameRoom> for RoomResponse {
    fn from(room: GameRoom) -> Self {
        let ws_path = format!("/ws?room_id={}", room.id);
        Self { room, ws_path }
    }
}

#[derive(Serialize)]
pub struct CurrentRoomResponse {
    room: Option<GameRoom>,
}

#[derive(Serialize)]
pub struct LeaveResponse {
    room_id: Uuid,
    room_closed: bool,
    /// Host after the departure, if the room survives
    host_id: Option<Uuid>,
    /// Leaving a running match concedes it
    forfeited: bool,
}

pub async fn list_rooms_handler(State(state): State<AppState>) -> Json<Vec<GameRoom>> {
    Json(state.games.list_waiting())
}

pub async fn create_room_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<(StatusCode, Json<RoomResponse>), AppError> {
    let display_name = state.profiles.display_name(auth.user_id).await;
    let room = state.games.create_room(auth.user_id, display_name)?;
    Ok((StatusCode::CREATED, Json(room.into())))
}

pub async fn join_room_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomResponse>, AppError> {
    let display_name = state.profiles.display_name(auth.user_id).await;
    let room = state
        .games
        .join_room(room_id, auth.user_id, display_name)
        .await?;
    Ok(Json(room.into()))
}

pub async fn leave_room_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<LeaveResponse>, AppError> {
    let departure = state.games.leave_room(auth.user_id).await?;
    Ok(Json(LeaveResponse {
        room_id: departure.room_id,
        room_closed: departure.deleted,
        host_id: departure.host_id,
        forfeited: departure.status == RoomStatus::InProgress,
    }))
}

pub async fn current_room_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Json<CurrentRoomResponse> {
    Json(CurrentRoomResponse {
        room: state.games.current_room(auth.user_id),
    })
}
