//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{GameService, MatchEvent, MatchHandle};
use crate::http::AppError;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Direct replies (pong, errors) queued ahead of room broadcasts
const DIRECT_CHANNEL_SIZE: usize = 16;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Access token
    pub token: String,
    pub room_id: Uuid,
}

/// Checks the token and the caller's seat before upgrading
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let claims = match state.auth.authenticate(&query.token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            return AppError::from(e).into_response();
        }
    };
    let user_id = claims.sub;

    let Some(handle) = state.games.match_for(user_id, query.room_id) else {
        warn!(user_id = %user_id, room_id = %query.room_id, "WebSocket for a room the user is not in");
        return (
            StatusCode::FORBIDDEN,
            axum::Json(serde_json::json!({ "error": "Not a participant of this room" })),
        )
            .into_response();
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    info!(user_id = %user_id, room_id = %query.room_id, "WebSocket upgrade for room participant");
    let games = state.games.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, handle, games))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, handle: MatchHandle, games: GameService) {
    let room_id = handle.room_id;
    info!(user_id = %user_id, room_id = %room_id, "New WebSocket connection");

    // Subscribe before announcing so the first snapshot is not missed
    let snapshot_rx = handle.subscribe();
    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        user_id,
        room_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(user_id = %user_id, error = %e, "Failed to send welcome");
        return;
    }

    if !handle.send(MatchEvent::Connected { user_id }).await {
        let _ = send_msg(&mut ws_sink, &ServerMsg::error("room_closed", "Match is over")).await;
        return;
    }

    let left = run_session(user_id, &handle, &games, ws_sink, ws_stream, snapshot_rx).await;

    if !left {
        handle.send(MatchEvent::Disconnected { user_id }).await;
    }
    info!(user_id = %user_id, room_id = %room_id, "WebSocket connection closed");
}

/// Pump messages both ways until the socket closes. Returns true when the
/// client left the room explicitly.
async fn run_session(
    user_id: Uuid,
    handle: &MatchHandle,
    games: &GameService,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut snapshot_rx: broadcast::Receiver<ServerMsg>,
) -> bool {
    let rate_limiter = ConnectionRateLimiter::new();
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerMsg>(DIRECT_CHANNEL_SIZE);

    // Spawn writer task: direct replies and room broadcasts -> WebSocket
    let writer_user_id = user_id;
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => break,
                },
                received = snapshot_rx.recv() => match received {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Continue - don't disconnect for lag
                        warn!(user_id = %writer_user_id, lagged_count = n, "Client lagged, skipping snapshots");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(user_id = %writer_user_id, "Room channel closed");
                        break;
                    }
                },
            };

            let last = matches!(msg, ServerMsg::MatchEnd { .. });
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(user_id = %writer_user_id, error = %e, "WebSocket send failed");
                break;
            }
            if last {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    });

    let mut left = false;

    // Reader loop: WebSocket -> engine
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let parsed = serde_json::from_str::<ClientMsg>(&text);
                if !admitted(&parsed, &rate_limiter) {
                    warn!(user_id = %user_id, "Rate limited input message");
                    continue;
                }

                match parsed {
                    Ok(ClientMsg::Input { direction, seq }) => {
                        let event = MatchEvent::Input {
                            user_id,
                            direction,
                            seq,
                        };
                        if !handle.send(event).await {
                            debug!(user_id = %user_id, "Engine stopped");
                            break;
                        }
                    }
                    Ok(ClientMsg::Ping { t }) => {
                        let pong = ServerMsg::Pong {
                            t,
                            server_time: unix_millis(),
                        };
                        let _ = direct_tx.try_send(pong);
                    }
                    Ok(ClientMsg::Leave) => {
                        if let Err(e) = games.leave_room(user_id).await {
                            debug!(user_id = %user_id, error = %e, "Leave from socket failed");
                        }
                        left = true;
                        break;
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                        let _ = direct_tx.try_send(ServerMsg::error("bad_message", e.to_string()));
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
    left
}

/// Inputs and garbage share the per-connection budget; ping and leave
/// always get through
fn admitted(parsed: &Result<ClientMsg, serde_json::Error>, limiter: &ConnectionRateLimiter) -> bool {
    match parsed {
        Ok(ClientMsg::Ping { .. }) | Ok(ClientMsg::Leave) => true,
        Ok(ClientMsg::Input { .. }) | Err(_) => limiter.check_input(),
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::rate_limit::INPUT_RATE_LIMIT;

    fn parse(text: &str) -> Result<ClientMsg, serde_json::Error> {
        serde_json::from_str(text)
    }

    #[test]
    fn input_burst_does_not_block_ping_or_leave() {
        let limiter = ConnectionRateLimiter::new();
        let input = parse(r#"{"type":"input","direction":"up","seq":1}"#);
        for _ in 0..INPUT_RATE_LIMIT {
            assert!(admitted(&input, &limiter));
        }
        assert!(!admitted(&input, &limiter));
        assert!(!admitted(&parse("not json"), &limiter));

        assert!(admitted(&parse(r#"{"type":"ping","t":5}"#), &limiter));
        assert!(admitted(&parse(r#"{"type":"leave"}"#), &limiter));
    }
}
