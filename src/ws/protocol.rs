//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::state::{Direction, GameState, Score, Side};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Paddle intent
    Input {
        direction: Direction,
        /// Sequence number; stale or repeated values are ignored
        seq: u32,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the room (a forfeit once the match is running)
    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        user_id: Uuid,
        room_id: Uuid,
        server_time: u64,
    },

    /// Participant took a seat or connected
    PlayerJoined {
        player: PlayerInfo,
    },

    /// Participant left the room or dropped its last connection
    PlayerLeft {
        user_id: Uuid,
        reason: String,
    },

    /// Countdown before the first serve, once per whole second
    Countdown {
        seconds_remaining: u32,
    },

    /// Game state snapshot (sent at regular intervals)
    State {
        /// Server tick number
        tick: u64,
        /// Seconds until the first serve while counting down
        countdown: Option<f32>,
        state: GameState,
    },

    /// Match has ended; `winner` is empty on a draw or abandonment
    MatchEnd {
        winner: Option<Uuid>,
        score: Score,
        reason: EndReason,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Participant info for room events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub user_id: Uuid,
    pub display_name: String,
    /// Seat once assigned: "left" for the host, "right" for the guest
    pub side: Option<Side>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A player reached the points target
    ScoreLimit,
    /// The match clock ran out
    TimeUp,
    /// A player left or disconnected mid-match
    Forfeit,
    /// Nobody remained in the room
    Abandoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_messages() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"input","direction":"up","seq":4}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMsg::Input { direction: Direction::Up, seq: 4 }
        ));

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"ping","t":17}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Ping { t: 17 }));

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"leave"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Leave));

        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"input","direction":"left","seq":1}"#).is_err());
    }

    #[test]
    fn match_end_wire_shape() {
        let msg = ServerMsg::MatchEnd {
            winner: None,
            score: Score { left: 2, right: 2 },
            reason: EndReason::TimeUp,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "match_end");
        assert!(json["winner"].is_null());
        assert_eq!(json["score"]["left"], 2);
        assert_eq!(json["reason"], "time_up");
    }
}
