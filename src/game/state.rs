//! Authoritative match state, serialized as-is in `state` snapshots

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::time::TICK_RATE;

/// Match status as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Waiting for both players to connect, or counting down
    Waiting,
    InProgress,
    Finished,
}

/// Paddle movement intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    #[default]
    None,
}

impl Direction {
    /// Sign along the y axis (y grows downward)
    pub fn sign(self) -> f32 {
        match self {
            Direction::Up => -1.0,
            Direction::Down => 1.0,
            Direction::None => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Per-match constants; fixed once the match is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConstants {
    pub canvas_width: f32,
    pub canvas_height: f32,
    pub paddle_width: f32,
    pub paddle_height: f32,
    /// Gap between a paddle and its side wall
    pub paddle_offset: f32,
    /// Pixels per second
    pub paddle_speed: f32,
    /// Ball edge length (the ball is a square)
    pub ball_size: f32,
    /// Serve speed, pixels per second
    pub ball_speed: f32,
    pub max_ball_speed: f32,
    /// Speed multiplier applied on every paddle hit
    pub ball_speedup: f32,
    /// Largest outgoing angle off a paddle edge, in degrees
    pub max_bounce_angle_deg: f32,
    pub tick_rate: u32,
    pub match_duration_secs: u32,
    pub points_to_win: u32,
    pub countdown_secs: u32,
    /// Pause between a point and the next serve
    pub serve_delay_secs: f32,
}

impl Default for GameConstants {
    fn default() -> Self {
        Self {
            canvas_width: 800.0,
            canvas_height: 500.0,
            paddle_width: 10.0,
            paddle_height: 80.0,
            paddle_offset: 20.0,
            paddle_speed: 360.0,
            ball_size: 10.0,
            ball_speed: 300.0,
            max_ball_speed: 900.0,
            ball_speedup: 1.05,
            max_bounce_angle_deg: 60.0,
            tick_rate: TICK_RATE,
            match_duration_secs: 120,
            points_to_win: 5,
            countdown_secs: 3,
            serve_delay_secs: 1.0,
        }
    }
}

impl GameConstants {
    /// x of the paddle's left edge
    pub fn paddle_x(&self, side: Side) -> f32 {
        match side {
            Side::Left => self.paddle_offset,
            Side::Right => self.canvas_width - self.paddle_offset - self.paddle_width,
        }
    }

    /// y that centres a paddle vertically
    pub fn paddle_start_y(&self) -> f32 {
        (self.canvas_height - self.paddle_height) / 2.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timer {
    pub remaining_secs: f32,
    pub elapsed_secs: f32,
}

/// Ball centre and velocity (pixels, pixels per second)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Ball {
    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paddle {
    /// Owner; empty until the seat is taken
    pub user_id: Option<Uuid>,
    /// Top edge
    pub y: f32,
    pub direction: Direction,
    /// Last applied input sequence number
    pub last_input_seq: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub left: u32,
    pub right: u32,
}

impl Score {
    pub fn add(&mut self, side: Side) {
        match side {
            Side::Left => self.left += 1,
            Side::Right => self.right += 1,
        }
    }

    pub fn of(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// Side ahead on points, `None` when level
    pub fn leader(&self) -> Option<Side> {
        match self.left.cmp(&self.right) {
            std::cmp::Ordering::Greater => Some(Side::Left),
            std::cmp::Ordering::Less => Some(Side::Right),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub status: GameStatus,
    pub constants: GameConstants,
    pub timer: Timer,
    pub ball: Ball,
    pub left: Paddle,
    pub right: Paddle,
    pub score: Score,
    /// Set when the match ends with a winner; stays empty on a draw
    pub winner: Option<Uuid>,
}

impl GameState {
    pub fn new(constants: GameConstants) -> Self {
        let paddle = Paddle {
            user_id: None,
            y: constants.paddle_start_y(),
            direction: Direction::None,
            last_input_seq: 0,
        };
        Self {
            status: GameStatus::Waiting,
            timer: Timer {
                remaining_secs: constants.match_duration_secs as f32,
                elapsed_secs: 0.0,
            },
            ball: Ball {
                x: constants.canvas_width / 2.0,
                y: constants.canvas_height / 2.0,
                vx: 0.0,
                vy: 0.0,
            },
            left: paddle.clone(),
            right: paddle,
            score: Score::default(),
            winner: None,
            constants,
        }
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn side_of(&self, user_id: Uuid) -> Option<Side> {
        if self.left.user_id == Some(user_id) {
            Some(Side::Left)
        } else if self.right.user_id == Some(user_id) {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Side that has reached the points target, if any
    pub fn score_limit_reached(&self) -> Option<Side> {
        let target = self.constants.points_to_win;
        [Side::Left, Side::Right]
            .into_iter()
            .find(|side| self.score.of(*side) >= target)
    }

    pub fn user_on(&self, side: Side) -> Option<Uuid> {
        self.paddle(side).user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paddles_start_centred_and_inset() {
        let state = GameState::new(GameConstants::default());
        let c = &state.constants;
        assert_eq!(state.left.y, 210.0);
        assert_eq!(c.paddle_x(Side::Left), 20.0);
        assert_eq!(c.paddle_x(Side::Right), 770.0);
        assert_eq!(state.timer.remaining_secs, 120.0);
        assert_eq!(state.status, GameStatus::Waiting);
    }

    #[test]
    fn leader_and_limit() {
        let mut state = GameState::new(GameConstants::default());
        assert_eq!(state.score.leader(), None);
        state.score.add(Side::Right);
        assert_eq!(state.score.leader(), Some(Side::Right));
        assert_eq!(state.score_limit_reached(), None);
        state.score.right = state.constants.points_to_win;
        assert_eq!(state.score_limit_reached(), Some(Side::Right));
    }

    #[test]
    fn serializes_status_and_direction_like_the_client_expects() {
        let state = GameState::new(GameConstants::default());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "WAITING");
        assert_eq!(json["left"]["direction"], "none");
        assert!(json["winner"].is_null());
        assert_eq!(json["constants"]["tick_rate"], 60);
    }
}
