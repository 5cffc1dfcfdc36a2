//! Game rooms and the Pong simulation

pub mod engine;
pub mod physics;
pub mod room;
pub mod service;
pub mod snapshot;
pub mod state;

pub use engine::{GameMatch, MatchEvent, MatchHandle, MatchRegistry};
pub use room::{GameRoom, RoomError, RoomRegistry, RoomStatus};
pub use service::GameService;
