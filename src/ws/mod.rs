//! WebSocket transport for game rooms

pub mod handler;
pub mod protocol;
