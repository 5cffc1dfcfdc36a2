//! Room registry: which rooms exist and which user sits in which room

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

pub const MAX_PLAYERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomPlayer {
    pub user_id: Uuid,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameRoom {
    pub id: Uuid,
    pub host_id: Uuid,
    /// Seat order: index 0 plays left
    pub players: Vec<RoomPlayer>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
}

impl GameRoom {
    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.players.iter().any(|p| p.user_id == user_id)
    }
}

/// What a `leave_room` call did
#[derive(Debug, Clone)]
pub struct Departure {
    pub room_id: Uuid,
    /// Status at the time of leaving
    pub status: RoomStatus,
    /// The room was empty and has been removed
    pub deleted: bool,
    /// Host after the departure, if the room survives
    pub host_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Already in room {0}")]
    AlreadyInRoom(Uuid),

    #[error("Room not found")]
    NotFound,

    #[error("Room is not accepting players")]
    NotJoinable,

    #[error("Room is full")]
    Full,

    #[error("Not in a room")]
    NotInRoom,
}

#[derive(Default)]
struct Rooms {
    rooms: HashMap<Uuid, GameRoom>,
    /// user -> room
    occupants: HashMap<Uuid, Uuid>,
}

/// Both indexes sit behind one lock so a user can never be seated twice
#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<Rooms>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_room(&self, host_id: Uuid, display_name: String) -> Result<GameRoom, RoomError> {
        let mut inner = self.inner.write();
        if let Some(room_id) = inner.occupants.get(&host_id) {
            return Err(RoomError::AlreadyInRoom(*room_id));
        }

        let room = GameRoom {
            id: Uuid::new_v4(),
            host_id,
            players: vec![RoomPlayer {
                user_id: host_id,
                display_name,
            }],
            status: RoomStatus::Waiting,
            created_at: Utc::now(),
        };
        inner.occupants.insert(host_id, room.id);
        inner.rooms.insert(room.id, room.clone());

        info!(room_id = %room.id, host_id = %host_id, "Room created");
        Ok(room)
    }

    pub fn join_room(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        display_name: String,
    ) -> Result<GameRoom, RoomError> {
        let mut inner = self.inner.write();
        match inner.occupants.get(&user_id) {
            Some(current) if *current == room_id => {
                return inner.rooms.get(&room_id).cloned().ok_or(RoomError::NotFound);
            }
            Some(current) => return Err(RoomError::AlreadyInRoom(*current)),
            None => {}
        }

        let room = inner.rooms.get_mut(&room_id).ok_or(RoomError::NotFound)?;
        if room.status != RoomStatus::Waiting {
            return Err(RoomError::NotJoinable);
        }
        if room.is_full() {
            return Err(RoomError::Full);
        }
        room.players.push(RoomPlayer {
            user_id,
            display_name,
        });
        let room = room.clone();
        inner.occupants.insert(user_id, room_id);

        info!(room_id = %room_id, user_id = %user_id, players = room.players.len(), "Player joined room");
        Ok(room)
    }

    /// Remove `user_id` from its room. An IN_PROGRESS room keeps running
    /// until the engine finishes it.
    pub fn leave_room(&self, user_id: Uuid) -> Result<Departure, RoomError> {
        let mut inner = self.inner.write();
        let room_id = inner.occupants.remove(&user_id).ok_or(RoomError::NotInRoom)?;
        let Some(room) = inner.rooms.get_mut(&room_id) else {
            return Err(RoomError::NotFound);
        };

        room.players.retain(|p| p.user_id != user_id);
        let status = room.status;

        if room.players.is_empty() && status == RoomStatus::Waiting {
            inner.rooms.remove(&room_id);
            info!(room_id = %room_id, user_id = %user_id, "Room emptied and removed");
            return Ok(Departure {
                room_id,
                status,
                deleted: true,
                host_id: None,
            });
        }

        if room.host_id == user_id {
            if let Some(next) = room.players.first() {
                room.host_id = next.user_id;
            }
        }

        info!(room_id = %room_id, user_id = %user_id, "Player left room");
        Ok(Departure {
            room_id,
            status,
            deleted: false,
            host_id: Some(room.host_id),
        })
    }

    pub fn current_room(&self, user_id: Uuid) -> Option<GameRoom> {
        let inner = self.inner.read();
        let room_id = inner.occupants.get(&user_id)?;
        inner.rooms.get(room_id).cloned()
    }

    pub fn get(&self, room_id: Uuid) -> Option<GameRoom> {
        self.inner.read().rooms.get(&room_id).cloned()
    }

    /// Open rooms, oldest first
    pub fn list_waiting(&self) -> Vec<GameRoom> {
        let inner = self.inner.read();
        let mut rooms: Vec<GameRoom> = inner
            .rooms
            .values()
            .filter(|r| r.status == RoomStatus::Waiting && !r.is_full())
            .cloned()
            .collect();
        rooms.sort_by_key(|r| r.created_at);
        rooms
    }

    /// WAITING -> IN_PROGRESS; only a full room may start
    pub fn mark_in_progress(&self, room_id: Uuid) -> Result<(), RoomError> {
        let mut inner = self.inner.write();
        let room = inner.rooms.get_mut(&room_id).ok_or(RoomError::NotFound)?;
        if room.status != RoomStatus::Waiting || !room.is_full() {
            return Err(RoomError::NotJoinable);
        }
        room.status = RoomStatus::InProgress;
        info!(room_id = %room_id, "Room in progress");
        Ok(())
    }

    /// Release every occupant and drop the room
    pub fn finish_room(&self, room_id: Uuid) -> Option<GameRoom> {
        let mut inner = self.inner.write();
        let mut room = inner.rooms.remove(&room_id)?;
        inner.occupants.retain(|_, r| *r != room_id);
        room.status = RoomStatus::Finished;

        info!(room_id = %room_id, "Room finished");
        Some(room)
    }

    pub fn active_rooms(&self) -> usize {
        self.inner.read().rooms.len()
    }

    pub fn seated_players(&self) -> usize {
        self.inner.read().occupants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn name(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn one_room_per_user() {
        let registry = RoomRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let room = registry.create_room(a, name("a")).unwrap();
        assert!(matches!(
            registry.create_room(a, name("a")),
            Err(RoomError::AlreadyInRoom(id)) if id == room.id
        ));

        let other = registry.create_room(b, name("b")).unwrap();
        assert!(matches!(
            registry.join_room(other.id, a, name("a")),
            Err(RoomError::AlreadyInRoom(_))
        ));
    }

    #[test]
    fn rejoining_own_room_is_idempotent() {
        let registry = RoomRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let room = registry.create_room(a, name("a")).unwrap();
        registry.join_room(room.id, b, name("b")).unwrap();
        let again = registry.join_room(room.id, b, name("b")).unwrap();
        assert_eq!(again.players.len(), 2);
    }

    #[test]
    fn rooms_never_exceed_two_players() {
        let registry = RoomRegistry::new();
        let room = registry.create_room(Uuid::new_v4(), name("a")).unwrap();
        registry.join_room(room.id, Uuid::new_v4(), name("b")).unwrap();
        assert!(matches!(
            registry.join_room(room.id, Uuid::new_v4(), name("c")),
            Err(RoomError::Full)
        ));
        assert!(registry.list_waiting().is_empty());
    }

    #[test]
    fn cannot_join_started_or_unknown_room() {
        let registry = RoomRegistry::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let room = registry.create_room(a, name("a")).unwrap();
        assert!(matches!(registry.mark_in_progress(room.id), Err(RoomError::NotJoinable)));
        registry.join_room(room.id, b, name("b")).unwrap();
        registry.mark_in_progress(room.id).unwrap();
        registry.leave_room(b).unwrap();

        assert!(matches!(
            registry.join_room(room.id, c, name("c")),
            Err(RoomError::NotJoinable)
        ));
        assert!(matches!(
            registry.join_room(Uuid::new_v4(), c, name("c")),
            Err(RoomError::NotFound)
        ));
    }

    #[test]
    fn host_leaving_promotes_guest_and_empty_room_is_removed() {
        let registry = RoomRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let room = registry.create_room(a, name("a")).unwrap();
        registry.join_room(room.id, b, name("b")).unwrap();

        let departure = registry.leave_room(a).unwrap();
        assert!(!departure.deleted);
        assert_eq!(departure.host_id, Some(b));
        assert_eq!(registry.get(room.id).unwrap().host_id, b);
        assert!(registry.current_room(a).is_none());

        let departure = registry.leave_room(b).unwrap();
        assert!(departure.deleted);
        assert!(registry.get(room.id).is_none());
        assert!(matches!(registry.leave_room(b), Err(RoomError::NotInRoom)));
    }

    #[test]
    fn finish_releases_everyone() {
        let registry = RoomRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let room = registry.create_room(a, name("a")).unwrap();
        registry.join_room(room.id, b, name("b")).unwrap();
        registry.mark_in_progress(room.id).unwrap();

        let finished = registry.finish_room(room.id).unwrap();
        assert_eq!(finished.status, RoomStatus::Finished);
        assert_eq!(registry.active_rooms(), 0);
        assert_eq!(registry.seated_players(), 0);
        assert!(registry.create_room(a, name("a")).is_ok());
    }

    #[test]
    fn concurrent_creates_seat_user_once() {
        let registry = Arc::new(RoomRegistry::new());
        let user = Uuid::new_v4();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.create_room(user, "u".to_string()).is_ok())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(created, 1);
        assert_eq!(registry.active_rooms(), 1);
    }
}
