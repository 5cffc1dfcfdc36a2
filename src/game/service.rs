//! Room lifecycle: keeps the room registry and running engines in step

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::engine::{GameMatch, MatchEvent, MatchHandle, MatchRegistry};
use super::room::{Departure, GameRoom, RoomError, RoomPlayer, RoomRegistry};

#[derive(Clone)]
pub struct GameService {
    rooms: Arc<RoomRegistry>,
    matches: Arc<MatchRegistry>,
}

impl GameService {
    pub fn new(rooms: Arc<RoomRegistry>, matches: Arc<MatchRegistry>) -> Self {
        Self { rooms, matches }
    }

    /// Create a room for `host_id` and start its engine
    pub fn create_room(&self, host_id: Uuid, display_name: String) -> Result<GameRoom, RoomError> {
        let room = self.rooms.create_room(host_id, display_name)?;
        let seed = rand::random::<u64>();
        let (game_match, handle) = GameMatch::new(&room, self.rooms.clone(), seed);
        self.matches.insert(handle);

        let room_id = room.id;
        let rooms = self.rooms.clone();
        let matches = self.matches.clone();
        tokio::spawn(async move {
            game_match.run().await;

            // Cleanup after match ends
            matches.remove(&room_id);
            rooms.finish_room(room_id);
            info!(room_id = %room_id, "Match removed from registry");
        });

        Ok(room)
    }

    pub async fn join_room(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        display_name: String,
    ) -> Result<GameRoom, RoomError> {
        let room = self.rooms.join_room(room_id, user_id, display_name.clone())?;
        self.notify(
            room_id,
            MatchEvent::Seated {
                player: RoomPlayer {
                    user_id,
                    display_name,
                },
            },
        )
        .await;
        Ok(room)
    }

    pub async fn leave_room(&self, user_id: Uuid) -> Result<Departure, RoomError> {
        let departure = self.rooms.leave_room(user_id)?;
        self.notify(departure.room_id, MatchEvent::Left { user_id }).await;
        Ok(departure)
    }

    pub fn current_room(&self, user_id: Uuid) -> Option<GameRoom> {
        self.rooms.current_room(user_id)
    }

    pub fn list_waiting(&self) -> Vec<GameRoom> {
        self.rooms.list_waiting()
    }

    /// Engine handle for a room `user_id` sits in
    pub fn match_for(&self, user_id: Uuid, room_id: Uuid) -> Option<MatchHandle> {
        let room = self.rooms.current_room(user_id)?;
        if room.id != room_id {
            return None;
        }
        self.matches.get(&room_id)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.active_rooms()
    }

    pub fn seated_players(&self) -> usize {
        self.rooms.seated_players()
    }

    pub fn running_matches(&self) -> usize {
        self.matches.active_matches()
    }

    pub fn connected_players(&self) -> usize {
        self.matches.connected_players()
    }

    async fn notify(&self, room_id: Uuid, event: MatchEvent) {
        let Some(handle) = self.matches.get(&room_id) else {
            return;
        };
        if !handle.send(event).await {
            warn!(room_id = %room_id, "Match engine no longer running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::room::RoomStatus;
    use crate::ws::protocol::ServerMsg;
    use std::time::Duration;

    fn service() -> GameService {
        GameService::new(Arc::new(RoomRegistry::new()), Arc::new(MatchRegistry::new()))
    }

    #[tokio::test]
    async fn create_room_spawns_engine() {
        let games = service();
        let host = Uuid::new_v4();
        let room = games.create_room(host, "host".to_string()).unwrap();
        assert!(games.match_for(host, room.id).is_some());
        assert!(games.match_for(host, Uuid::new_v4()).is_none());
        assert!(games.match_for(Uuid::new_v4(), room.id).is_none());
        assert_eq!(games.list_waiting().len(), 1);
    }

    #[tokio::test]
    async fn joined_player_is_announced() {
        let games = service();
        let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
        let room = games.create_room(host, "host".to_string()).unwrap();
        let mut rx = games.match_for(host, room.id).unwrap().subscribe();

        let joined = games.join_room(room.id, guest, "guest".to_string()).await.unwrap();
        assert_eq!(joined.players.len(), 2);

        let announced = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(ServerMsg::PlayerJoined { player }) = rx.recv().await {
                    return player;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(announced.user_id, guest);
    }

    #[tokio::test]
    async fn last_leaver_tears_down_room_and_engine() {
        let games = service();
        let host = Uuid::new_v4();
        let room = games.create_room(host, "host".to_string()).unwrap();
        let departure = games.leave_room(host).await.unwrap();
        assert!(departure.deleted);
        assert_eq!(departure.status, RoomStatus::Waiting);

        tokio::time::timeout(Duration::from_secs(2), async {
            while games.matches.get(&room.id).is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(games.active_rooms(), 0);
        assert!(games.create_room(host, "host".to_string()).is_ok());
    }
}
