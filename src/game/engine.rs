//! Match engine: one authoritative tick loop per room

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{tick_delta, tick_duration, SNAPSHOT_RATE, TICK_RATE};
use crate::ws::protocol::{EndReason, PlayerInfo, ServerMsg};

use super::physics::PhysicsSystem;
use super::room::{GameRoom, RoomPlayer, RoomRegistry, MAX_PLAYERS};
use super::snapshot::SnapshotBuilder;
use super::state::{Direction, GameConstants, GameState, GameStatus, Side};

const EVENT_CHANNEL_SIZE: usize = 256;
const BROADCAST_CHANNEL_SIZE: usize = 64;

/// Everything the engine reacts to, in arrival order
#[derive(Debug, Clone)]
pub enum MatchEvent {
    /// A user took the second seat through the HTTP API
    Seated { player: RoomPlayer },
    /// A WebSocket for this user opened
    Connected { user_id: Uuid },
    /// A WebSocket for this user closed
    Disconnected { user_id: Uuid },
    Input {
        user_id: Uuid,
        direction: Direction,
        seq: u32,
    },
    /// The user left the room
    Left { user_id: Uuid },
}

#[derive(Debug, Clone)]
struct Participant {
    user_id: Uuid,
    display_name: String,
    /// Open sockets; a user may have more than one tab
    connections: usize,
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub room_id: Uuid,
    pub events_tx: mpsc::Sender<MatchEvent>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    connected: Arc<AtomicUsize>,
}

impl MatchHandle {
    /// Participants with at least one open socket
    pub fn connected_players(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.snapshot_tx.subscribe()
    }

    /// Queue an event; false once the engine has stopped
    pub async fn send(&self, event: MatchEvent) -> bool {
        self.events_tx.send(event).await.is_ok()
    }
}

/// Registry of all running engines, keyed by room
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, room_id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(room_id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.room_id, handle);
    }

    pub fn remove(&self, room_id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(room_id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn connected_players(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().connected_players())
            .sum()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game match
pub struct GameMatch {
    room_id: Uuid,
    tick: u64,
    state: GameState,
    participants: Vec<Participant>,
    /// Seconds left before the first serve
    countdown: Option<f32>,
    /// Last whole second announced with a `countdown` message
    announced_second: u32,
    /// Pause after a point, then serve toward the given side
    serve_pause: Option<(f32, Side)>,
    end_reason: Option<EndReason>,
    rng: ChaCha8Rng,
    events_rx: mpsc::Receiver<MatchEvent>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    connected: Arc<AtomicUsize>,
    rooms: Arc<RoomRegistry>,
}

impl GameMatch {
    pub fn new(room: &GameRoom, rooms: Arc<RoomRegistry>, seed: u64) -> (Self, MatchHandle) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (snapshot_tx, _) = broadcast::channel(BROADCAST_CHANNEL_SIZE);
        let connected = Arc::new(AtomicUsize::new(0));

        let handle = MatchHandle {
            room_id: room.id,
            events_tx,
            snapshot_tx: snapshot_tx.clone(),
            connected: connected.clone(),
        };

        let participants = room
            .players
            .iter()
            .map(|p| Participant {
                user_id: p.user_id,
                display_name: p.display_name.clone(),
                connections: 0,
            })
            .collect();

        let game_match = Self {
            room_id: room.id,
            tick: 0,
            state: GameState::new(GameConstants::default()),
            participants,
            countdown: None,
            announced_second: 0,
            serve_pause: None,
            end_reason: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            events_rx,
            snapshot_tx,
            snapshot_builder: SnapshotBuilder::new(TICK_RATE / SNAPSHOT_RATE),
            connected,
            rooms,
        };

        (game_match, handle)
    }

    /// Run the tick loop until the match finishes or the room empties
    pub async fn run(mut self) {
        info!(room_id = %self.room_id, "Match engine started");

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            self.process_events();
            self.run_tick();

            if self.state.status == GameStatus::Finished {
                break;
            }

            if self.snapshot_builder.should_send() {
                let _ = self.snapshot_tx.send(self.snapshot());
            }
        }

        let reason = self.end_reason.unwrap_or(EndReason::Abandoned);
        let _ = self.snapshot_tx.send(self.snapshot());
        let _ = self.snapshot_tx.send(ServerMsg::MatchEnd {
            winner: self.state.winner,
            score: self.state.score,
            reason,
        });

        info!(
            room_id = %self.room_id,
            winner = ?self.state.winner,
            left = self.state.score.left,
            right = self.state.score.right,
            reason = ?reason,
            "Match ended"
        );
    }

    fn snapshot(&self) -> ServerMsg {
        self.snapshot_builder
            .build(self.tick, self.countdown, &self.state)
    }

    /// Drain all queued events
    fn process_events(&mut self) {
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => self.handle_event(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    // Every handle is gone: the room no longer exists
                    self.finish(None, EndReason::Abandoned);
                    break;
                }
            }
        }
    }

    fn handle_event(&mut self, event: MatchEvent) {
        if self.state.status == GameStatus::Finished {
            return;
        }

        match event {
            MatchEvent::Seated { player } => self.handle_seated(player),
            MatchEvent::Connected { user_id } => self.handle_connected(user_id),
            MatchEvent::Disconnected { user_id } => self.handle_disconnected(user_id),
            MatchEvent::Input {
                user_id,
                direction,
                seq,
            } => self.handle_input(user_id, direction, seq),
            MatchEvent::Left { user_id } => self.handle_left(user_id),
        }
    }

    fn handle_seated(&mut self, player: RoomPlayer) {
        if self.participant(player.user_id).is_some() || self.participants.len() >= MAX_PLAYERS {
            return;
        }
        let info = PlayerInfo {
            user_id: player.user_id,
            display_name: player.display_name.clone(),
            side: None,
        };
        self.participants.push(Participant {
            user_id: player.user_id,
            display_name: player.display_name,
            connections: 0,
        });
        let _ = self.snapshot_tx.send(ServerMsg::PlayerJoined { player: info });
        self.snapshot_builder.force_next();
    }

    fn handle_connected(&mut self, user_id: Uuid) {
        let Some(idx) = self.participants.iter().position(|p| p.user_id == user_id) else {
            warn!(room_id = %self.room_id, user_id = %user_id, "Connection from non-participant");
            return;
        };
        self.participants[idx].connections += 1;
        self.update_connected();

        if self.participants[idx].connections == 1 {
            let player = PlayerInfo {
                user_id,
                display_name: self.participants[idx].display_name.clone(),
                side: self.state.side_of(user_id),
            };
            let _ = self.snapshot_tx.send(ServerMsg::PlayerJoined { player });
            info!(room_id = %self.room_id, user_id = %user_id, "Player connected");
        }

        self.snapshot_builder.force_next();
        self.maybe_start_countdown();
    }

    fn handle_disconnected(&mut self, user_id: Uuid) {
        let Some(participant) = self.participants.iter_mut().find(|p| p.user_id == user_id) else {
            return;
        };
        participant.connections = participant.connections.saturating_sub(1);
        let gone = participant.connections == 0;
        self.update_connected();
        if !gone {
            return;
        }

        info!(room_id = %self.room_id, user_id = %user_id, "Player disconnected");
        let _ = self.snapshot_tx.send(ServerMsg::PlayerLeft {
            user_id,
            reason: "disconnected".to_string(),
        });

        if self.state.status == GameStatus::InProgress {
            self.forfeit(user_id);
        } else {
            self.cancel_countdown();
        }
    }

    fn handle_input(&mut self, user_id: Uuid, direction: Direction, seq: u32) {
        let Some(side) = self.state.side_of(user_id) else {
            return;
        };
        let paddle = self.state.paddle_mut(side);
        if seq < paddle.last_input_seq {
            debug!(user_id = %user_id, seq, "Stale input dropped");
            return;
        }
        paddle.last_input_seq = seq;
        paddle.direction = direction;
    }

    fn handle_left(&mut self, user_id: Uuid) {
        let before = self.participants.len();
        self.participants.retain(|p| p.user_id != user_id);
        if self.participants.len() == before {
            return;
        }
        self.update_connected();

        info!(room_id = %self.room_id, user_id = %user_id, "Player left room");
        let _ = self.snapshot_tx.send(ServerMsg::PlayerLeft {
            user_id,
            reason: "left".to_string(),
        });

        if self.state.status == GameStatus::InProgress {
            self.forfeit(user_id);
        } else if self.participants.is_empty() {
            self.finish(None, EndReason::Abandoned);
        } else {
            self.cancel_countdown();
        }
    }

    fn participant(&self, user_id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    fn update_connected(&self) {
        let count = self.participants.iter().filter(|p| p.connections > 0).count();
        self.connected.store(count, Ordering::Relaxed);
    }

    /// Both seats taken and connected: start counting down
    fn maybe_start_countdown(&mut self) {
        if self.state.status != GameStatus::Waiting
            || self.countdown.is_some()
            || self.participants.len() < 2
            || self.participants.iter().any(|p| p.connections == 0)
        {
            return;
        }

        // Seats may have changed owner or a client may have reconnected
        // with a fresh sequence counter
        for (side, participant) in [Side::Left, Side::Right].into_iter().zip(&self.participants) {
            let paddle = self.state.paddle_mut(side);
            paddle.user_id = Some(participant.user_id);
            paddle.last_input_seq = 0;
        }

        let secs = self.state.constants.countdown_secs;
        self.countdown = Some(secs as f32);
        self.announced_second = secs;
        let _ = self.snapshot_tx.send(ServerMsg::Countdown {
            seconds_remaining: secs,
        });
        info!(room_id = %self.room_id, "Countdown started");
    }

    fn cancel_countdown(&mut self) {
        if self.countdown.take().is_some() {
            info!(room_id = %self.room_id, "Countdown cancelled");
        }
        self.snapshot_builder.force_next();
    }

    /// Run a single simulation tick
    fn run_tick(&mut self) {
        self.tick += 1;
        let dt = tick_delta();

        match self.state.status {
            GameStatus::Waiting => self.tick_countdown(dt),
            GameStatus::InProgress => self.tick_play(dt),
            GameStatus::Finished => {}
        }
    }

    fn tick_countdown(&mut self, dt: f32) {
        let Some(remaining) = self.countdown.as_mut() else {
            return;
        };
        *remaining -= dt;
        let remaining = *remaining;

        if remaining <= 0.0 {
            self.start();
            return;
        }

        let whole = remaining.ceil() as u32;
        if whole < self.announced_second {
            self.announced_second = whole;
            let _ = self.snapshot_tx.send(ServerMsg::Countdown {
                seconds_remaining: whole,
            });
        }
    }

    fn start(&mut self) {
        self.countdown = None;
        if let Err(e) = self.rooms.mark_in_progress(self.room_id) {
            warn!(room_id = %self.room_id, error = %e, "Room could not start");
            return;
        }

        self.state.status = GameStatus::InProgress;
        PhysicsSystem::reset_positions(&mut self.state);
        let first = if self.rng.gen_bool(0.5) {
            Side::Left
        } else {
            Side::Right
        };
        PhysicsSystem::serve(&mut self.state, first, &mut self.rng);
        self.snapshot_builder.force_next();

        info!(room_id = %self.room_id, tick = self.tick, "Match started");
    }

    fn tick_play(&mut self, dt: f32) {
        let timer = &mut self.state.timer;
        timer.elapsed_secs += dt;
        timer.remaining_secs = (timer.remaining_secs - dt).max(0.0);

        if let Some((pause, toward)) = self.serve_pause.as_mut() {
            *pause -= dt;
            let (expired, toward) = (*pause <= 0.0, *toward);
            let constants = self.state.constants.clone();
            PhysicsSystem::move_paddle(&mut self.state.left, &constants, dt);
            PhysicsSystem::move_paddle(&mut self.state.right, &constants, dt);
            if expired {
                self.serve_pause = None;
                PhysicsSystem::serve(&mut self.state, toward, &mut self.rng);
            }
        } else if let Some(scorer) = PhysicsSystem::step(&mut self.state, dt) {
            self.point_scored(scorer);
            if self.state.status == GameStatus::Finished {
                return;
            }
        }

        if self.state.timer.remaining_secs <= 0.0 {
            let winner = self.state.score.leader().and_then(|s| self.state.user_on(s));
            self.finish(winner, EndReason::TimeUp);
        }
    }

    fn point_scored(&mut self, scorer: Side) {
        self.state.score.add(scorer);
        self.snapshot_builder.force_next();
        debug!(
            room_id = %self.room_id,
            left = self.state.score.left,
            right = self.state.score.right,
            "Point scored"
        );

        if let Some(side) = self.state.score_limit_reached() {
            let winner = self.state.user_on(side);
            self.finish(winner, EndReason::ScoreLimit);
            return;
        }

        let ball = &mut self.state.ball;
        ball.x = self.state.constants.canvas_width / 2.0;
        ball.y = self.state.constants.canvas_height / 2.0;
        ball.vx = 0.0;
        ball.vy = 0.0;
        self.serve_pause = Some((self.state.constants.serve_delay_secs, scorer.opposite()));
    }

    /// `user_id` abandoned a running match; the other seat wins if still here
    fn forfeit(&mut self, user_id: Uuid) {
        let Some(side) = self.state.side_of(user_id) else {
            return;
        };
        let opponent = self
            .state
            .user_on(side.opposite())
            .filter(|id| self.participant(*id).is_some_and(|p| p.connections > 0));

        match opponent {
            Some(winner) => self.finish(Some(winner), EndReason::Forfeit),
            None => self.finish(None, EndReason::Abandoned),
        }
    }

    fn finish(&mut self, winner: Option<Uuid>, reason: EndReason) {
        if self.state.status == GameStatus::Finished {
            return;
        }
        self.state.status = GameStatus::Finished;
        self.state.winner = winner;
        self.countdown = None;
        self.serve_pause = None;
        self.end_reason = Some(reason);
    }
}
