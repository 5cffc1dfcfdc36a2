//! Snapshot pacing and construction

use crate::ws::protocol::ServerMsg;

use super::state::GameState;

/// Decides which ticks produce a `state` message and builds it
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for scores, joins and the like)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    pub fn build(&self, tick: u64, countdown: Option<f32>, state: &GameState) -> ServerMsg {
        ServerMsg::State {
            tick,
            countdown: countdown.map(|secs| secs.max(0.0)),
            state: state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::GameConstants;

    #[test]
    fn sends_every_interval() {
        let mut builder = SnapshotBuilder::new(2);
        let sent: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(sent, vec![false, true, false, true, false, true]);
    }

    #[test]
    fn force_next_sends_immediately() {
        let mut builder = SnapshotBuilder::new(4);
        assert!(!builder.should_send());
        builder.force_next();
        assert!(builder.should_send());
        assert!(!builder.should_send());
    }

    #[test]
    fn build_clamps_countdown() {
        let builder = SnapshotBuilder::new(2);
        let state = GameState::new(GameConstants::default());
        match builder.build(9, Some(-0.01), &state) {
            ServerMsg::State { tick, countdown, .. } => {
                assert_eq!(tick, 9);
                assert_eq!(countdown, Some(0.0));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
