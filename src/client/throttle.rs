//! Outbound position throttle

use crate::game::math::Vec3;
use crate::ws::protocol::Weapon;

#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    pub min_interval_ms: u64,
    /// Euclidean distance
    pub position_threshold: f32,
    /// Radians, per axis
    pub rotation_threshold: f32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 50,
            position_threshold: 0.1,
            rotation_threshold: 0.05,
        }
    }
}

/// The fields of a `playerPosition` update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalState {
    pub position: Vec3,
    pub rotation: Vec3,
    pub weapon: Weapon,
    pub is_alive: bool,
}

/// Gates local state pushes on both elapsed time and meaningful change
#[derive(Debug, Clone, Default)]
pub struct OutboundThrottle {
    config: ThrottleConfig,
    last_sent_at: Option<u64>,
    last_sent: Option<LocalState>,
}

impl OutboundThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            last_sent_at: None,
            last_sent: None,
        }
    }

    /// Decide whether `state` goes out at `now`; records it when it does
    pub fn should_send(&mut self, now: u64, state: &LocalState) -> bool {
        let (Some(sent_at), Some(last)) = (self.last_sent_at, self.last_sent) else {
            self.record(now, state);
            return true;
        };

        if now.saturating_sub(sent_at) < self.config.min_interval_ms {
            return false;
        }

        let changed = state.position.distance(&last.position) > self.config.position_threshold
            || state.rotation.max_axis_delta(&last.rotation) > self.config.rotation_threshold
            || state.weapon != last.weapon
            || state.is_alive != last.is_alive;

        if changed {
            self.record(now, state);
        }
        changed
    }

    /// Forget the last send so the next state always goes out
    pub fn reset(&mut self) {
        self.last_sent_at = None;
        self.last_sent = None;
    }

    fn record(&mut self, now: u64, state: &LocalState) {
        self.last_sent_at = Some(now);
        self.last_sent = Some(*state);
    }
}
