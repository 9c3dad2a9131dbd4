//! Round lifecycle state machine
//!
//! Transitions are level-triggered on the active player count, evaluated by
//! one function so the machine can be driven without any networking.

use std::time::Duration;

use crate::ws::protocol::{RoundEndReason, RoundStatus};

/// Round phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// No active round
    Waiting,
    /// Round running
    Active,
    /// Reward computation in flight
    Settling,
}

/// Transition produced by an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTransition {
    Started { number: u64, start_time: u64 },
    Ended { number: u64, reason: RoundEndReason },
}

/// Round counter, timing and phase
#[derive(Debug, Clone)]
pub struct RoundController {
    number: u64,
    start_time: u64,
    duration_ms: u64,
    phase: RoundPhase,
}

impl RoundController {
    pub fn new(duration: Duration) -> Self {
        Self {
            number: 0,
            start_time: 0,
            duration_ms: duration.as_millis() as u64,
            phase: RoundPhase::Waiting,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn is_active(&self) -> bool {
        self.phase == RoundPhase::Active
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Evaluate the machine against the current active player count.
    ///
    /// `Waiting` with players starts a round. `Active` ends when the count
    /// reaches zero or the duration has elapsed. `Settling` only leaves via
    /// [`RoundController::finish_settlement`].
    pub fn evaluate(&mut self, active_players: usize, now: u64) -> Option<RoundTransition> {
        match self.phase {
            RoundPhase::Waiting if active_players > 0 => {
                self.number += 1;
                self.start_time = now;
                self.phase = RoundPhase::Active;
                Some(RoundTransition::Started {
                    number: self.number,
                    start_time: now,
                })
            }
            RoundPhase::Active => {
                let reason = if active_players == 0 {
                    RoundEndReason::Abandoned
                } else if now.saturating_sub(self.start_time) >= self.duration_ms {
                    RoundEndReason::Expired
                } else {
                    return None;
                };
                self.phase = RoundPhase::Settling;
                Some(RoundTransition::Ended {
                    number: self.number,
                    reason,
                })
            }
            _ => None,
        }
    }

    /// Settlement for `round` has been dispatched and answered.
    /// Returns false if the machine was not settling that round.
    pub fn finish_settlement(&mut self, round: u64) -> bool {
        if self.phase == RoundPhase::Settling && self.number == round {
            self.phase = RoundPhase::Waiting;
            true
        } else {
            false
        }
    }

    /// Forget the current round entirely (hard reset)
    pub fn reset(&mut self) {
        self.phase = RoundPhase::Waiting;
        self.start_time = 0;
    }

    pub fn remaining_ms(&self, now: u64) -> u64 {
        if self.is_active() {
            self.duration_ms
                .saturating_sub(now.saturating_sub(self.start_time))
        } else {
            0
        }
    }

    pub fn status(&self, now: u64) -> RoundStatus {
        RoundStatus {
            number: self.number,
            is_active: self.is_active(),
            remaining_time: self.remaining_ms(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> RoundController {
        RoundController::new(Duration::from_secs(60))
    }

    #[test]
    fn first_player_starts_a_round() {
        let mut round = controller();
        assert_eq!(round.evaluate(0, 0), None);
        assert_eq!(
            round.evaluate(1, 500),
            Some(RoundTransition::Started {
                number: 1,
                start_time: 500
            })
        );
        assert!(round.is_active());
        // more players do not restart it
        assert_eq!(round.evaluate(3, 600), None);
    }

    #[test]
    fn last_player_leaving_ends_round() {
        let mut round = controller();
        round.evaluate(1, 0);
        assert_eq!(
            round.evaluate(0, 1_000),
            Some(RoundTransition::Ended {
                number: 1,
                reason: RoundEndReason::Abandoned
            })
        );
        assert_eq!(round.phase(), RoundPhase::Settling);
    }

    #[test]
    fn duration_elapsing_ends_round() {
        let mut round = controller();
        round.evaluate(2, 0);
        assert_eq!(round.evaluate(2, 59_999), None);
        assert_eq!(round.remaining_ms(59_999), 1);
        assert_eq!(
            round.evaluate(2, 60_000),
            Some(RoundTransition::Ended {
                number: 1,
                reason: RoundEndReason::Expired
            })
        );
        assert_eq!(round.remaining_ms(60_000), 0);
    }

    #[test]
    fn settling_blocks_until_finished_then_restarts() {
        let mut round = controller();
        round.evaluate(1, 0);
        round.evaluate(1, 60_000);

        // players still around, but settlement is in flight
        assert_eq!(round.evaluate(1, 60_100), None);
        assert!(!round.finish_settlement(7));
        assert!(round.finish_settlement(1));

        assert_eq!(
            round.evaluate(1, 60_200),
            Some(RoundTransition::Started {
                number: 2,
                start_time: 60_200
            })
        );
    }

    #[test]
    fn status_reports_inactive_round_with_zero_remaining() {
        let mut round = controller();
        let status = round.status(0);
        assert!(!status.is_active);
        assert_eq!(status.remaining_time, 0);

        round.evaluate(1, 1_000);
        let status = round.status(11_000);
        assert_eq!(status.number, 1);
        assert!(status.is_active);
        assert_eq!(status.remaining_time, 50_000);
    }
}
