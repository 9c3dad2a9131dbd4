//! Client connection state and reconnect policy
//!
//! The socket itself belongs to the host (browser or native runtime). This
//! tracks what the UI should show and when a retry is due.

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            retry_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Waiting to retry at `retry_at` (local ms)
    Reconnecting { attempt: u32, retry_at: u64 },
    /// Gave up; the UI decides what to offer next
    Disconnected,
}

/// What the host should do after a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt(u64),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct ConnectionManager {
    policy: ReconnectPolicy,
    state: ConnectionState,
    retries: u32,
}

impl ConnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Connecting,
            retries: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Transport opened; the retry budget refills
    pub fn on_open(&mut self) {
        if self.retries > 0 {
            info!(retries = self.retries, "Reconnected");
        }
        self.retries = 0;
        self.state = ConnectionState::Connected;
    }

    /// Transport closed or failed to open
    pub fn on_failure(&mut self, now: u64) -> RetryDecision {
        if matches!(self.state, ConnectionState::Disconnected) {
            return RetryDecision::GiveUp;
        }
        if self.retries >= self.policy.max_retries {
            warn!(retries = self.retries, "Connection lost, giving up");
            self.state = ConnectionState::Disconnected;
            return RetryDecision::GiveUp;
        }

        self.retries += 1;
        let retry_at = now + self.policy.retry_delay_ms;
        warn!(attempt = self.retries, retry_at, "Connection lost, retrying");
        self.state = ConnectionState::Reconnecting {
            attempt: self.retries,
            retry_at,
        };
        RetryDecision::RetryAt(retry_at)
    }

    /// True exactly once when a pending retry becomes due; the host should
    /// then open a new transport.
    pub fn poll(&mut self, now: u64) -> bool {
        match self.state {
            ConnectionState::Reconnecting { retry_at, .. } if now >= retry_at => {
                self.state = ConnectionState::Connecting;
                true
            }
            _ => false,
        }
    }

    /// Manual reconnect from the UI after giving up
    pub fn restart(&mut self) {
        self.retries = 0;
        self.state = ConnectionState::Connecting;
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_retry_then_disconnected() {
        let mut conn = ConnectionManager::default();
        conn.on_open();

        assert_eq!(conn.on_failure(1_000), RetryDecision::RetryAt(3_000));
        assert!(!conn.poll(2_999));
        assert!(conn.poll(3_000));
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(!conn.poll(3_001));

        assert_eq!(conn.on_failure(3_100), RetryDecision::GiveUp);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.on_failure(9_000), RetryDecision::GiveUp);
    }

    #[test]
    fn successful_reconnect_refills_budget() {
        let mut conn = ConnectionManager::default();
        conn.on_open();
        conn.on_failure(0);
        conn.poll(2_000);
        conn.on_open();
        assert!(conn.is_connected());
        assert!(matches!(conn.on_failure(5_000), RetryDecision::RetryAt(7_000)));
    }

    #[test]
    fn restart_after_giving_up() {
        let mut conn = ConnectionManager::new(ReconnectPolicy {
            max_retries: 0,
            retry_delay_ms: 2_000,
        });
        assert_eq!(conn.on_failure(0), RetryDecision::GiveUp);
        conn.restart();
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }
}
