//! Reward settlement collaborator
//!
//! At round end the arena hands the eligible players to a [`RewardSettlement`]
//! and broadcasts whatever comes back. Each player settles or fails on its
//! own; a failure never aborts the rest of the batch.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::ws::protocol::{EligiblePlayer, RewardFailure, RewardReceipt};

pub use http::HttpRewardSettlement;

/// Per-player outcome of one settlement batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementReport {
    pub successful: Vec<RewardReceipt>,
    pub failed: Vec<RewardFailure>,
}

impl SettlementReport {
    /// Every player in the batch failed for the same reason
    pub fn all_failed(players: &[EligiblePlayer], reason: &str) -> Self {
        Self {
            successful: Vec::new(),
            failed: players
                .iter()
                .map(|p| RewardFailure {
                    player_id: p.player_id.clone(),
                    score: p.score,
                    reason: reason.to_string(),
                })
                .collect(),
        }
    }
}

/// Settles rewards for the players of a finished round
pub trait RewardSettlement: Send + Sync {
    fn settle<'a>(
        &'a self,
        round: u64,
        players: &'a [EligiblePlayer],
    ) -> BoxFuture<'a, SettlementReport>;
}

/// Used when no settlement endpoint is configured: records the outcome in the
/// log and reports every player as settled without a reference.
#[derive(Debug, Clone, Default)]
pub struct LogOnlySettlement;

impl RewardSettlement for LogOnlySettlement {
    fn settle<'a>(
        &'a self,
        round: u64,
        players: &'a [EligiblePlayer],
    ) -> BoxFuture<'a, SettlementReport> {
        Box::pin(async move {
            for player in players {
                info!(
                    round,
                    player_id = %player.player_id,
                    score = player.score,
                    "Reward owed (log-only settlement)"
                );
            }
            SettlementReport {
                successful: players
                    .iter()
                    .map(|p| RewardReceipt {
                        player_id: p.player_id.clone(),
                        score: p.score,
                        reference: None,
                    })
                    .collect(),
                failed: Vec::new(),
            }
        })
    }
}

/// Run a settlement batch, converting a timeout into a per-player failure
pub async fn settle_with_timeout(
    settlement: Arc<dyn RewardSettlement>,
    round: u64,
    players: Vec<EligiblePlayer>,
    timeout: Duration,
) -> SettlementReport {
    if players.is_empty() {
        return SettlementReport::default();
    }

    match tokio::time::timeout(timeout, settlement.settle(round, &players)).await {
        Ok(report) => {
            if !report.failed.is_empty() {
                warn!(
                    round,
                    failed = report.failed.len(),
                    successful = report.successful.len(),
                    "Reward settlement partially failed"
                );
            }
            report
        }
        Err(_) => {
            warn!(round, players = players.len(), "Reward settlement timed out");
            SettlementReport::all_failed(&players, "settlement timed out")
        }
    }
}
