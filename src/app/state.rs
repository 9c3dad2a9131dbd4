//! Application state shared across routes

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::game::{ArenaHandle, ArenaService};
use crate::settlement::{HttpRewardSettlement, LogOnlySettlement, RewardSettlement};
use crate::ws::registry::ConnectionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub arena: ArenaHandle,
    pub connections: Arc<ConnectionRegistry>,
}

impl AppState {
    /// Build the state and the arena task that still has to be spawned
    pub fn new(config: Config) -> (Self, ArenaService) {
        let config = Arc::new(config);

        let settlement: Arc<dyn RewardSettlement> = match &config.reward_settlement_url {
            Some(url) => {
                info!(url = %url, "Reward settlement over HTTP");
                Arc::new(HttpRewardSettlement::new(
                    url.clone(),
                    config.reward_settlement_secret.clone(),
                ))
            }
            None => {
                info!("No settlement endpoint configured, rewards are log-only");
                Arc::new(LogOnlySettlement)
            }
        };

        let connections = Arc::new(ConnectionRegistry::new());
        let (service, arena) =
            ArenaService::new(config.game.clone(), connections.clone(), settlement);

        (
            Self {
                config,
                arena,
                connections,
            },
            service,
        )
    }
}
