//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::util::time::DEFAULT_TICK_RATE_HZ;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,
    /// Bearer token for the admin reset endpoint (endpoint disabled when unset)
    pub admin_token: Option<String>,

    /// Reward settlement endpoint; settlement is log-only when unset
    pub reward_settlement_url: Option<String>,
    /// HMAC key used to sign settlement requests
    pub reward_settlement_secret: Option<String>,

    /// Arena tunables
    pub game: GameConfig,
}

/// Tunables for the authoritative arena
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Snapshot broadcasts per second
    pub tick_rate_hz: u32,
    /// Maximum simultaneously active players
    pub max_players: usize,
    /// Length of a round
    pub round_duration: Duration,
    /// How often the round-end checker runs
    pub round_check_interval: Duration,
    /// Global pickup respawn interval
    pub pickup_respawn_interval: Duration,
    /// Delay between elimination and respawn
    pub respawn_delay: Duration,
    /// Respawns avoid candidates closer than this to any alive player
    pub min_spawn_distance: f32,
    /// Candidates tried before falling back to the arena centre
    pub spawn_max_attempts: usize,
    /// Upper bound on one settlement call
    pub settlement_timeout: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            max_players: 16,
            round_duration: Duration::from_secs(300),
            round_check_interval: Duration::from_secs(1),
            pickup_respawn_interval: Duration::from_secs(15),
            respawn_delay: Duration::from_millis(5_000),
            min_spawn_distance: 5.0,
            spawn_max_attempts: 10,
            settlement_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = GameConfig::default();
        let game = GameConfig {
            tick_rate_hz: parse_or("TICK_RATE_HZ", defaults.tick_rate_hz)?,
            max_players: parse_or("MAX_PLAYERS", defaults.max_players)?,
            round_duration: Duration::from_secs(parse_or(
                "ROUND_DURATION_SECS",
                defaults.round_duration.as_secs(),
            )?),
            round_check_interval: defaults.round_check_interval,
            pickup_respawn_interval: Duration::from_secs(parse_or(
                "PICKUP_RESPAWN_SECS",
                defaults.pickup_respawn_interval.as_secs(),
            )?),
            respawn_delay: Duration::from_millis(parse_or(
                "RESPAWN_DELAY_MS",
                defaults.respawn_delay.as_millis() as u64,
            )?),
            min_spawn_distance: parse_or("MIN_SPAWN_DISTANCE", defaults.min_spawn_distance)?,
            spawn_max_attempts: defaults.spawn_max_attempts,
            settlement_timeout: Duration::from_secs(parse_or(
                "SETTLEMENT_TIMEOUT_SECS",
                defaults.settlement_timeout.as_secs(),
            )?),
        };

        if game.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("TICK_RATE_HZ"));
        }
        if game.max_players == 0 {
            return Err(ConfigError::Invalid("MAX_PLAYERS"));
        }
        if game.round_duration.is_zero() {
            return Err(ConfigError::Invalid("ROUND_DURATION_SECS"));
        }
        if game.pickup_respawn_interval.is_zero() {
            return Err(ConfigError::Invalid("PICKUP_RESPAWN_SECS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            admin_token: non_empty("ADMIN_TOKEN"),

            reward_settlement_url: non_empty("REWARD_SETTLEMENT_URL"),
            reward_settlement_secret: non_empty("REWARD_SETTLEMENT_SECRET"),

            game,
        })
    }
}

/// Read an optional variable, treating an empty value as unset
fn non_empty(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable, falling back to `default` when it is unset
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let game = GameConfig::default();
        assert_eq!(game.tick_rate_hz, 20);
        assert_eq!(game.pickup_respawn_interval, Duration::from_secs(15));
        assert_eq!(game.respawn_delay, Duration::from_secs(5));
    }

    #[test]
    fn unset_variable_uses_default() {
        let value: u32 = parse_or("ARENA_TEST_SURELY_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }
}
