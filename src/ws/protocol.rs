//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::math::Vec3;

/// Stable player identity (wallet address or similar)
pub type PlayerId = String;

/// Weapon a player currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weapon {
    #[default]
    None,
    Missile,
}

impl Weapon {
    pub fn is_armed(&self) -> bool {
        !matches!(self, Weapon::None)
    }
}

/// Business-rule rejection returned to the requester only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    #[error("game is full")]
    GameFull,
    #[error("identity is missing or malformed")]
    InvalidIdentity,
    #[error("player has not joined")]
    NotJoined,
    #[error("pickup does not exist")]
    NotFound,
    #[error("pickup is not available")]
    Unavailable,
    #[error("player already holds a weapon")]
    AlreadyArmed,
    #[error("player is not alive")]
    NotAlive,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Request to enter the arena
    JoinGame {
        identity: String,
        #[serde(default)]
        display_name: Option<String>,
    },

    /// Throttled local state push
    PlayerPosition {
        position: Vec3,
        rotation: Vec3,
        #[serde(default)]
        weapon: Weapon,
        is_alive: bool,
    },

    /// Attempt to collect a weapon pickup
    WeaponPickupCollection { pickup_id: String },

    /// Missile launched by the local client
    MissileFire {
        missile_id: String,
        shooter_id: PlayerId,
        position: Vec3,
        direction: Vec3,
    },

    /// Hit detected by the shooter's client
    MissileHit {
        missile_id: String,
        shooter_id: PlayerId,
        target_id: PlayerId,
        hit_position: Vec3,
    },

    /// Clock sync / latency probe
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Reply to `joinGame`
    JoinGameResponse {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<RejectReason>,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
        #[serde(default)]
        is_new_player: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        round_snapshot: Option<RoundStatus>,
    },

    /// Authoritative snapshot (tick broadcast)
    GameState {
        players: Vec<PlayerSnapshot>,
        pickups: Vec<PickupSnapshot>,
        round: RoundStatus,
        next_global_respawn_at: u64,
        server_time: u64,
    },

    /// Reply to `weaponPickupCollection`
    WeaponPickupResponse {
        success: bool,
        pickup_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<RejectReason>,
        #[serde(skip_serializing_if = "Option::is_none")]
        weapon: Option<Weapon>,
    },

    /// Visual-only remote missile
    MissileSpawned {
        missile_id: String,
        shooter_id: PlayerId,
        position: Vec3,
        direction: Vec3,
        spawned_at: u64,
    },

    PlayerEliminated {
        target_id: PlayerId,
        shooter_id: PlayerId,
        position: Vec3,
        shooter_score: u32,
    },

    PlayerRespawned {
        player_id: PlayerId,
        position: Vec3,
        rotation: Vec3,
    },

    RoundStarted {
        round_number: u64,
        start_time: u64,
        duration_ms: u64,
    },

    RoundEnded {
        round_number: u64,
        reason: RoundEndReason,
        eligible_players: Vec<EligiblePlayer>,
    },

    /// Reward settlement outcome for a finished round
    RoundRewards {
        round_number: u64,
        successful: Vec<RewardReceipt>,
        failed: Vec<RewardFailure>,
    },

    Error {
        code: String,
        message: String,
    },

    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}

/// Round status carried in snapshots and join replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStatus {
    pub number: u64,
    pub is_active: bool,
    /// Milliseconds left in the active round, 0 otherwise
    pub remaining_time: u64,
}

/// Why a round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundEndReason {
    /// Duration elapsed
    Expired,
    /// Last active player left
    Abandoned,
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub score: u32,
    pub is_alive: bool,
    pub weapon: Weapon,
    pub joined_at: DateTime<Utc>,
}

/// Pickup state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupSnapshot {
    pub id: String,
    pub position: Vec3,
    pub is_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_collected_at: Option<u64>,
}

/// Player owed a reward at round end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligiblePlayer {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
}

/// Successful reward settlement for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardReceipt {
    pub player_id: PlayerId,
    pub score: u32,
    /// Opaque reference returned by the settlement backend (e.g. tx hash)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Failed reward settlement for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardFailure {
    pub player_id: PlayerId,
    pub score: u32,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_camel_case_tags() {
        let raw = r#"{"type":"missileHit","missileId":"m1","shooterId":"0xa","targetId":"0xb","hitPosition":{"x":1,"y":0,"z":2}}"#;
        let msg: ClientMsg = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMsg::MissileHit {
                shooter_id,
                target_id,
                hit_position,
                ..
            } => {
                assert_eq!(shooter_id, "0xa");
                assert_eq!(target_id, "0xb");
                assert_eq!(hit_position, Vec3::new(1.0, 0.0, 2.0));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn join_without_display_name_parses() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"joinGame","identity":"0xabc"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::JoinGame { display_name: None, .. }));
    }

    #[test]
    fn wrong_typed_fields_fail_to_parse() {
        let raw = r#"{"type":"playerPosition","position":"here","rotation":{"x":0,"y":0,"z":0},"isAlive":true}"#;
        assert!(serde_json::from_str::<ClientMsg>(raw).is_err());
    }

    #[test]
    fn rejection_serializes_with_reason_string() {
        let msg = ServerMsg::WeaponPickupResponse {
            success: false,
            pickup_id: "pickup-1".to_string(),
            reason: Some(RejectReason::AlreadyArmed),
            weapon: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "weaponPickupResponse");
        assert_eq!(json["reason"], "already-armed");
        assert_eq!(json["pickupId"], "pickup-1");
        assert!(json.get("weapon").is_none());
    }

    #[test]
    fn weapon_wire_names() {
        assert_eq!(serde_json::to_string(&Weapon::None).unwrap(), "\"none\"");
        assert_eq!(serde_json::to_string(&Weapon::Missile).unwrap(), "\"missile\"");
    }
}
