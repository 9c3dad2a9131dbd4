//! Authoritative in-memory record of players and weapon pickups
//!
//! The store is owned by exactly one arena instance; every mutation goes
//! through `&mut self`, so no two ingest calls interleave mid-write. Mutators
//! validate first and drop malformed input with a log line instead of
//! returning errors into the caller's control flow.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::math::Vec3;
use crate::game::pickups::PickupField;
use crate::ws::protocol::{EligiblePlayer, PlayerId, PlayerSnapshot, RejectReason, Weapon};

/// Transport connection a player is bound to
pub type ConnectionId = Uuid;

/// Longest accepted identity string
pub const MAX_IDENTITY_LEN: usize = 128;
/// Display names are truncated to this many characters
pub const MAX_NAME_LEN: usize = 24;

/// Authoritative player record
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Vec3,
    pub rotation: Vec3,
    /// Kills this round
    pub score: u32,
    pub is_alive: bool,
    /// Connected, as opposed to disconnected-but-retained for rewards
    pub is_active: bool,
    pub weapon: Weapon,
    pub joined_at: DateTime<Utc>,
    pub connection: Option<ConnectionId>,
}

impl Player {
    fn new(id: PlayerId, name: String, spawn: Vec3, connection: ConnectionId) -> Self {
        Self {
            id,
            name,
            position: spawn,
            rotation: Vec3::ZERO,
            score: 0,
            is_alive: true,
            is_active: true,
            weapon: Weapon::None,
            joined_at: Utc::now(),
            connection: Some(connection),
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            position: self.position,
            rotation: self.rotation,
            score: self.score,
            is_alive: self.is_alive,
            weapon: self.weapon,
            joined_at: self.joined_at,
        }
    }
}

/// Result of a successful join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub is_new_player: bool,
    /// Previous connection, when the id was already active elsewhere
    pub replaced_connection: Option<ConnectionId>,
}

/// Trim and validate a client-supplied identity
pub fn normalize_identity(raw: &str) -> Result<PlayerId, RejectReason> {
    let id = raw.trim();
    if id.is_empty() || id.len() > MAX_IDENTITY_LEN || id.chars().any(char::is_control) {
        return Err(RejectReason::InvalidIdentity);
    }
    Ok(id.to_string())
}

/// Trim and truncate a display name, falling back to one derived from the id
pub fn sanitize_name(raw: Option<&str>, id: &str) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();

    if cleaned.is_empty() {
        format!("Player_{}", id.chars().take(6).collect::<String>())
    } else {
        cleaned
    }
}

/// Players and pickups, plus the dirty flag read by the tick broadcaster
#[derive(Debug)]
pub struct EntityStore {
    players: HashMap<PlayerId, Player>,
    pickups: PickupField,
    max_players: usize,
    dirty: bool,
}

impl EntityStore {
    pub fn new(pickups: PickupField, max_players: usize) -> Self {
        Self {
            players: HashMap::new(),
            pickups,
            max_players,
            dirty: false,
        }
    }

    /// Create, reactivate or rebind a player.
    ///
    /// A reactivated player keeps its score only while a round is active.
    pub fn join(
        &mut self,
        id: &str,
        name: &str,
        connection: ConnectionId,
        spawn: Vec3,
        round_active: bool,
    ) -> Result<JoinOutcome, RejectReason> {
        let active = self.active_count();

        if let Some(player) = self.players.get_mut(id) {
            if player.is_active {
                let replaced = player.connection.replace(connection);
                player.name = name.to_string();
                self.dirty = true;
                info!(player_id = %id, "Player rebound to new connection");
                return Ok(JoinOutcome {
                    is_new_player: false,
                    replaced_connection: replaced.filter(|c| *c != connection),
                });
            }

            if active >= self.max_players {
                return Err(RejectReason::GameFull);
            }

            player.is_active = true;
            player.is_alive = true;
            player.weapon = Weapon::None;
            player.position = spawn;
            player.rotation = Vec3::ZERO;
            player.name = name.to_string();
            player.connection = Some(connection);
            if !round_active {
                player.score = 0;
            }
            self.dirty = true;
            info!(player_id = %id, score = player.score, "Player reactivated");
            return Ok(JoinOutcome {
                is_new_player: false,
                replaced_connection: None,
            });
        }

        if active >= self.max_players {
            return Err(RejectReason::GameFull);
        }

        self.players.insert(
            id.to_string(),
            Player::new(id.to_string(), name.to_string(), spawn, connection),
        );
        self.dirty = true;
        info!(player_id = %id, "Player created");
        Ok(JoinOutcome {
            is_new_player: true,
            replaced_connection: None,
        })
    }

    /// Write a reported transform. Returns false (and logs) when rejected.
    pub fn apply_position(&mut self, id: &str, position: Vec3, rotation: Vec3) -> bool {
        if !position.is_finite() || !rotation.is_finite() {
            warn!(player_id = %id, "Dropping position with non-finite coordinates");
            return false;
        }

        match self.players.get_mut(id) {
            Some(player) if player.is_active => {
                player.position = position;
                player.rotation = rotation;
                self.dirty = true;
                true
            }
            _ => {
                debug!(player_id = %id, "Dropping position for unknown or inactive player");
                false
            }
        }
    }

    pub fn set_weapon(&mut self, id: &str, weapon: Weapon) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                if weapon.is_armed() && !player.is_alive {
                    warn!(player_id = %id, "Refusing to arm a dead player");
                    return false;
                }
                if player.weapon != weapon {
                    player.weapon = weapon;
                    self.dirty = true;
                }
                true
            }
            None => false,
        }
    }

    /// Setting a player dead also clears their weapon
    pub fn set_alive(&mut self, id: &str, alive: bool) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.is_alive = alive;
                if !alive {
                    player.weapon = Weapon::None;
                }
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Bring a dead player back at the given transform
    pub fn respawn(&mut self, id: &str, position: Vec3, rotation: Vec3) -> bool {
        match self.players.get_mut(id) {
            Some(player) if player.is_active && !player.is_alive => {
                player.is_alive = true;
                player.weapon = Weapon::None;
                player.position = position;
                player.rotation = rotation;
                self.dirty = true;
                true
            }
            _ => false,
        }
    }

    /// Soft delete: the record and its score stay for reward settlement
    pub fn disconnect(&mut self, id: &str) -> bool {
        match self.players.get_mut(id) {
            Some(player) if player.is_active => {
                player.is_active = false;
                player.weapon = Weapon::None;
                player.connection = None;
                self.dirty = true;
                info!(player_id = %id, score = player.score, "Player marked inactive");
                true
            }
            _ => false,
        }
    }

    /// Hard removal of every player; pickups return to their initial state
    pub fn reset(&mut self) {
        let removed = self.players.len();
        self.players.clear();
        self.pickups.reset();
        self.dirty = true;
        info!(removed, "Entity store reset");
    }

    /// Player bound to a connection, if any
    pub fn player_for_connection(&self, connection: ConnectionId) -> Option<&Player> {
        self.players
            .values()
            .find(|p| p.connection == Some(connection))
    }

    pub fn get(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn active_count(&self) -> usize {
        self.players.values().filter(|p| p.is_active).count()
    }

    pub fn total_count(&self) -> usize {
        self.players.len()
    }

    /// Round start: every active player begins from zero
    pub fn reset_active_scores(&mut self) {
        for player in self.players.values_mut().filter(|p| p.is_active) {
            player.score = 0;
        }
        self.dirty = true;
    }

    /// Round end: nobody carries points over, connected or not
    pub fn clear_all_scores(&mut self) {
        for player in self.players.values_mut() {
            player.score = 0;
        }
        self.dirty = true;
    }

    /// Players with a positive score, regardless of connection state
    pub fn eligible_players(&self) -> Vec<EligiblePlayer> {
        let mut eligible: Vec<EligiblePlayer> = self
            .players
            .values()
            .filter(|p| p.score > 0)
            .map(|p| EligiblePlayer {
                player_id: p.id.clone(),
                name: p.name.clone(),
                score: p.score,
            })
            .collect();
        eligible.sort_by(|a, b| b.score.cmp(&a.score).then(a.player_id.cmp(&b.player_id)));
        eligible
    }

    /// Add one kill; returns the new score
    pub fn award_point(&mut self, id: &str) -> Option<u32> {
        let player = self.players.get_mut(id)?;
        player.score += 1;
        self.dirty = true;
        Some(player.score)
    }

    /// Positions of alive, active players other than `except`
    pub fn alive_positions(&self, except: Option<&str>) -> Vec<Vec3> {
        self.players
            .values()
            .filter(|p| p.is_active && p.is_alive && Some(p.id.as_str()) != except)
            .map(|p| p.position)
            .collect()
    }

    /// Collect a pickup on behalf of a player and arm them on success
    pub fn collect_pickup(
        &mut self,
        pickup_id: &str,
        player_id: &str,
        now: u64,
    ) -> Result<Weapon, RejectReason> {
        let player = self
            .players
            .get_mut(player_id)
            .filter(|p| p.is_active)
            .ok_or(RejectReason::NotJoined)?;

        if !player.is_alive {
            return Err(RejectReason::NotAlive);
        }

        let weapon = self
            .pickups
            .collect(pickup_id, player_id, player.weapon.is_armed(), now)?;
        player.weapon = weapon;
        self.dirty = true;
        Ok(weapon)
    }

    pub fn pickups(&self) -> &PickupField {
        &self.pickups
    }

    pub fn pickups_mut(&mut self) -> &mut PickupField {
        &mut self.pickups
    }

    pub fn active_player_snapshots(&self) -> Vec<PlayerSnapshot> {
        let mut players: Vec<PlayerSnapshot> = self
            .players
            .values()
            .filter(|p| p.is_active)
            .map(Player::snapshot)
            .collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        players
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read and clear the dirty flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::pickups::WeaponPickup;

    fn store() -> EntityStore {
        EntityStore::new(
            PickupField::new(vec![WeaponPickup::new("p1", Vec3::new(5.0, 0.5, 0.0))]),
            2,
        )
    }

    fn join(store: &mut EntityStore, id: &str, round_active: bool) -> JoinOutcome {
        store
            .join(id, id, Uuid::new_v4(), Vec3::ZERO, round_active)
            .unwrap()
    }

    #[test]
    fn join_creates_then_reactivates() {
        let mut store = store();
        assert!(join(&mut store, "0xa", false).is_new_player);
        assert!(store.disconnect("0xa"));
        assert_eq!(store.active_count(), 0);
        assert_eq!(store.total_count(), 1);
        assert!(!join(&mut store, "0xa", false).is_new_player);
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn rejoin_keeps_score_only_during_active_round() {
        let mut store = store();
        join(&mut store, "0xa", true);
        store.award_point("0xa");
        store.award_point("0xa");
        store.disconnect("0xa");

        join(&mut store, "0xa", true);
        assert_eq!(store.get("0xa").unwrap().score, 2);

        store.disconnect("0xa");
        join(&mut store, "0xa", false);
        assert_eq!(store.get("0xa").unwrap().score, 0);
    }

    #[test]
    fn active_rejoin_rebinds_connection() {
        let mut store = store();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.join("0xa", "a", first, Vec3::ZERO, false).unwrap();
        let outcome = store.join("0xa", "a", second, Vec3::ZERO, false).unwrap();
        assert_eq!(outcome.replaced_connection, Some(first));
        assert_eq!(store.player_for_connection(second).unwrap().id, "0xa");
        assert!(store.player_for_connection(first).is_none());
    }

    #[test]
    fn full_arena_rejects_new_players() {
        let mut store = store();
        join(&mut store, "0xa", false);
        join(&mut store, "0xb", false);
        let result = store.join("0xc", "c", Uuid::new_v4(), Vec3::ZERO, false);
        assert_eq!(result, Err(RejectReason::GameFull));
    }

    #[test]
    fn non_finite_positions_are_dropped() {
        let mut store = store();
        join(&mut store, "0xa", false);
        store.take_dirty();

        let bad = Vec3::new(f32::NAN, 0.0, 0.0);
        assert!(!store.apply_position("0xa", bad, Vec3::ZERO));
        assert!(!store.apply_position("0xa", Vec3::ZERO, Vec3::new(0.0, f32::INFINITY, 0.0)));
        assert!(!store.is_dirty());

        assert!(store.apply_position("0xa", Vec3::new(1.0, 0.0, 2.0), Vec3::ZERO));
        assert_eq!(store.get("0xa").unwrap().position, Vec3::new(1.0, 0.0, 2.0));
        assert!(store.take_dirty());
    }

    #[test]
    fn death_clears_weapon() {
        let mut store = store();
        join(&mut store, "0xa", false);
        assert!(store.set_weapon("0xa", Weapon::Missile));
        store.set_alive("0xa", false);
        let player = store.get("0xa").unwrap();
        assert!(!player.is_alive);
        assert_eq!(player.weapon, Weapon::None);
        assert!(!store.set_weapon("0xa", Weapon::Missile));
    }

    #[test]
    fn eligible_players_include_disconnected() {
        let mut store = store();
        join(&mut store, "0xa", true);
        join(&mut store, "0xb", true);
        store.award_point("0xa");
        store.disconnect("0xa");

        let eligible = store.eligible_players();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].player_id, "0xa");
        assert_eq!(eligible[0].score, 1);

        store.clear_all_scores();
        assert!(store.eligible_players().is_empty());
    }

    #[test]
    fn pickup_collection_arms_player() {
        let mut store = store();
        join(&mut store, "0xa", false);
        join(&mut store, "0xb", false);

        assert_eq!(store.collect_pickup("p1", "0xa", 10), Ok(Weapon::Missile));
        assert_eq!(store.get("0xa").unwrap().weapon, Weapon::Missile);
        assert_eq!(
            store.collect_pickup("p1", "0xb", 11),
            Err(RejectReason::Unavailable)
        );

        store.set_alive("0xb", false);
        assert_eq!(
            store.collect_pickup("p1", "0xb", 12),
            Err(RejectReason::NotAlive)
        );
    }

    #[test]
    fn reset_removes_everyone() {
        let mut store = store();
        join(&mut store, "0xa", false);
        store.collect_pickup("p1", "0xa", 10).unwrap();
        store.reset();
        assert_eq!(store.total_count(), 0);
        assert!(store.pickups().get("p1").unwrap().is_available);
    }

    #[test]
    fn identity_and_name_validation() {
        assert_eq!(normalize_identity("  0xabc  ").unwrap(), "0xabc");
        assert_eq!(normalize_identity("   "), Err(RejectReason::InvalidIdentity));
        assert_eq!(
            normalize_identity(&"x".repeat(MAX_IDENTITY_LEN + 1)),
            Err(RejectReason::InvalidIdentity)
        );
        assert_eq!(sanitize_name(None, "0xabcdef99"), "Player_0xabcd");
        assert_eq!(sanitize_name(Some(&"n".repeat(40)), "id").len(), MAX_NAME_LEN);
    }
}
