//! Combat resolution - missile fire, client-reported hits, respawn placement

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::game::math::Vec3;
use crate::game::store::EntityStore;
use crate::ws::protocol::{PlayerId, Weapon};

/// Radius of the default spawn ring
const SPAWN_RING_RADIUS: f32 = 25.0;
/// Spawn points on the default ring
const SPAWN_POINT_COUNT: usize = 8;

/// Outcome of a fire request from a validated shooter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Weapon consumed; relay the spawn to everyone else
    Launched,
    UnknownShooter,
    NotAlive,
    NotArmed,
}

/// Outcome of a hit report from a validated shooter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// Target eliminated; carries the shooter's score afterwards
    Eliminated { shooter_score: u32 },
    /// Target was already dead, nothing awarded
    TargetAlreadyDead,
    UnknownShooter,
    UnknownTarget,
    SelfHit,
}

/// Combat rules applied to the entity store
pub struct CombatSystem;

impl CombatSystem {
    /// Consume the shooter's weapon for a launch
    pub fn resolve_fire(store: &mut EntityStore, shooter_id: &str) -> FireOutcome {
        let Some(shooter) = store.get(shooter_id).filter(|p| p.is_active) else {
            return FireOutcome::UnknownShooter;
        };
        if !shooter.is_alive {
            return FireOutcome::NotAlive;
        }
        if !shooter.weapon.is_armed() {
            return FireOutcome::NotArmed;
        }

        store.set_weapon(shooter_id, Weapon::None);
        FireOutcome::Launched
    }

    /// Apply a hit the shooter's client detected.
    ///
    /// The caller has already checked that the reporter is the shooter. A
    /// report against a dead target changes nothing, so duplicates never
    /// award a second point.
    pub fn resolve_hit(
        store: &mut EntityStore,
        shooter_id: &str,
        target_id: &str,
        award_points: bool,
    ) -> HitOutcome {
        if shooter_id == target_id {
            return HitOutcome::SelfHit;
        }
        let Some(shooter) = store.get(shooter_id).filter(|p| p.is_active) else {
            return HitOutcome::UnknownShooter;
        };
        let shooter_score = shooter.score;

        match store.get(target_id) {
            None => return HitOutcome::UnknownTarget,
            Some(target) if !target.is_alive => return HitOutcome::TargetAlreadyDead,
            Some(_) => {}
        }

        store.set_alive(target_id, false);
        let shooter_score = if award_points {
            store.award_point(shooter_id).unwrap_or(shooter_score)
        } else {
            shooter_score
        };

        debug!(shooter_id, target_id, shooter_score, "Target eliminated");
        HitOutcome::Eliminated { shooter_score }
    }
}

/// Chosen respawn transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnChoice {
    pub position: Vec3,
    pub rotation: Vec3,
    /// True when every candidate was contested and the centre was used
    pub used_fallback: bool,
}

/// Candidate spawn points on a ring around the centre
pub fn default_spawn_points() -> Vec<Vec3> {
    (0..SPAWN_POINT_COUNT)
        .map(|i| {
            let angle = (i as f32 + 0.5) / SPAWN_POINT_COUNT as f32 * std::f32::consts::TAU;
            Vec3::new(
                angle.cos() * SPAWN_RING_RADIUS,
                0.0,
                angle.sin() * SPAWN_RING_RADIUS,
            )
        })
        .collect()
}

/// Picks respawn points away from alive players
pub struct SpawnSelector {
    candidates: Vec<Vec3>,
    min_distance: f32,
    max_attempts: usize,
    fallback: Vec3,
    rng: ChaCha8Rng,
}

impl SpawnSelector {
    pub fn new(candidates: Vec<Vec3>, min_distance: f32, max_attempts: usize, seed: u64) -> Self {
        Self {
            candidates,
            min_distance,
            max_attempts,
            fallback: Vec3::ZERO,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Try candidates in random order, at most `max_attempts` of them, and
    /// take the first one no alive player is within `min_distance` of.
    /// Never fails: contested arenas fall back to the centre.
    pub fn select(&mut self, occupied: &[Vec3]) -> SpawnChoice {
        let mut order: Vec<usize> = (0..self.candidates.len()).collect();
        order.shuffle(&mut self.rng);

        for &idx in order.iter().take(self.max_attempts) {
            let candidate = self.candidates[idx];
            let clear = occupied
                .iter()
                .all(|p| p.distance_xz(&candidate) >= self.min_distance);
            if clear {
                return SpawnChoice {
                    position: candidate,
                    rotation: facing_centre(&candidate),
                    used_fallback: false,
                };
            }
        }

        SpawnChoice {
            position: self.fallback,
            rotation: Vec3::ZERO,
            used_fallback: true,
        }
    }
}

/// Euler rotation whose yaw points from `position` toward the origin
fn facing_centre(position: &Vec3) -> Vec3 {
    Vec3::new(0.0, (-position.x).atan2(-position.z), 0.0)
}

/// Respawn owed to an eliminated player
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRespawn {
    pub player_id: PlayerId,
    pub due_at: u64,
}

/// Respawns scheduled after eliminations. Entries are never cancelled; the
/// consumer checks the player is still present and dead when one comes due.
#[derive(Debug, Default)]
pub struct RespawnQueue {
    pending: Vec<PendingRespawn>,
}

impl RespawnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a respawn; a later schedule for the same player replaces it
    pub fn schedule(&mut self, player_id: PlayerId, due_at: u64) {
        self.pending.retain(|p| p.player_id != player_id);
        self.pending.push(PendingRespawn { player_id, due_at });
    }

    /// Remove and return every respawn due at `now`, earliest first
    pub fn drain_due(&mut self, now: u64) -> Vec<PlayerId> {
        let (mut due, later): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due_at <= now);
        self.pending = later;
        due.sort_by_key(|p| p.due_at);
        due.into_iter().map(|p| p.player_id).collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::pickups::PickupField;
    use uuid::Uuid;

    fn store_with(ids: &[&str]) -> EntityStore {
        let mut store = EntityStore::new(PickupField::default(), 16);
        for id in ids {
            store
                .join(id, id, Uuid::new_v4(), Vec3::ZERO, true)
                .unwrap();
        }
        store
    }

    #[test]
    fn second_hit_on_dead_target_awards_nothing() {
        let mut store = store_with(&["shooter", "target"]);

        assert_eq!(
            CombatSystem::resolve_hit(&mut store, "shooter", "target", true),
            HitOutcome::Eliminated { shooter_score: 1 }
        );
        assert_eq!(
            CombatSystem::resolve_hit(&mut store, "shooter", "target", true),
            HitOutcome::TargetAlreadyDead
        );
        assert_eq!(store.get("shooter").unwrap().score, 1);
        assert!(!store.get("target").unwrap().is_alive);
    }

    #[test]
    fn elimination_outside_round_scores_nothing() {
        let mut store = store_with(&["shooter", "target"]);
        assert_eq!(
            CombatSystem::resolve_hit(&mut store, "shooter", "target", false),
            HitOutcome::Eliminated { shooter_score: 0 }
        );
    }

    #[test]
    fn hit_validation_rejects_nonsense() {
        let mut store = store_with(&["a"]);
        assert_eq!(
            CombatSystem::resolve_hit(&mut store, "a", "a", true),
            HitOutcome::SelfHit
        );
        assert_eq!(
            CombatSystem::resolve_hit(&mut store, "a", "ghost", true),
            HitOutcome::UnknownTarget
        );
        assert_eq!(
            CombatSystem::resolve_hit(&mut store, "ghost", "a", true),
            HitOutcome::UnknownShooter
        );
    }

    #[test]
    fn firing_consumes_the_weapon() {
        let mut store = store_with(&["a"]);
        assert_eq!(CombatSystem::resolve_fire(&mut store, "a"), FireOutcome::NotArmed);
        store.set_weapon("a", Weapon::Missile);
        assert_eq!(CombatSystem::resolve_fire(&mut store, "a"), FireOutcome::Launched);
        assert_eq!(store.get("a").unwrap().weapon, Weapon::None);
    }

    #[test]
    fn spawn_avoids_alive_players() {
        let candidates = vec![
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(-2.0, 0.0, -2.0),
        ];
        let occupied = [Vec3::ZERO];

        for seed in 0..32 {
            let mut selector = SpawnSelector::new(candidates.clone(), 5.0, 10, seed);
            let choice = selector.select(&occupied);
            assert!(!choice.used_fallback);
            assert_eq!(choice.position, Vec3::new(10.0, 0.0, 0.0));
        }
    }

    #[test]
    fn contested_spawn_falls_back_to_centre() {
        let candidates = vec![Vec3::new(3.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -4.0)];
        let mut selector = SpawnSelector::new(candidates, 5.0, 10, 7);
        let choice = selector.select(&[Vec3::ZERO]);
        assert!(choice.used_fallback);
        assert_eq!(choice.position, Vec3::ZERO);
    }

    #[test]
    fn empty_arena_spawns_on_a_candidate() {
        let mut selector = SpawnSelector::new(default_spawn_points(), 5.0, 10, 1);
        let choice = selector.select(&[]);
        assert!(!choice.used_fallback);
        assert!((choice.position.distance_xz(&Vec3::ZERO) - SPAWN_RING_RADIUS).abs() < 1e-3);
    }

    #[test]
    fn respawn_queue_drains_only_due_entries() {
        let mut queue = RespawnQueue::new();
        queue.schedule("a".into(), 5_000);
        queue.schedule("b".into(), 3_000);
        queue.schedule("a".into(), 6_000);
        assert_eq!(queue.len(), 2);

        assert!(queue.drain_due(2_999).is_empty());
        assert_eq!(queue.drain_due(5_500), vec!["b".to_string()]);
        assert_eq!(queue.drain_due(6_000), vec!["a".to_string()]);
        assert!(queue.is_empty());
    }
}
