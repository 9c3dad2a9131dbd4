//! Weapon pickups and the global respawn clock
//!
//! All pickups share one respawn instant. When the scheduler fires, every
//! collected pickup becomes available in the same pass, so pickup state stays
//! predictable for every player instead of rolling per-pickup timers.

use std::time::Duration;

use tracing::debug;

use crate::game::math::Vec3;
use crate::ws::protocol::{PickupSnapshot, RejectReason, Weapon};

/// Radius of the default pickup ring
const DEFAULT_RING_RADIUS: f32 = 40.0;
/// Pickups on the default ring
const DEFAULT_PICKUP_COUNT: usize = 8;

/// Weapon pickup at a fixed position
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponPickup {
    pub id: String,
    pub position: Vec3,
    pub is_available: bool,
    pub last_collected_at: Option<u64>,
}

impl WeaponPickup {
    pub fn new(id: impl Into<String>, position: Vec3) -> Self {
        Self {
            id: id.into(),
            position,
            is_available: true,
            last_collected_at: None,
        }
    }

    pub fn snapshot(&self) -> PickupSnapshot {
        PickupSnapshot {
            id: self.id.clone(),
            position: self.position,
            is_available: self.is_available,
            last_collected_at: self.last_collected_at,
        }
    }
}

/// Ring of pickups around the arena centre
pub fn default_layout() -> Vec<WeaponPickup> {
    (0..DEFAULT_PICKUP_COUNT)
        .map(|i| {
            let angle = i as f32 / DEFAULT_PICKUP_COUNT as f32 * std::f32::consts::TAU;
            WeaponPickup::new(
                format!("pickup-{}", i + 1),
                Vec3::new(
                    angle.cos() * DEFAULT_RING_RADIUS,
                    0.5,
                    angle.sin() * DEFAULT_RING_RADIUS,
                ),
            )
        })
        .collect()
}

/// All pickups in the arena, in layout order
#[derive(Debug, Clone)]
pub struct PickupField {
    pickups: Vec<WeaponPickup>,
}

impl PickupField {
    pub fn new(pickups: Vec<WeaponPickup>) -> Self {
        Self { pickups }
    }

    /// Check-then-set collection. Either fails with a reason or flips the
    /// pickup unavailable and hands out its weapon, in one step.
    pub fn collect(
        &mut self,
        pickup_id: &str,
        player_id: &str,
        player_already_has_weapon: bool,
        now: u64,
    ) -> Result<Weapon, RejectReason> {
        let pickup = self
            .pickups
            .iter_mut()
            .find(|p| p.id == pickup_id)
            .ok_or(RejectReason::NotFound)?;

        if !pickup.is_available {
            return Err(RejectReason::Unavailable);
        }
        if player_already_has_weapon {
            return Err(RejectReason::AlreadyArmed);
        }

        pickup.is_available = false;
        pickup.last_collected_at = Some(now);
        debug!(pickup_id, player_id, "Pickup collected");
        Ok(Weapon::Missile)
    }

    /// Make every unavailable pickup available. Returns the ids that flipped.
    pub fn respawn_all(&mut self) -> Vec<String> {
        self.pickups
            .iter_mut()
            .filter(|p| !p.is_available)
            .map(|p| {
                p.is_available = true;
                p.id.clone()
            })
            .collect()
    }

    /// Back to the initial layout state
    pub fn reset(&mut self) {
        for pickup in &mut self.pickups {
            pickup.is_available = true;
            pickup.last_collected_at = None;
        }
    }

    pub fn get(&self, pickup_id: &str) -> Option<&WeaponPickup> {
        self.pickups.iter().find(|p| p.id == pickup_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeaponPickup> {
        self.pickups.iter()
    }

    pub fn snapshots(&self) -> Vec<PickupSnapshot> {
        self.pickups.iter().map(WeaponPickup::snapshot).collect()
    }
}

impl Default for PickupField {
    fn default() -> Self {
        Self::new(default_layout())
    }
}

/// Global respawn timer for all pickups
#[derive(Debug, Clone)]
pub struct PickupRespawnScheduler {
    interval_ms: u64,
    next_global_respawn_at: u64,
}

impl PickupRespawnScheduler {
    pub fn new(interval: Duration, now: u64) -> Self {
        let interval_ms = interval.as_millis() as u64;
        Self {
            interval_ms,
            next_global_respawn_at: now + interval_ms,
        }
    }

    pub fn next_global_respawn_at(&self) -> u64 {
        self.next_global_respawn_at
    }

    pub fn is_due(&self, now: u64) -> bool {
        now >= self.next_global_respawn_at
    }

    /// Timer fired: respawn everything and arm the next instant
    pub fn fire(&mut self, field: &mut PickupField, now: u64) -> Vec<String> {
        self.next_global_respawn_at = now + self.interval_ms;
        field.respawn_all()
    }

    /// Fire only if the global instant has been reached
    pub fn poll(&mut self, field: &mut PickupField, now: u64) -> Option<Vec<String>> {
        if self.is_due(now) {
            Some(self.fire(field, now))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> PickupField {
        PickupField::new(vec![
            WeaponPickup::new("a", Vec3::new(0.0, 0.5, 10.0)),
            WeaponPickup::new("b", Vec3::new(10.0, 0.5, 0.0)),
            WeaponPickup::new("c", Vec3::new(-10.0, 0.5, 0.0)),
        ])
    }

    #[test]
    fn exactly_one_of_many_collectors_succeeds() {
        let mut field = field();
        let results: Vec<_> = (0..8)
            .map(|i| field.collect("a", &format!("player-{i}"), false, 1_000))
            .collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert_eq!(results[0], Ok(Weapon::Missile));
        assert!(results[1..]
            .iter()
            .all(|r| *r == Err(RejectReason::Unavailable)));
    }

    #[test]
    fn collection_failure_reasons() {
        let mut field = field();
        assert_eq!(
            field.collect("missing", "p", false, 0),
            Err(RejectReason::NotFound)
        );
        assert_eq!(
            field.collect("b", "p", true, 0),
            Err(RejectReason::AlreadyArmed)
        );
        // an armed rejection leaves the pickup in place
        assert!(field.get("b").unwrap().is_available);
    }

    #[test]
    fn unavailable_is_reported_before_already_armed() {
        let mut field = field();
        field.collect("c", "p1", false, 0).unwrap();
        assert_eq!(
            field.collect("c", "p2", true, 0),
            Err(RejectReason::Unavailable)
        );
    }

    #[test]
    fn collected_pickups_respawn_together() {
        let mut field = field();
        let mut scheduler = PickupRespawnScheduler::new(Duration::from_secs(15), 0);

        field.collect("a", "p1", false, 1_000).unwrap();
        field.collect("c", "p2", false, 9_000).unwrap();

        // neither comes back early, regardless of when it was collected
        assert!(scheduler.poll(&mut field, 14_999).is_none());
        assert!(!field.get("a").unwrap().is_available);
        assert!(!field.get("c").unwrap().is_available);

        let mut respawned = scheduler.poll(&mut field, 15_000).unwrap();
        respawned.sort();
        assert_eq!(respawned, vec!["a".to_string(), "c".to_string()]);
        assert!(field.iter().all(|p| p.is_available));
        assert_eq!(scheduler.next_global_respawn_at(), 30_000);
    }

    #[test]
    fn firing_with_nothing_collected_is_a_no_op() {
        let mut field = field();
        let mut scheduler = PickupRespawnScheduler::new(Duration::from_secs(15), 0);
        assert!(scheduler.fire(&mut field, 15_000).is_empty());
    }

    #[test]
    fn default_layout_has_unique_ids() {
        let layout = default_layout();
        let ids: std::collections::HashSet<_> = layout.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), DEFAULT_PICKUP_COUNT);
    }
}
