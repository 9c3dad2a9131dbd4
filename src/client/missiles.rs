//! Client-side missile flight and hit reporting

use tracing::debug;
use uuid::Uuid;

use crate::game::math::Vec3;
use crate::ws::protocol::{ClientMsg, PlayerId};

use super::collision::{CollisionDetector, MissileProbe, TargetProbe};

#[derive(Debug, Clone, Copy)]
pub struct MissileConfig {
    /// Units per second
    pub speed: f32,
    pub lifetime_ms: u64,
    pub radius: f32,
    /// Spawn this far ahead of the shooter so it does not start inside them
    pub muzzle_offset: f32,
    /// Collision proxy used for remote players
    pub target_half_extents: Vec3,
}

impl Default for MissileConfig {
    fn default() -> Self {
        Self {
            speed: 60.0,
            lifetime_ms: 3_000,
            radius: 0.25,
            muzzle_offset: 2.0,
            target_half_extents: Vec3::new(1.0, 1.0, 2.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Missile {
    pub id: String,
    pub shooter_id: PlayerId,
    pub position: Vec3,
    pub previous_position: Vec3,
    pub direction: Vec3,
    /// Local clock, ms
    pub spawned_at: u64,
    /// Fired by this client; only these are hit-tested
    pub is_local: bool,
}

/// In-flight missiles, local and remote
#[derive(Debug, Clone, Default)]
pub struct MissileSystem {
    config: MissileConfig,
    missiles: Vec<Missile>,
}

impl MissileSystem {
    pub fn new(config: MissileConfig) -> Self {
        Self {
            config,
            missiles: Vec::new(),
        }
    }

    /// Launch a local missile and build the `missileFire` report.
    /// None when the heading is degenerate.
    pub fn fire_local(
        &mut self,
        shooter_id: &str,
        origin: Vec3,
        heading: Vec3,
        now: u64,
    ) -> Option<ClientMsg> {
        let direction = heading.normalized()?;
        let position = origin + direction * self.config.muzzle_offset;
        let id = Uuid::new_v4().to_string();

        self.missiles.push(Missile {
            id: id.clone(),
            shooter_id: shooter_id.to_string(),
            position,
            previous_position: position,
            direction,
            spawned_at: now,
            is_local: true,
        });

        Some(ClientMsg::MissileFire {
            missile_id: id,
            shooter_id: shooter_id.to_string(),
            position,
            direction,
        })
    }

    /// Display-only missile relayed by the server
    pub fn spawn_remote(
        &mut self,
        missile_id: String,
        shooter_id: PlayerId,
        position: Vec3,
        direction: Vec3,
        now: u64,
    ) {
        let Some(direction) = direction.normalized() else {
            debug!(missile_id = %missile_id, "Ignoring remote missile without heading");
            return;
        };
        if self.missiles.iter().any(|m| m.id == missile_id) {
            return;
        }
        self.missiles.push(Missile {
            id: missile_id,
            shooter_id,
            position,
            previous_position: position,
            direction,
            spawned_at: now,
            is_local: false,
        });
    }

    /// Integrate every missile and drop expired ones
    pub fn advance(&mut self, dt: f32, now: u64) {
        let lifetime = self.config.lifetime_ms;
        self.missiles
            .retain(|m| now.saturating_sub(m.spawned_at) < lifetime);

        let step = self.config.speed * dt.max(0.0);
        for missile in &mut self.missiles {
            missile.previous_position = missile.position;
            missile.position = missile.position + missile.direction * step;
        }
    }

    /// Hit-test local missiles against remote targets. Each missile reports
    /// at most one hit and is removed when it does. The shooter is never a
    /// target.
    pub fn detect_hits(
        &mut self,
        targets: &[(PlayerId, Vec3)],
        detector: &CollisionDetector,
    ) -> Vec<ClientMsg> {
        let mut reports = Vec::new();
        let half_extents = self.config.target_half_extents;
        let radius = self.config.radius;

        self.missiles.retain(|missile| {
            if !missile.is_local {
                return true;
            }
            let probe = MissileProbe {
                position: missile.position,
                previous_position: missile.previous_position,
                radius,
            };

            let hit = targets
                .iter()
                .filter(|(id, _)| *id != missile.shooter_id)
                .find_map(|(id, position)| {
                    let result = detector.test(
                        &probe,
                        &TargetProbe {
                            position: *position,
                            half_extents,
                        },
                    );
                    result
                        .hit
                        .then(|| (id.clone(), result.point.unwrap_or(missile.position)))
                });

            match hit {
                Some((target_id, hit_position)) => {
                    debug!(missile_id = %missile.id, target_id = %target_id, "Local missile hit");
                    reports.push(ClientMsg::MissileHit {
                        missile_id: missile.id.clone(),
                        shooter_id: missile.shooter_id.clone(),
                        target_id,
                        hit_position,
                    });
                    false
                }
                None => true,
            }
        });

        reports
    }

    pub fn iter(&self) -> impl Iterator<Item = &Missile> {
        self.missiles.iter()
    }

    pub fn len(&self) -> usize {
        self.missiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missiles.is_empty()
    }

    pub fn clear(&mut self) {
        self.missiles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::collision::CollisionMethod;

    #[test]
    fn fire_builds_report_ahead_of_shooter() {
        let mut system = MissileSystem::default();
        let msg = system
            .fire_local("me", Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0), 0)
            .unwrap();
        match msg {
            ClientMsg::MissileFire {
                shooter_id,
                position,
                direction,
                ..
            } => {
                assert_eq!(shooter_id, "me");
                assert_eq!(direction, Vec3::new(0.0, 0.0, 1.0));
                assert_eq!(position, Vec3::new(0.0, 0.0, 2.0));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(system.fire_local("me", Vec3::ZERO, Vec3::ZERO, 0).is_none());
    }

    #[test]
    fn missiles_expire_after_lifetime() {
        let mut system = MissileSystem::default();
        system.fire_local("me", Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 0);
        system.advance(0.016, 2_999);
        assert_eq!(system.len(), 1);
        system.advance(0.016, 3_000);
        assert!(system.is_empty());
    }

    #[test]
    fn local_missile_hits_first_target_once() {
        let mut system = MissileSystem::default();
        let detector = CollisionDetector::new(CollisionMethod::RaySegment);
        system.fire_local("me", Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0), 0);

        let targets = vec![
            ("me".to_string(), Vec3::new(0.0, 1.0, 5.0)),
            ("them".to_string(), Vec3::new(0.0, 1.0, 5.0)),
        ];
        // 60 units/s for 0.1 s sweeps from z=2 to z=8 through the target
        system.advance(0.1, 100);
        let hits = system.detect_hits(&targets, &detector);
        assert_eq!(hits.len(), 1);
        assert!(matches!(
            &hits[0],
            ClientMsg::MissileHit { target_id, shooter_id, .. }
                if target_id == "them" && shooter_id == "me"
        ));
        assert!(system.is_empty());
        assert!(system.detect_hits(&targets, &detector).is_empty());
    }

    #[test]
    fn remote_missiles_are_display_only() {
        let mut system = MissileSystem::default();
        let detector = CollisionDetector::default();
        system.spawn_remote("m-1".into(), "them".into(), Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), 0);
        system.spawn_remote("m-1".into(), "them".into(), Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), 0);
        assert_eq!(system.len(), 1);

        let targets = vec![("me".to_string(), Vec3::ZERO)];
        assert!(system.detect_hits(&targets, &detector).is_empty());
        assert_eq!(system.len(), 1);
    }
}
