//! Missile vs. player hit tests on the client
//!
//! Each method is a [`CollisionStrategy`]. [`CollisionDetector`] runs the
//! configured one and falls back to a plain centre-distance check whenever it
//! reports an error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::math::Vec3;

/// A missile as seen by a hit test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissileProbe {
    pub position: Vec3,
    /// Position at the previous frame, used for swept tests
    pub previous_position: Vec3,
    pub radius: f32,
}

/// A target's collision proxy: an axis-aligned box around its centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetProbe {
    pub position: Vec3,
    pub half_extents: Vec3,
}

impl TargetProbe {
    fn min(&self) -> Vec3 {
        self.position - self.half_extents
    }

    fn max(&self) -> Vec3 {
        self.position + self.half_extents
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionResult {
    pub hit: bool,
    pub distance: f32,
    pub point: Option<Vec3>,
}

impl CollisionResult {
    fn miss(distance: f32) -> Self {
        Self {
            hit: false,
            distance,
            point: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollisionError {
    #[error("non-finite input")]
    NonFinite,

    #[error("target proxy has no volume")]
    EmptyProxy,

    #[error("missile did not move this frame")]
    DegenerateSegment,
}

/// One hit-test method
pub trait CollisionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn test(
        &self,
        missile: &MissileProbe,
        target: &TargetProbe,
    ) -> Result<CollisionResult, CollisionError>;
}

fn validate(missile: &MissileProbe, target: &TargetProbe) -> Result<(), CollisionError> {
    if !missile.position.is_finite()
        || !missile.previous_position.is_finite()
        || !missile.radius.is_finite()
        || !target.position.is_finite()
        || !target.half_extents.is_finite()
    {
        return Err(CollisionError::NonFinite);
    }
    let e = target.half_extents;
    if e.x <= 0.0 || e.y <= 0.0 || e.z <= 0.0 {
        return Err(CollisionError::EmptyProxy);
    }
    Ok(())
}

/// Missile centre inside the target box grown by a padding
#[derive(Debug, Clone, Copy)]
pub struct BoundingBoxStrategy {
    pub padding: f32,
}

impl Default for BoundingBoxStrategy {
    fn default() -> Self {
        Self { padding: 0.5 }
    }
}

impl CollisionStrategy for BoundingBoxStrategy {
    fn name(&self) -> &'static str {
        "bounding-box"
    }

    fn test(
        &self,
        missile: &MissileProbe,
        target: &TargetProbe,
    ) -> Result<CollisionResult, CollisionError> {
        validate(missile, target)?;
        let grow = self.padding + missile.radius;
        let pad = Vec3::new(grow, grow, grow);
        let min = target.min() - pad;
        let max = target.max() + pad;
        let p = missile.position;

        let inside = p.x >= min.x
            && p.x <= max.x
            && p.y >= min.y
            && p.y <= max.y
            && p.z >= min.z
            && p.z <= max.z;
        let distance = p.distance(&target.position);

        Ok(CollisionResult {
            hit: inside,
            distance,
            point: inside.then_some(p),
        })
    }
}

/// Missile sphere against the target box
#[derive(Debug, Clone, Copy, Default)]
pub struct SphereBoxStrategy;

impl CollisionStrategy for SphereBoxStrategy {
    fn name(&self) -> &'static str {
        "sphere-box"
    }

    fn test(
        &self,
        missile: &MissileProbe,
        target: &TargetProbe,
    ) -> Result<CollisionResult, CollisionError> {
        validate(missile, target)?;
        let closest = missile.position.clamp(&target.min(), &target.max());
        let distance = missile.position.distance(&closest);
        if distance <= missile.radius {
            Ok(CollisionResult {
                hit: true,
                distance,
                point: Some(closest),
            })
        } else {
            Ok(CollisionResult::miss(distance))
        }
    }
}

/// Segment swept by the missile this frame against the target box.
/// Catches fast missiles that would tunnel through a point test.
#[derive(Debug, Clone, Copy, Default)]
pub struct RaySegmentStrategy;

impl CollisionStrategy for RaySegmentStrategy {
    fn name(&self) -> &'static str {
        "ray-segment"
    }

    fn test(
        &self,
        missile: &MissileProbe,
        target: &TargetProbe,
    ) -> Result<CollisionResult, CollisionError> {
        validate(missile, target)?;
        let origin = missile.previous_position;
        let delta = missile.position - origin;
        if delta.length() <= f32::EPSILON {
            return Err(CollisionError::DegenerateSegment);
        }

        let grow = Vec3::new(missile.radius, missile.radius, missile.radius);
        let min = target.min() - grow;
        let max = target.max() + grow;

        // Slab test over t in [0, 1]
        let mut t_enter = 0.0f32;
        let mut t_exit = 1.0f32;
        for (o, d, lo, hi) in [
            (origin.x, delta.x, min.x, max.x),
            (origin.y, delta.y, min.y, max.y),
            (origin.z, delta.z, min.z, max.z),
        ] {
            if d.abs() <= f32::EPSILON {
                if o < lo || o > hi {
                    return Ok(CollisionResult::miss(
                        missile.position.distance(&target.position),
                    ));
                }
                continue;
            }
            let (t0, t1) = {
                let a = (lo - o) / d;
                let b = (hi - o) / d;
                if a < b { (a, b) } else { (b, a) }
            };
            t_enter = t_enter.max(t0);
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return Ok(CollisionResult::miss(
                    missile.position.distance(&target.position),
                ));
            }
        }

        let point = origin + delta * t_enter;
        Ok(CollisionResult {
            hit: true,
            distance: point.distance(&target.position),
            point: Some(point),
        })
    }
}

/// Centre-to-centre distance; the fallback for every other strategy
#[derive(Debug, Clone, Copy)]
pub struct DistanceStrategy {
    pub hit_radius: f32,
}

impl Default for DistanceStrategy {
    fn default() -> Self {
        Self { hit_radius: 2.0 }
    }
}

impl DistanceStrategy {
    /// Infallible form used by the detector's fallback path
    pub fn check(&self, missile: &MissileProbe, target: &TargetProbe) -> CollisionResult {
        let distance = missile.position.distance(&target.position);
        if distance.is_finite() && distance <= self.hit_radius + missile.radius {
            CollisionResult {
                hit: true,
                distance,
                point: Some(missile.position),
            }
        } else {
            CollisionResult::miss(distance)
        }
    }
}

impl CollisionStrategy for DistanceStrategy {
    fn name(&self) -> &'static str {
        "distance"
    }

    fn test(
        &self,
        missile: &MissileProbe,
        target: &TargetProbe,
    ) -> Result<CollisionResult, CollisionError> {
        Ok(self.check(missile, target))
    }
}

/// Selectable hit-test method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionMethod {
    #[default]
    BoundingBox,
    SphereBox,
    RaySegment,
    Distance,
}

/// Runs the configured strategy with a distance fallback
pub struct CollisionDetector {
    strategy: Box<dyn CollisionStrategy>,
    fallback: DistanceStrategy,
}

impl CollisionDetector {
    pub fn new(method: CollisionMethod) -> Self {
        let strategy: Box<dyn CollisionStrategy> = match method {
            CollisionMethod::BoundingBox => Box::new(BoundingBoxStrategy::default()),
            CollisionMethod::SphereBox => Box::new(SphereBoxStrategy),
            CollisionMethod::RaySegment => Box::new(RaySegmentStrategy),
            CollisionMethod::Distance => Box::new(DistanceStrategy::default()),
        };
        Self::with_strategy(strategy)
    }

    pub fn with_strategy(strategy: Box<dyn CollisionStrategy>) -> Self {
        Self {
            strategy,
            fallback: DistanceStrategy::default(),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn test(&self, missile: &MissileProbe, target: &TargetProbe) -> CollisionResult {
        match self.strategy.test(missile, target) {
            Ok(result) => result,
            Err(e) => {
                debug!(
                    strategy = self.strategy.name(),
                    error = %e,
                    "Hit test failed, using distance"
                );
                self.fallback.check(missile, target)
            }
        }
    }
}

impl Default for CollisionDetector {
    fn default() -> Self {
        Self::new(CollisionMethod::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_at(x: f32, z: f32) -> TargetProbe {
        TargetProbe {
            position: Vec3::new(x, 1.0, z),
            half_extents: Vec3::new(1.0, 1.0, 2.0),
        }
    }

    fn missile(from: Vec3, to: Vec3) -> MissileProbe {
        MissileProbe {
            position: to,
            previous_position: from,
            radius: 0.25,
        }
    }

    #[test]
    fn bounding_box_hits_within_padding() {
        let strategy = BoundingBoxStrategy::default();
        let near = missile(Vec3::ZERO, Vec3::new(1.6, 1.0, 0.0));
        let far = missile(Vec3::ZERO, Vec3::new(3.0, 1.0, 0.0));
        assert!(strategy.test(&near, &target_at(0.0, 0.0)).unwrap().hit);
        assert!(!strategy.test(&far, &target_at(0.0, 0.0)).unwrap().hit);
    }

    #[test]
    fn sphere_box_reports_closest_point() {
        let result = SphereBoxStrategy
            .test(
                &missile(Vec3::ZERO, Vec3::new(1.2, 1.0, 0.0)),
                &target_at(0.0, 0.0),
            )
            .unwrap();
        assert!(result.hit);
        assert_eq!(result.point, Some(Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn ray_segment_catches_tunnelling() {
        // Passes straight through the target within one frame
        let fast = missile(Vec3::new(-10.0, 1.0, 0.0), Vec3::new(10.0, 1.0, 0.0));
        let result = RaySegmentStrategy.test(&fast, &target_at(0.0, 0.0)).unwrap();
        assert!(result.hit);
        let point = result.point.unwrap();
        assert!((point.x - -1.25).abs() < 1e-4);

        assert!(!BoundingBoxStrategy::default()
            .test(&fast, &target_at(0.0, 0.0))
            .unwrap()
            .hit);
    }

    #[test]
    fn ray_segment_misses_parallel_offset() {
        let passing = missile(Vec3::new(-10.0, 1.0, 5.0), Vec3::new(10.0, 1.0, 5.0));
        assert!(!RaySegmentStrategy
            .test(&passing, &target_at(0.0, 0.0))
            .unwrap()
            .hit);
    }

    #[test]
    fn detector_falls_back_to_distance_on_error() {
        let detector = CollisionDetector::new(CollisionMethod::RaySegment);
        // Zero-length segment is an error for the ray test
        let resting = missile(Vec3::new(0.5, 1.0, 0.0), Vec3::new(0.5, 1.0, 0.0));
        assert_eq!(
            RaySegmentStrategy.test(&resting, &target_at(0.0, 0.0)),
            Err(CollisionError::DegenerateSegment)
        );
        assert!(detector.test(&resting, &target_at(0.0, 0.0)).hit);
    }

    #[test]
    fn empty_proxy_falls_back() {
        let detector = CollisionDetector::default();
        let flat = TargetProbe {
            position: Vec3::ZERO,
            half_extents: Vec3::ZERO,
        };
        let probe = missile(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0));
        assert!(detector.test(&probe, &flat).hit);
        assert!(!detector
            .test(&missile(Vec3::ZERO, Vec3::new(9.0, 0.0, 0.0)), &flat)
            .hit);
    }
}
