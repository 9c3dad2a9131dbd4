//! Local vehicle prediction
//!
//! The local player never waits for the server to move: each frame the
//! vehicle is integrated from the current intents. The server only overrides
//! it on respawn.

use serde::{Deserialize, Serialize};

use crate::game::math::Vec3;

/// Boolean intents sampled from the input source each frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub shoot: bool,
}

impl InputState {
    /// -1 (reverse) .. 1 (forward)
    pub fn throttle(&self) -> f32 {
        (self.forward as i8 - self.backward as i8) as f32
    }

    /// -1 (right) .. 1 (left)
    pub fn steer(&self) -> f32 {
        (self.left as i8 - self.right as i8) as f32
    }
}

/// Vehicle handling constants
#[derive(Debug, Clone, Copy)]
pub struct VehicleParams {
    /// Maximum forward speed (units/s)
    pub max_speed: f32,
    /// Acceleration rate (units/s²)
    pub acceleration: f32,
    /// Deceleration when braking against the direction of travel
    pub braking: f32,
    /// Reverse thrust relative to forward
    pub reverse_factor: f32,
    /// Per-frame velocity retention at the reference frame rate
    pub drag: f32,
    /// Turn rate in radians per second
    pub turn_rate: f32,
    /// Arena is the square [-half_extent, half_extent] on X and Z
    pub arena_half_extent: f32,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            max_speed: 30.0,
            acceleration: 25.0,
            braking: 40.0,
            reverse_factor: 0.5,
            drag: 0.98,
            turn_rate: 2.5,
            arena_half_extent: 60.0,
        }
    }
}

/// Frame rate the drag constant is tuned for
const REFERENCE_FPS: f32 = 60.0;

/// Predicted transform of the local vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedVehicle {
    pub position: Vec3,
    /// Yaw around Y; 0 faces +Z
    pub yaw: f32,
    /// Signed speed along the heading
    pub speed: f32,
}

impl PredictedVehicle {
    pub fn new(position: Vec3, rotation: Vec3) -> Self {
        Self {
            position,
            yaw: rotation.y,
            speed: 0.0,
        }
    }

    /// Euler rotation for the wire and the render sink
    pub fn rotation(&self) -> Vec3 {
        Vec3::new(0.0, self.yaw, 0.0)
    }

    /// Unit heading on the ground plane
    pub fn forward(&self) -> Vec3 {
        Vec3::new(self.yaw.sin(), 0.0, self.yaw.cos())
    }

    /// Integrate one frame of input
    pub fn update(&mut self, input: &InputState, dt: f32, params: &VehicleParams) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }

        let throttle = input.throttle();

        // Steering flips while reversing, like a car
        let direction = if self.speed < 0.0 { -1.0 } else { 1.0 };
        self.yaw = (self.yaw + input.steer() * direction * params.turn_rate * dt)
            .rem_euclid(std::f32::consts::TAU);

        let braking =
            throttle != 0.0 && self.speed != 0.0 && throttle.signum() != self.speed.signum();
        if braking {
            let delta = params.braking * dt;
            self.speed = if self.speed > 0.0 {
                (self.speed - delta).max(0.0)
            } else {
                (self.speed + delta).min(0.0)
            };
        } else if throttle > 0.0 {
            self.speed += params.acceleration * dt;
        } else if throttle < 0.0 {
            self.speed -= params.acceleration * params.reverse_factor * dt;
        }

        self.speed *= params.drag.powf(dt * REFERENCE_FPS);

        let reverse_max = params.max_speed * params.reverse_factor;
        self.speed = self.speed.clamp(-reverse_max, params.max_speed);

        let next = self.position + self.forward() * (self.speed * dt);
        let bound = params.arena_half_extent;
        let clamped = next.clamp(
            &Vec3::new(-bound, next.y, -bound),
            &Vec3::new(bound, next.y, bound),
        );
        if clamped != next {
            self.speed = 0.0;
        }
        self.position = clamped;
    }

    /// Server override (respawn): hard snap and stop
    pub fn snap_to(&mut self, position: Vec3, rotation: Vec3) {
        self.position = position;
        self.yaw = rotation.y;
        self.speed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn forward() -> InputState {
        InputState {
            forward: true,
            ..InputState::default()
        }
    }

    #[test]
    fn forward_input_moves_along_heading() {
        let params = VehicleParams::default();
        let mut vehicle = PredictedVehicle::new(Vec3::ZERO, Vec3::ZERO);
        for _ in 0..30 {
            vehicle.update(&forward(), DT, &params);
        }
        assert!(vehicle.position.z > 0.0);
        assert!(vehicle.position.x.abs() < 1e-4);
        assert!(vehicle.speed > 0.0);
    }

    #[test]
    fn speed_is_capped() {
        let params = VehicleParams::default();
        let mut vehicle = PredictedVehicle::new(Vec3::ZERO, Vec3::ZERO);
        for _ in 0..2_000 {
            vehicle.update(&forward(), DT, &params);
            vehicle.position = Vec3::ZERO;
        }
        assert!(vehicle.speed <= params.max_speed + 1e-3);
    }

    #[test]
    fn braking_stops_before_reversing() {
        let params = VehicleParams::default();
        let mut vehicle = PredictedVehicle::new(Vec3::ZERO, Vec3::ZERO);
        vehicle.speed = 1.0;
        let back = InputState {
            backward: true,
            ..InputState::default()
        };
        vehicle.update(&back, 0.1, &params);
        assert_eq!(vehicle.speed, 0.0);
    }

    #[test]
    fn arena_bounds_clamp_position() {
        let params = VehicleParams::default();
        let mut vehicle = PredictedVehicle::new(Vec3::new(0.0, 0.0, 59.9), Vec3::ZERO);
        vehicle.speed = params.max_speed;
        vehicle.update(&forward(), DT, &params);
        assert_eq!(vehicle.position.z, params.arena_half_extent);
        assert_eq!(vehicle.speed, 0.0);
    }

    #[test]
    fn snap_overrides_prediction() {
        let mut vehicle = PredictedVehicle::new(Vec3::ZERO, Vec3::ZERO);
        vehicle.speed = 10.0;
        vehicle.snap_to(Vec3::new(5.0, 0.0, 5.0), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(vehicle.position, Vec3::new(5.0, 0.0, 5.0));
        assert_eq!(vehicle.yaw, 1.0);
        assert_eq!(vehicle.speed, 0.0);
    }
}
