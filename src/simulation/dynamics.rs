//! Longitudinal forces, actuator ramping and bicycle-model steering.

use nalgebra::{UnitQuaternion, Vector3};

use super::{ground, Controls, RigidBody, Vec2, Vec3, MPS_TO_KMH};
use crate::config::VehicleConfig;

/// Below this speed (m/s) the vehicle counts as stopped for braking and drag.
const STOPPED_SPEED: f32 = 0.05;
/// Steering angles smaller than this (degrees) do not turn the vehicle.
const STRAIGHT_ANGLE_DEG: f32 = 0.01;
const MIN_TAN: f32 = 1e-4;

/// Snapshot of the vehicle's kinematic and actuator state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub position: Vec3,
    pub forward: Vec2,
    pub linear_velocity: Vec3,
    pub engine_force: f32,
    pub brake_force: f32,
    pub steering_angle_deg: f32,
}

#[derive(Debug, Clone)]
pub struct VehicleDynamicsModel {
    config: VehicleConfig,
    engine_force: f32,
    brake_force: f32,
    steering_angle_deg: f32,
    target_steering_deg: f32,
}

/// Moves `current` toward `target` by at most `max_step`, never overshooting.
fn move_towards(current: f32, target: f32, max_step: f32) -> f32 {
    if current < target {
        (current + max_step).min(target)
    } else {
        (current - max_step).max(target)
    }
}

impl VehicleDynamicsModel {
    pub fn new(config: VehicleConfig) -> Self {
        Self {
            config,
            engine_force: 0.0,
            brake_force: 0.0,
            steering_angle_deg: 0.0,
            target_steering_deg: 0.0,
        }
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn engine_force(&self) -> f32 {
        self.engine_force
    }

    pub fn brake_force(&self) -> f32 {
        self.brake_force
    }

    /// Applied (rate-limited) steering angle, positive to the right.
    pub fn steering_angle_deg(&self) -> f32 {
        self.steering_angle_deg
    }

    pub fn target_steering_deg(&self) -> f32 {
        self.target_steering_deg
    }

    /// Largest steering angle available at `speed_kmh`.
    ///
    /// Full lock below the fade start, the minimum angle above the fade end,
    /// and an ease-out blend in between.
    pub fn max_steering_angle_at(&self, speed_kmh: f32) -> f32 {
        let full = self.config.max_steering_angle_deg;
        let min = self.config.min_steering_angle_deg.min(full);
        let start = self.config.steering_fade_start_kmh;
        let end = self.config.steering_fade_end_kmh;

        if speed_kmh <= start {
            return full;
        }
        if speed_kmh >= end || end <= start {
            return min;
        }

        let t = (speed_kmh - start) / (end - start);
        let eased = 1.0 - (1.0 - t) * (1.0 - t);
        full + (min - full) * eased
    }

    /// Sets the steering target from an input in `[-1, 1]`.
    pub fn steer(&mut self, input: f32, speed_kmh: f32) {
        let input = if input.is_nan() { 0.0 } else { input.clamp(-1.0, 1.0) };
        self.target_steering_deg = input * self.max_steering_angle_at(speed_kmh);
    }

    /// Distance needed to stop from `speed` (m/s) at full brake.
    pub fn stopping_distance(&self, speed: f32) -> f32 {
        let decel = self.config.max_brake_force / self.config.mass;
        if decel <= 0.0 {
            return f32::INFINITY;
        }
        speed * speed / (2.0 * decel)
    }

    /// Drops ramped forces and steering, e.g. after a teleport.
    pub fn reset_actuators(&mut self) {
        self.engine_force = 0.0;
        self.brake_force = 0.0;
        self.steering_angle_deg = 0.0;
        self.target_steering_deg = 0.0;
    }

    pub fn state<B: RigidBody>(&self, body: &B) -> VehicleState {
        VehicleState {
            position: body.position(),
            forward: body.forward_ground(),
            linear_velocity: body.linear_velocity(),
            engine_force: self.engine_force,
            brake_force: self.brake_force,
            steering_angle_deg: self.steering_angle_deg,
        }
    }

    /// One tick of actuator ramping, force application and steering.
    ///
    /// Forces go to the body and take effect on its next integration step.
    pub fn update<B: RigidBody>(&mut self, body: &mut B, controls: Controls, dt: f32) {
        let controls = controls.clamped();
        if dt <= 0.0 {
            return;
        }

        self.ramp_actuators(&controls, dt);
        self.apply_longitudinal_forces(body, dt);

        let speed_kmh = body.speed() * MPS_TO_KMH;
        self.steer(controls.steering, speed_kmh);
        self.update_steering(dt);
        self.apply_turn(body, dt);
    }

    /// Hard speed governor: rescales velocity to the limit, keeping direction.
    pub fn enforce_speed_limit<B: RigidBody>(&self, body: &mut B) {
        let velocity = body.linear_velocity();
        let speed = velocity.norm();
        let max_speed = self.config.max_speed_kmh / MPS_TO_KMH;

        if speed > max_speed && speed > 0.0 {
            body.set_linear_velocity(velocity * (max_speed / speed));
        }
    }

    fn ramp_actuators(&mut self, controls: &Controls, dt: f32) {
        let target_engine = controls.throttle * self.config.max_throttle_force;
        let target_brake = controls.brake * self.config.max_brake_force;

        self.engine_force = move_towards(self.engine_force, target_engine, self.config.max_accel_rate * dt);
        self.brake_force = move_towards(self.brake_force, target_brake, self.config.max_brake_rate * dt);
    }

    fn apply_longitudinal_forces<B: RigidBody>(&self, body: &mut B, dt: f32) {
        let forward = body.forward_ground();
        let velocity = body.linear_velocity();
        let flat_velocity = ground(&velocity);
        let speed = flat_velocity.norm();

        let mut force = Vec3::new(forward.x, forward.y, 0.0) * self.engine_force;

        if speed > STOPPED_SPEED {
            let drag = self.config.drag_coefficient * speed * speed;
            let rolling = self.config.rolling_resistance * speed;
            let brake = if self.brake_force > 0.0 { self.brake_force } else { 0.0 };

            // Resistance can stop the vehicle within a tick but never reverse it
            let stopping_limit = body.mass() * speed / dt;
            let resist = (drag + rolling + brake).min(stopping_limit);

            let against = -flat_velocity / speed;
            force += Vec3::new(against.x, against.y, 0.0) * resist;
        }

        body.apply_central_force(force);
    }

    fn update_steering(&mut self, dt: f32) {
        let max_step = self.config.steering_rate_deg_per_sec * dt;
        self.steering_angle_deg = move_towards(self.steering_angle_deg, self.target_steering_deg, max_step);
    }

    /// Bicycle model: yaw the body and its velocity by `speed / turn radius`.
    fn apply_turn<B: RigidBody>(&self, body: &mut B, dt: f32) {
        if self.steering_angle_deg.abs() < STRAIGHT_ANGLE_DEG {
            return;
        }

        let velocity = body.linear_velocity();
        let forward = body.forward_ground();
        // Signed so that reversing turns the other way
        let forward_speed = ground(&velocity).dot(&forward);
        if forward_speed.abs() < self.config.min_turning_speed {
            return;
        }

        let tan = self.steering_angle_deg.to_radians().tan();
        if tan.abs() < MIN_TAN {
            return;
        }

        let turn_radius = self.config.wheelbase / tan;
        let yaw_rate = forward_speed / turn_radius;

        // Right turns are clockwise seen from above, i.e. negative about +z
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -yaw_rate * dt);
        body.set_rotation(rotation * body.rotation());
        body.set_linear_velocity(rotation * velocity);
    }
}
