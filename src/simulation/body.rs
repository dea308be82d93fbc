//! The rigid body the vehicle model drives.
//!
//! Collision and integration belong to the physics engine. The simulation
//! only reads kinematic state and writes forces, torques, velocities and
//! rotation through [`RigidBody`]. [`KinematicBody`] is a flat-ground stand-in
//! used by the console runner, tests and benches.

use nalgebra::{UnitQuaternion, Vector3};

use super::{Vec2, Vec3};

/// Rotation that makes the body's forward axis (+y) point along `forward`.
pub fn yaw_rotation(forward: &Vec2) -> UnitQuaternion<f32> {
    let yaw = if forward.norm_squared() < 1e-12 {
        0.0
    } else {
        (-forward.x).atan2(forward.y)
    };
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw)
}

pub trait RigidBody {
    fn position(&self) -> Vec3;
    fn set_position(&mut self, position: Vec3);
    fn rotation(&self) -> UnitQuaternion<f32>;
    fn set_rotation(&mut self, rotation: UnitQuaternion<f32>);
    fn linear_velocity(&self) -> Vec3;
    fn set_linear_velocity(&mut self, velocity: Vec3);
    fn angular_velocity(&self) -> Vec3;
    fn set_angular_velocity(&mut self, velocity: Vec3);
    fn mass(&self) -> f32;

    /// Force through the centre of mass, consumed by the next `step`.
    fn apply_central_force(&mut self, force: Vec3);
    fn apply_torque(&mut self, torque: Vec3);
    fn clear_forces(&mut self);

    /// Advance the physics engine by `dt` seconds.
    fn step(&mut self, dt: f32);

    fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::y()
    }

    /// Unit forward direction in the ground plane; north if the body points straight up.
    fn forward_ground(&self) -> Vec2 {
        let f = self.forward();
        let flat = Vec2::new(f.x, f.y);
        if flat.norm_squared() < 1e-12 {
            Vec2::new(0.0, 1.0)
        } else {
            flat.normalize()
        }
    }

    fn speed(&self) -> f32 {
        self.linear_velocity().norm()
    }
}

/// Semi-implicit Euler body on a flat, frictionless ground plane.
#[derive(Debug, Clone)]
pub struct KinematicBody {
    position: Vec3,
    rotation: UnitQuaternion<f32>,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    mass: f32,
    yaw_inertia: f32,
    force: Vec3,
    torque: Vec3,
}

impl KinematicBody {
    pub fn new(mass: f32) -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: UnitQuaternion::identity(),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            mass: mass.max(1e-3),
            // Box of 2 m x 4 m
            yaw_inertia: (mass * (2.0f32.powi(2) + 4.0f32.powi(2)) / 12.0).max(1e-3),
            force: Vec3::zeros(),
            torque: Vec3::zeros(),
        }
    }

    pub fn at(mut self, position: Vec3, forward: Vec2) -> Self {
        self.position = position;
        self.rotation = yaw_rotation(&forward);
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn pending_force(&self) -> Vec3 {
        self.force
    }

    pub fn pending_torque(&self) -> Vec3 {
        self.torque
    }
}

impl RigidBody for KinematicBody {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn rotation(&self) -> UnitQuaternion<f32> {
        self.rotation
    }

    fn set_rotation(&mut self, rotation: UnitQuaternion<f32>) {
        self.rotation = rotation;
    }

    fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.linear_velocity = velocity;
    }

    fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.angular_velocity = velocity;
    }

    fn mass(&self) -> f32 {
        self.mass
    }

    fn apply_central_force(&mut self, force: Vec3) {
        self.force += force;
    }

    fn apply_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    fn clear_forces(&mut self) {
        self.force = Vec3::zeros();
        self.torque = Vec3::zeros();
    }

    fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        self.linear_velocity += self.force / self.mass * dt;
        self.angular_velocity += self.torque / self.yaw_inertia * dt;

        self.position += self.linear_velocity * dt;

        let spin = self.angular_velocity * dt;
        if spin.norm_squared() > 0.0 {
            self.rotation = UnitQuaternion::from_scaled_axis(spin) * self.rotation;
            self.rotation.renormalize();
        }

        self.clear_forces();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaw_rotation_points_forward_axis() {
        for dir in [Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0), Vec2::new(-1.0, -1.0).normalize()] {
            let body = KinematicBody::new(1000.0).at(Vec3::zeros(), dir);
            assert!((body.forward_ground() - dir).norm() < 1e-5, "{:?}", dir);
        }
    }

    #[test]
    fn force_integrates_into_motion() {
        let mut body = KinematicBody::new(100.0);
        body.apply_central_force(Vec3::new(0.0, 200.0, 0.0));
        body.step(0.5);

        assert!((body.linear_velocity().y - 1.0).abs() < 1e-6);
        assert!((body.position().y - 0.5).abs() < 1e-6);
        assert_eq!(body.pending_force(), Vec3::zeros());
    }

    #[test]
    fn yaw_torque_turns_left() {
        let mut body = KinematicBody::new(100.0);
        body.apply_torque(Vec3::new(0.0, 0.0, 50.0));
        for _ in 0..10 {
            body.step(0.1);
        }
        // Positive z rotation swings the nose from north towards west
        assert!(body.forward_ground().x < 0.0);
    }
}
