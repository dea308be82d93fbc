//! Headless autopilot: pure-pursuit steering plus a cruise-speed rule.

use super::{ground, Controls, RigidBody, MPS_TO_KMH};
use crate::road::Route;

const AHEAD_TIME: f32 = 0.6;
const AHEAD_DIST_MIN: f32 = 6.0;
const AHEAD_DIST_MAX: f32 = 40.0;

/// Throttle per km/h below cruise speed.
const THROTTLE_GAIN: f32 = 0.08;
/// Brake per km/h above cruise speed, once past the tolerance.
const BRAKE_GAIN: f32 = 0.05;
const OVERSPEED_TOLERANCE_KMH: f32 = 3.0;

#[derive(Debug, Clone)]
pub struct RouteFollowingDriver {
    cruise_speed_kmh: f32,
    wheelbase: f32,
    max_steering_deg: f32,
    last_index: Option<usize>,
    route_revision: Option<u64>,
}

impl RouteFollowingDriver {
    pub fn new(cruise_speed_kmh: f32, wheelbase: f32, max_steering_deg: f32) -> Self {
        Self {
            cruise_speed_kmh: cruise_speed_kmh.max(0.0),
            wheelbase,
            max_steering_deg: max_steering_deg.max(1e-3),
            last_index: None,
            route_revision: None,
        }
    }

    pub fn cruise_speed_kmh(&self) -> f32 {
        self.cruise_speed_kmh
    }

    pub fn set_cruise_speed_kmh(&mut self, kmh: f32) {
        self.cruise_speed_kmh = kmh.max(0.0);
    }

    pub fn controls<B: RigidBody>(&mut self, route: &Route, body: &B) -> Controls {
        let speed = body.speed();
        let (throttle, brake) = self.cruise(speed * MPS_TO_KMH);
        let steering = self.pursue(route, body, speed);

        Controls::new(throttle, brake, steering)
    }

    fn cruise(&self, speed_kmh: f32) -> (f32, f32) {
        let error = self.cruise_speed_kmh - speed_kmh;
        if error >= 0.0 {
            ((error * THROTTLE_GAIN).min(1.0), 0.0)
        } else if -error > OVERSPEED_TOLERANCE_KMH {
            (0.0, ((-error - OVERSPEED_TOLERANCE_KMH) * BRAKE_GAIN).min(1.0))
        } else {
            (0.0, 0.0)
        }
    }

    fn pursue<B: RigidBody>(&mut self, route: &Route, body: &B, speed: f32) -> f32 {
        if self.route_revision != Some(route.revision()) {
            self.last_index = None;
            self.route_revision = Some(route.revision());
        }

        let position = ground(&body.position());
        let Some((index, projection)) = route.closest_segment(&position, self.last_index, 0.05) else {
            return 0.0;
        };
        self.last_index = Some(index);

        let ahead = (AHEAD_TIME * speed).clamp(AHEAD_DIST_MIN, AHEAD_DIST_MAX);
        let Some((target, _)) = route.point_ahead(index, projection.t, ahead) else {
            return 0.0;
        };

        let to_target = target - position;
        let distance = to_target.norm();
        if distance < 1e-3 {
            return 0.0;
        }

        let forward = body.forward_ground();
        let cross_z = forward.x * to_target.y - forward.y * to_target.x;
        // Positive is to the left
        let alpha = cross_z.atan2(forward.dot(&to_target));

        let wheel_angle = (2.0 * self.wheelbase * alpha.sin() / distance).atan().to_degrees();
        (-wheel_angle / self.max_steering_deg).clamp(-1.0, 1.0)
    }
}
