//! Continuous rail assist: a distance-ramped spring-damper that pulls the
//! vehicle back onto the centreline instead of teleporting it.

use log::trace;

use super::{ground, RigidBody, Vec2, Vec3};
use crate::config::RailConfig;
use crate::road::Route;

const MIN_SEGMENT_LENGTH: f32 = 1e-4;
const MIN_BRAKE_SPEED: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisengageReason {
    NoRoute,
    DegenerateSegment,
}

/// Everything one rail evaluation computed, plus the forces to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RailCorrection {
    pub segment_index: usize,
    pub segment_t: f32,
    pub closest_point: Vec2,
    pub distance_m: f32,
    pub desired_forward: Vec2,

    /// Signed, positive when the centreline is to the right of the vehicle.
    pub lateral_error: f32,
    pub lateral_velocity: f32,
    pub lateral_force: Vec2,

    pub longitudinal_error: f32,
    pub longitudinal_velocity: f32,
    pub longitudinal_force: Vec2,

    /// Far-brake blend in `[0, 1]`, zero when the far brake is idle.
    pub brake_t: f32,
    pub brake_force: Vec2,

    /// `None` when the vehicle was too slow for yaw alignment.
    pub yaw_error: Option<f32>,
    /// About +z; positive turns left.
    pub yaw_torque: f32,
}

impl RailCorrection {
    pub fn total_force(&self) -> Vec3 {
        let f = self.lateral_force + self.longitudinal_force + self.brake_force;
        Vec3::new(f.x, f.y, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RailOutcome {
    Disengaged(DisengageReason),
    Engaged(RailCorrection),
}

impl RailOutcome {
    pub fn correction(&self) -> Option<&RailCorrection> {
        match self {
            RailOutcome::Engaged(correction) => Some(correction),
            RailOutcome::Disengaged(_) => None,
        }
    }

    pub fn is_engaged(&self) -> bool {
        matches!(self, RailOutcome::Engaged(_))
    }
}

#[derive(Debug, Clone)]
pub struct RailForceController {
    config: RailConfig,
    index_penalty: f32,
    last_index: Option<usize>,
    route_revision: Option<u64>,
}

impl RailForceController {
    pub fn new(config: RailConfig, index_penalty: f32) -> Self {
        Self {
            config,
            index_penalty,
            last_index: None,
            route_revision: None,
        }
    }

    pub fn config(&self) -> &RailConfig {
        &self.config
    }

    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    /// Forget the hysteresis anchor.
    pub fn reset(&mut self) {
        self.last_index = None;
        self.route_revision = None;
    }

    /// Evaluates the correction for the body's current state without touching it.
    pub fn compute<B: RigidBody>(&mut self, route: &Route, body: &B) -> RailOutcome {
        if route.is_empty() {
            trace!("Rail assist disengaged: no route");
            return RailOutcome::Disengaged(DisengageReason::NoRoute);
        }

        if self.route_revision != Some(route.revision()) {
            self.last_index = None;
            self.route_revision = Some(route.revision());
        }

        let position = ground(&body.position());
        let Some((index, projection)) = route.closest_segment(&position, self.last_index, self.index_penalty) else {
            return RailOutcome::Disengaged(DisengageReason::NoRoute);
        };
        self.last_index = Some(index);

        let segment = &route.segments()[index];
        if segment.length() < MIN_SEGMENT_LENGTH {
            trace!("Rail assist disengaged: segment {} is degenerate", index);
            return RailOutcome::Disengaged(DisengageReason::DegenerateSegment);
        }

        let tangent = segment.direction();
        let lateral_dir = segment.right();
        let desired_forward = route
            .point_ahead(index, projection.t, self.config.look_ahead_m)
            .map(|(_, direction)| direction)
            .unwrap_or(tangent);

        let velocity = ground(&body.linear_velocity());
        let to_center = projection.point - position;
        let c = &self.config;

        // Lateral spring-damper, gains ramp up outside the soft band
        let lateral_error = to_center.dot(&lateral_dir);
        let excess = (lateral_error.abs() - c.soft_band_m).max(0.0);
        let k_mult = 1.0 + c.k_gain_per_m * excess + c.k_gain_per_m2 * excess * excess;
        let d_mult = 1.0 + c.d_gain_per_m * excess + c.d_gain_per_m2 * excess * excess;

        let lateral_velocity = velocity.dot(&lateral_dir);
        let lateral_mag = (lateral_error * c.lateral_k * k_mult - lateral_velocity * c.lateral_damping * d_mult)
            .clamp(-c.max_lateral_force, c.max_lateral_force);

        // Pull along the tangent toward the projected point
        let longitudinal_error = to_center.dot(&tangent);
        let longitudinal_velocity = velocity.dot(&tangent);
        let longitudinal_mag = (longitudinal_error * c.longitudinal_k - longitudinal_velocity * c.longitudinal_damping)
            .clamp(-c.max_longitudinal_force, c.max_longitudinal_force);

        let (brake_t, brake_force) = self.far_brake(lateral_error.abs(), &velocity);

        let speed = body.speed();
        let (yaw_error, yaw_torque) = if speed < c.min_yaw_speed {
            (None, 0.0)
        } else {
            let current = body.forward_ground();
            let cross_z = current.x * desired_forward.y - current.y * desired_forward.x;
            let dot = current.dot(&desired_forward).clamp(-1.0, 1.0);
            let error = cross_z.atan2(dot);

            let yaw_mult = 1.0 + c.yaw_gain_per_m * excess;
            let torque = (error * c.yaw_k * yaw_mult - body.angular_velocity().z * c.yaw_damping)
                .clamp(-c.max_yaw_torque, c.max_yaw_torque);
            (Some(error), torque)
        };

        RailOutcome::Engaged(RailCorrection {
            segment_index: index,
            segment_t: projection.t,
            closest_point: projection.point,
            distance_m: projection.distance(),
            desired_forward,
            lateral_error,
            lateral_velocity,
            lateral_force: lateral_dir * lateral_mag,
            longitudinal_error,
            longitudinal_velocity,
            longitudinal_force: tangent * longitudinal_mag,
            brake_t,
            brake_force,
            yaw_error,
            yaw_torque,
        })
    }

    fn far_brake(&self, abs_error: f32, velocity: &Vec2) -> (f32, Vec2) {
        let c = &self.config;
        if !c.far_brake_enabled {
            return (0.0, Vec2::zeros());
        }

        let far_t = inverse_lerp(c.far_brake_start_m, c.far_brake_full_m, abs_error);
        let speed = velocity.norm();
        if far_t <= 0.0 || speed <= MIN_BRAKE_SPEED {
            return (0.0, Vec2::zeros());
        }

        let over_speed = (speed - c.far_target_speed).max(0.0);
        let magnitude = (over_speed * c.far_brake_gain * far_t).clamp(0.0, c.far_brake_max_force);
        (far_t, -velocity / speed * magnitude)
    }

    pub fn apply<B: RigidBody>(body: &mut B, correction: &RailCorrection) {
        body.apply_central_force(correction.total_force());
        if correction.yaw_torque != 0.0 {
            body.apply_torque(Vec3::new(0.0, 0.0, correction.yaw_torque));
        }
    }

    /// Computes and applies in one go.
    pub fn update<B: RigidBody>(&mut self, route: &Route, body: &mut B) -> RailOutcome {
        let outcome = self.compute(route, body);
        if let RailOutcome::Engaged(correction) = &outcome {
            Self::apply(body, correction);
        }
        outcome
    }
}

fn inverse_lerp(a: f32, b: f32, v: f32) -> f32 {
    if b <= a {
        return 0.0;
    }
    ((v - a) / (b - a)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::RoadSegment;
    use crate::simulation::KinematicBody;

    const DT: f32 = 1.0 / 60.0;

    fn north_route() -> Route {
        Route::new(vec![RoadSegment::new(Vec2::zeros(), Vec2::new(0.0, 200.0), 2, 3.0).unwrap()])
    }

    fn rail() -> RailForceController {
        RailForceController::new(RailConfig::default(), 0.05)
    }

    fn engaged(outcome: RailOutcome) -> RailCorrection {
        match outcome {
            RailOutcome::Engaged(correction) => correction,
            other => panic!("expected engaged rail, got {:?}", other),
        }
    }

    #[test]
    fn disengaged_without_route() {
        let body = KinematicBody::new(1500.0);
        let outcome = rail().compute(&Route::empty(), &body);
        assert_eq!(outcome, RailOutcome::Disengaged(DisengageReason::NoRoute));
        assert!(outcome.correction().is_none());
    }

    #[test]
    fn lateral_force_points_back_to_centreline() {
        let mut rail = rail();
        let right_of_road = KinematicBody::new(1500.0).at(Vec3::new(1.0, 50.0, 0.0), Vec2::new(0.0, 1.0));
        let correction = engaged(rail.compute(&north_route(), &right_of_road));

        assert!((correction.lateral_error + 1.0).abs() < 1e-5);
        // Inside the soft band there is no gain ramp
        assert!((correction.lateral_force.x + 40.0).abs() < 1e-3);
        assert!(correction.lateral_force.y.abs() < 1e-5);

        let left_of_road = KinematicBody::new(1500.0).at(Vec3::new(-1.0, 50.0, 0.0), Vec2::new(0.0, 1.0));
        let correction = engaged(rail.compute(&north_route(), &left_of_road));
        assert!(correction.lateral_force.x > 0.0);
    }

    #[test]
    fn gains_ramp_beyond_soft_band_and_forces_are_capped() {
        let mut rail = rail();
        let near = KinematicBody::new(1500.0).at(Vec3::new(1.0, 50.0, 0.0), Vec2::new(0.0, 1.0));
        let mid = KinematicBody::new(1500.0).at(Vec3::new(10.0, 50.0, 0.0), Vec2::new(0.0, 1.0));
        let far = KinematicBody::new(1500.0).at(Vec3::new(5000.0, 50.0, 0.0), Vec2::new(0.0, 1.0));

        let near = engaged(rail.compute(&north_route(), &near)).lateral_force.x.abs();
        let mid = engaged(rail.compute(&north_route(), &mid)).lateral_force.x.abs();
        let far = engaged(rail.compute(&north_route(), &far));

        assert!(mid / near > 10.0 * 1.5);
        assert!((far.lateral_force.x + 8000.0).abs() < 1e-2);
        assert!(far.longitudinal_force.norm() <= 6000.0 + 1e-2);
    }

    #[test]
    fn lateral_motion_is_damped() {
        let mut rail = rail();
        let body = KinematicBody::new(1500.0)
            .at(Vec3::new(0.0, 50.0, 0.0), Vec2::new(0.0, 1.0))
            .with_velocity(Vec3::new(2.0, 0.0, 0.0));
        let correction = engaged(rail.compute(&north_route(), &body));

        assert_eq!(correction.lateral_error, 0.0);
        assert!((correction.lateral_force.x + 24.0).abs() < 1e-3);
    }

    #[test]
    fn yaw_torque_turns_toward_road_direction() {
        let mut rail = rail();
        // Heading east at speed on a north-bound road: needs a left (positive) turn
        let body = KinematicBody::new(1500.0)
            .at(Vec3::new(0.0, 50.0, 0.0), Vec2::new(1.0, 0.0))
            .with_velocity(Vec3::new(5.0, 0.0, 0.0));
        let correction = engaged(rail.compute(&north_route(), &body));

        let error = correction.yaw_error.unwrap();
        assert!((error - std::f32::consts::FRAC_PI_2).abs() < 1e-4);
        assert!(correction.yaw_torque > 0.0);
    }

    #[test]
    fn yaw_suppressed_when_slow() {
        let mut rail = rail();
        let body = KinematicBody::new(1500.0).at(Vec3::new(0.0, 50.0, 0.0), Vec2::new(1.0, 0.0));
        let correction = engaged(rail.compute(&north_route(), &body));

        assert_eq!(correction.yaw_error, None);
        assert_eq!(correction.yaw_torque, 0.0);
    }

    #[test]
    fn far_brake_only_far_away_and_above_target_speed() {
        let mut rail = rail();
        let fast_far = KinematicBody::new(1500.0)
            .at(Vec3::new(30.0, 50.0, 0.0), Vec2::new(0.0, 1.0))
            .with_velocity(Vec3::new(0.0, 30.0, 0.0));
        let correction = engaged(rail.compute(&north_route(), &fast_far));
        assert_eq!(correction.brake_t, 1.0);
        // 10 m/s over target at 300 N per m/s
        assert!((correction.brake_force.y + 3000.0).abs() < 1e-2);

        let slow_far = KinematicBody::new(1500.0)
            .at(Vec3::new(30.0, 50.0, 0.0), Vec2::new(0.0, 1.0))
            .with_velocity(Vec3::new(0.0, 15.0, 0.0));
        assert_eq!(engaged(rail.compute(&north_route(), &slow_far)).brake_force, Vec2::zeros());

        let fast_near = KinematicBody::new(1500.0)
            .at(Vec3::new(2.0, 50.0, 0.0), Vec2::new(0.0, 1.0))
            .with_velocity(Vec3::new(0.0, 30.0, 0.0));
        let correction = engaged(rail.compute(&north_route(), &fast_near));
        assert_eq!(correction.brake_t, 0.0);
        assert_eq!(correction.brake_force, Vec2::zeros());
    }

    #[test]
    fn anchor_resets_on_new_route() {
        let mut rail = rail();
        let route = Route::new(vec![
            RoadSegment::new(Vec2::zeros(), Vec2::new(0.0, 100.0), 2, 3.0).unwrap(),
            RoadSegment::new(Vec2::new(0.0, 100.0), Vec2::new(0.0, 200.0), 2, 3.0).unwrap(),
        ]);
        let body = KinematicBody::new(1500.0).at(Vec3::new(0.0, 150.0, 0.0), Vec2::new(0.0, 1.0));
        rail.compute(&route, &body);
        assert_eq!(rail.last_index(), Some(1));

        rail.compute(&north_route(), &body);
        assert_eq!(rail.last_index(), Some(0));
    }

    #[test]
    fn pulls_vehicle_onto_road() {
        let mut rail = rail();
        let route = north_route();
        let mut body = KinematicBody::new(100.0).at(Vec3::new(3.0, 0.0, 0.0), Vec2::new(0.0, 1.0));

        for _ in 0..120 {
            rail.update(&route, &mut body);
            body.step(DT);
        }

        assert!(body.position().x.abs() < 2.0, "x = {}", body.position().x);
    }
}
