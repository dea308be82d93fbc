//! Composition root: owns the body, the dynamics model, the corridor tracker
//! and the recovery strategy, and runs them in a fixed order every tick.

use anyhow::Result;
use log::{debug, info};

use super::{
    ground, yaw_rotation, Controls, CorridorCheck, CorridorTracker, RailForceController, RailOutcome, RigidBody, RoadRefill,
    RoadRequest, TeleportCommand, Vec3, VehicleDynamicsModel, MPS_TO_KMH,
};
use crate::config::{SimulationConfig, Validate};
use crate::geo::{compass_label, heading_degrees, GeoPoint, GeoProjector};
use crate::road::pipeline::RoadPipeline;
use crate::road::Route;

/// How the vehicle is kept on the road once it strays.
#[derive(Debug, Clone)]
pub enum RecoveryStrategy {
    /// Snap back onto the nearest centreline point after a hold time.
    Teleport,
    /// Spring-damper forces every tick, never teleporting.
    ContinuousForce(RailForceController),
}

impl RecoveryStrategy {
    pub fn continuous(config: &SimulationConfig) -> Self {
        RecoveryStrategy::ContinuousForce(RailForceController::new(
            config.rail.clone(),
            config.corridor.segment_index_penalty,
        ))
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecoveryStrategy::Teleport => "teleport",
            RecoveryStrategy::ContinuousForce(_) => "rail assist",
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Simulation time at the end of the tick, seconds.
    pub time: f64,
    pub check: CorridorCheck,
    pub teleport: Option<TeleportCommand>,
    /// Only with the continuous strategy.
    pub rail: Option<RailOutcome>,
    pub road_request: Option<RoadRequest>,
}

/// Read-only snapshot for displays and logs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub time: f64,
    pub position: Vec3,
    pub geo_position: Option<GeoPoint>,
    pub heading_degrees: u32,
    pub compass: &'static str,
    pub speed_kmh: f32,
    pub on_road: bool,
    pub remaining_road_m: f32,
    pub segment_index: Option<usize>,
    pub segment_t: f32,
    pub segment_count: usize,
    pub steering_angle_deg: f32,
    pub stopping_distance_m: f32,
}

pub struct VehicleController<B: RigidBody> {
    body: B,
    dynamics: VehicleDynamicsModel,
    tracker: CorridorTracker,
    strategy: RecoveryStrategy,
    refill: RoadRefill,
    pipeline: RoadPipeline,
    projector: Option<GeoProjector>,
    route_initialized: bool,
    on_road: bool,
    teleport_lift_m: f32,
    time: f64,
}

impl<B: RigidBody> VehicleController<B> {
    pub fn new(body: B, config: &SimulationConfig, strategy: RecoveryStrategy) -> Result<Self> {
        config.validate()?;
        let pipeline = RoadPipeline::from_config(&config.road)?;

        info!("Vehicle controller ready ({} recovery)", strategy.name());

        Ok(Self {
            body,
            dynamics: VehicleDynamicsModel::new(config.vehicle.clone()),
            tracker: CorridorTracker::new(config.corridor.clone()),
            strategy,
            refill: RoadRefill::new(config.refill.clone()),
            pipeline,
            projector: None,
            route_initialized: false,
            on_road: true,
            teleport_lift_m: config.corridor.teleport_lift_m,
            time: 0.0,
        })
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    pub fn dynamics(&self) -> &VehicleDynamicsModel {
        &self.dynamics
    }

    pub fn tracker(&self) -> &CorridorTracker {
        &self.tracker
    }

    pub fn strategy(&self) -> &RecoveryStrategy {
        &self.strategy
    }

    pub fn refill(&self) -> &RoadRefill {
        &self.refill
    }

    pub fn route(&self) -> &Route {
        self.tracker.route()
    }

    pub fn projector(&self) -> Option<&GeoProjector> {
        self.projector.as_ref()
    }

    /// Sets the geographic frame of the local plane. Needed for road requests.
    pub fn set_projector(&mut self, projector: GeoProjector) {
        self.projector = Some(projector);
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Swaps in a fully built route.
    ///
    /// Tracking state resets together with the swap. The first non-empty
    /// route also places the vehicle at its start; later ones leave it alone.
    pub fn replace_route(&mut self, route: Route) {
        info!(
            "Installing route revision {}: {} segments, {:.1} m",
            route.revision(),
            route.len(),
            route.total_length()
        );

        self.tracker.set_route(route);
        if let RecoveryStrategy::ContinuousForce(rail) = &mut self.strategy {
            rail.reset();
        }
        if self.refill.in_flight() {
            self.refill.complete();
        }

        if !self.route_initialized {
            if let Some(first) = self.tracker.route().segments().first() {
                let command = TeleportCommand {
                    position: Vec3::new(first.start().x, first.start().y, self.teleport_lift_m),
                    forward: first.direction(),
                    segment_index: 0,
                };
                apply_teleport(&mut self.body, &mut self.dynamics, &command);
                self.route_initialized = true;
            }
        }
    }

    /// Builds a route from geographic points and installs it.
    ///
    /// The first route fixes the local frame; later routes are projected in
    /// that same frame so they line up with the road being driven. Returns the
    /// number of segments installed. A delivery with no usable segments never
    /// replaces a live route; it returns 0 and the caller reports the failure.
    pub fn accept_geo_route(&mut self, points: &[GeoPoint]) -> usize {
        let build = match self.projector {
            Some(projector) => self.pipeline.build_in_frame(points, projector),
            None => self.pipeline.build(points),
        };

        if build.route.is_empty() && !self.route().is_empty() {
            debug!("Keeping route revision {}: delivered {} points, no usable segments", self.route().revision(), points.len());
            return 0;
        }

        if self.projector.is_none() {
            self.projector = build.projector;
        }

        let count = build.route.len();
        self.replace_route(build.route);
        count
    }

    pub fn road_request_failed(&mut self, reason: &str) {
        self.refill.failed(reason);
    }

    /// Vehicle position in latitude/longitude, once a frame is known.
    pub fn geo_position(&self) -> Option<GeoPoint> {
        let projector = self.projector.as_ref()?;
        Some(projector.to_geo(&ground(&self.body.position())))
    }

    pub fn heading_degrees(&self) -> u32 {
        let forward = self.body.forward_ground();
        heading_degrees(forward.x, forward.y)
    }

    pub fn speed_kmh(&self) -> f32 {
        self.body.speed() * MPS_TO_KMH
    }

    /// One fixed step: dynamics, corridor check, recovery or rail correction,
    /// physics integration, speed governor, then road refill scheduling.
    pub fn tick(&mut self, controls: Controls, dt: f32) -> TickReport {
        if !(dt > 0.0) {
            let check = self.tracker.check(self.body.position(), self.speed_kmh());
            return TickReport {
                time: self.time,
                check,
                teleport: None,
                rail: None,
                road_request: None,
            };
        }

        self.dynamics.update(&mut self.body, controls, dt);

        let check = self.tracker.check(self.body.position(), self.speed_kmh());
        self.on_road = check.on_road;

        let mut teleport = None;
        let mut rail = None;
        match &mut self.strategy {
            RecoveryStrategy::Teleport => {
                if let Some(command) = self.tracker.update_recovery(&check, dt) {
                    apply_teleport(&mut self.body, &mut self.dynamics, &command);
                    teleport = Some(command);
                }
            }
            RecoveryStrategy::ContinuousForce(controller) => {
                self.tracker.track_off_road_time(&check, dt);
                rail = Some(controller.update(self.tracker.route(), &mut self.body));
            }
        }

        self.body.step(dt);
        self.dynamics.enforce_speed_limit(&mut self.body);
        self.time += dt as f64;

        let remaining = self.tracker.remaining_road_m();
        let road_request = match self.geo_position() {
            Some(position) if self.refill.update(remaining, dt) => Some(RoadRequest::new(position, self.heading_degrees())),
            _ => None,
        };

        TickReport {
            time: self.time,
            check,
            teleport,
            rail,
            road_request,
        }
    }

    pub fn telemetry(&self) -> Telemetry {
        let heading = self.heading_degrees();
        let state = self.tracker.state();

        Telemetry {
            time: self.time,
            position: self.body.position(),
            geo_position: self.geo_position(),
            heading_degrees: heading,
            compass: compass_label(heading),
            speed_kmh: self.speed_kmh(),
            on_road: self.on_road,
            remaining_road_m: self.tracker.remaining_road_m(),
            segment_index: state.current_segment,
            segment_t: state.current_t,
            segment_count: self.tracker.route().len(),
            steering_angle_deg: self.dynamics.steering_angle_deg(),
            stopping_distance_m: self.dynamics.stopping_distance(self.body.speed()),
        }
    }
}

/// Stops the vehicle dead and places it on the road facing along it.
fn apply_teleport<B: RigidBody>(body: &mut B, dynamics: &mut VehicleDynamicsModel, command: &TeleportCommand) {
    body.set_linear_velocity(Vec3::zeros());
    body.set_angular_velocity(Vec3::zeros());
    body.set_position(command.position);
    body.set_rotation(yaw_rotation(&command.forward));
    body.clear_forces();
    dynamics.reset_actuators();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::RoadSegment;
    use crate::simulation::{KinematicBody, Vec2};

    const DT: f32 = 1.0 / 60.0;

    fn l_route() -> Route {
        Route::new(vec![
            RoadSegment::new(Vec2::new(10.0, 10.0), Vec2::new(10.0, 110.0), 2, 3.0).unwrap(),
            RoadSegment::new(Vec2::new(10.0, 110.0), Vec2::new(110.0, 110.0), 2, 3.0).unwrap(),
        ])
    }

    fn controller(strategy: RecoveryStrategy) -> VehicleController<KinematicBody> {
        VehicleController::new(KinematicBody::new(1500.0), &SimulationConfig::default(), strategy).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = SimulationConfig::default();
        config.vehicle.mass = -1.0;
        assert!(VehicleController::new(KinematicBody::new(1500.0), &config, RecoveryStrategy::Teleport).is_err());
    }

    #[test]
    fn first_route_snaps_vehicle_to_start() {
        let mut controller = controller(RecoveryStrategy::Teleport);
        controller.body_mut().set_linear_velocity(Vec3::new(3.0, 0.0, 0.0));
        controller.replace_route(l_route());

        assert_eq!(controller.body().position(), Vec3::new(10.0, 10.0, 0.5));
        assert_eq!(controller.body().linear_velocity(), Vec3::zeros());
        assert_eq!(controller.heading_degrees(), 0);

        // Later replacements do not move the vehicle
        controller.body_mut().set_position(Vec3::new(12.0, 40.0, 0.0));
        controller.replace_route(l_route());
        assert_eq!(controller.body().position(), Vec3::new(12.0, 40.0, 0.0));
    }

    #[test]
    fn empty_route_does_not_snap() {
        let mut controller = controller(RecoveryStrategy::Teleport);
        controller.body_mut().set_position(Vec3::new(5.0, 5.0, 0.0));
        controller.replace_route(Route::empty());
        assert_eq!(controller.body().position(), Vec3::new(5.0, 5.0, 0.0));

        let report = controller.tick(Controls::new(1.0, 0.0, 0.0), DT);
        assert!(report.check.on_road);
        assert_eq!(report.teleport, None);
        assert_eq!(controller.telemetry().remaining_road_m, f32::INFINITY);
    }

    #[test]
    fn teleport_strategy_recovers_stray_vehicle() {
        let mut controller = controller(RecoveryStrategy::Teleport);
        controller.replace_route(l_route());
        controller.body_mut().set_position(Vec3::new(60.0, 50.0, 0.0));

        let mut teleported = None;
        for _ in 0..60 {
            let report = controller.tick(Controls::default(), DT);
            if let Some(command) = report.teleport {
                teleported = Some(command);
                break;
            }
        }

        let command = teleported.unwrap();
        assert_eq!(command.segment_index, 0);
        let position = controller.body().position();
        assert!((position.x - 10.0).abs() < 1e-4);
        assert!((position.y - 50.0).abs() < 1e-4);
        assert_eq!(controller.body().linear_velocity(), Vec3::zeros());
        assert_eq!(controller.dynamics().engine_force(), 0.0);
    }

    #[test]
    fn continuous_strategy_never_teleports() {
        let mut controller = controller(RecoveryStrategy::continuous(&SimulationConfig::default()));
        controller.replace_route(l_route());
        controller.body_mut().set_position(Vec3::new(25.0, 50.0, 0.0));

        for _ in 0..240 {
            let report = controller.tick(Controls::default(), DT);
            assert_eq!(report.teleport, None);
            assert!(report.rail.map_or(false, |outcome| outcome.is_engaged()));
        }

        // Pulled toward the centreline at x = 10
        assert!(controller.body().position().x < 25.0);
    }

    #[test]
    fn geo_route_sets_frame_and_issues_requests() {
        let mut controller = controller(RecoveryStrategy::Teleport);
        let points = [GeoPoint::new(45.4240, -75.6950), GeoPoint::new(45.4243, -75.6950)];
        let segments = controller.accept_geo_route(&points);

        assert_eq!(segments, 1);
        assert!(controller.projector().is_some());
        let start = controller.geo_position().unwrap();
        assert!(start.distance_m(&points[0]) < 0.5);

        // About 33 m of road: the first tick asks for more
        let report = controller.tick(Controls::default(), DT);
        let request = report.road_request.unwrap();
        assert_eq!(request.heading_degrees, 0);
        assert!(controller.refill().in_flight());

        let next = [GeoPoint::new(45.4243, -75.6950), GeoPoint::new(45.4260, -75.6950)];
        controller.accept_geo_route(&next);
        assert!(!controller.refill().in_flight());
        // Same frame: the new route starts where the old one ended
        let start = controller.route().segments()[0].start();
        assert!((start.y - 33.4).abs() < 0.5, "{:?}", start);
    }

    #[test]
    fn unusable_geo_route_leaves_current_route() {
        let mut controller = controller(RecoveryStrategy::Teleport);
        assert_eq!(controller.accept_geo_route(&[GeoPoint::new(45.0, -75.0), GeoPoint::new(45.0002, -75.0)]), 1);
        let revision = controller.route().revision();

        assert_eq!(controller.accept_geo_route(&[GeoPoint::new(45.0002, -75.0)]), 0);
        assert_eq!(controller.accept_geo_route(&[]), 0);
        assert_eq!(controller.route().revision(), revision);
        assert!(controller.tracker().remaining_road_m().is_finite());
    }

    #[test]
    fn failed_request_clears_in_flight() {
        let mut controller = controller(RecoveryStrategy::Teleport);
        controller.accept_geo_route(&[GeoPoint::new(45.0, -75.0), GeoPoint::new(45.0002, -75.0)]);
        assert!(controller.tick(Controls::default(), DT).road_request.is_some());

        controller.road_request_failed("offline");
        assert!(!controller.refill().in_flight());
        assert!(controller.tick(Controls::default(), DT).road_request.is_none());
    }

    #[test]
    fn zero_dt_is_a_no_op() {
        let mut controller = controller(RecoveryStrategy::Teleport);
        controller.replace_route(l_route());
        let before = controller.body().position();
        let report = controller.tick(Controls::new(1.0, 0.0, 0.0), 0.0);

        assert_eq!(report.time, 0.0);
        assert_eq!(controller.body().position(), before);
        assert_eq!(controller.dynamics().engine_force(), 0.0);
    }
}
