//! On-road detection, route progress and teleport recovery.

use log::{debug, info};

use super::{ground, Vec2, Vec3};
use crate::config::CorridorConfig;
use crate::road::{hysteresis_score, RoadSegment, Route, SegmentProjection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPhase {
    #[default]
    OnRoad,
    OffRoadPending,
    /// Set for the tick in which a teleport was issued.
    Recovering,
}

/// Tracker state carried between ticks. Reset whenever the route changes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackingState {
    /// `None` while off-road or without a route. A fresh route starts at 0.
    pub current_segment: Option<usize>,
    /// Progress along the current segment, `[0, 1]`.
    pub current_t: f32,
    pub off_road_seconds: f32,
    pub teleport_cooldown_seconds: f32,
    pub phase: RecoveryPhase,
}

/// Where to put the vehicle back when it leaves the corridor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeleportTarget {
    pub segment_index: usize,
    /// Nearest point on the segment centreline.
    pub point: Vec2,
    /// Unit direction of that segment.
    pub forward: Vec2,
}

/// Result of one corridor check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorridorCheck {
    pub on_road: bool,
    pub segment_index: Option<usize>,
    pub t: f32,
    /// Distance to the centreline of the matched (or nearest) segment.
    pub distance_m: f32,
    /// Corridor half-width the distance was compared against.
    pub half_width_m: f32,
    pub remaining_m: f32,
    /// Set only when off-road.
    pub teleport: Option<TeleportTarget>,
}

impl CorridorCheck {
    fn no_route() -> Self {
        Self {
            on_road: true,
            segment_index: None,
            t: 0.0,
            distance_m: 0.0,
            half_width_m: 0.0,
            remaining_m: f32::INFINITY,
            teleport: None,
        }
    }
}

/// Pose to snap the vehicle to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeleportCommand {
    pub position: Vec3,
    pub forward: Vec2,
    pub segment_index: usize,
}

#[derive(Debug, Clone)]
pub struct CorridorTracker {
    config: CorridorConfig,
    route: Route,
    state: TrackingState,
    // Last on-road segment, kept while off-road to anchor the index penalty
    anchor: Option<usize>,
}

impl CorridorTracker {
    pub fn new(config: CorridorConfig) -> Self {
        Self {
            config,
            route: Route::empty(),
            state: TrackingState::default(),
            anchor: None,
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.set_route(route);
        self
    }

    pub fn config(&self) -> &CorridorConfig {
        &self.config
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// Swaps in a new route. A different revision resets all tracking state
    /// in the same call, so no check can see the new list with a stale index.
    pub fn set_route(&mut self, route: Route) {
        if self.route.same_as(&route) {
            return;
        }

        debug!(
            "Corridor tracker: route revision {} -> {} ({} segments)",
            self.route.revision(),
            route.revision(),
            route.len()
        );
        self.route = route;
        self.state = TrackingState {
            current_segment: (!self.route.is_empty()).then_some(0),
            ..TrackingState::default()
        };
        self.anchor = None;
    }

    /// Speed-dependent lateral slack.
    pub fn speed_pad(&self, speed_kmh: f32) -> f32 {
        let c = &self.config;
        (c.speed_pad_min_m + speed_kmh.max(0.0) / 100.0 * c.speed_pad_per_100kmh_m).clamp(c.speed_pad_min_m, c.speed_pad_max_m)
    }

    /// Corridor half-width used when (re)acquiring a segment.
    pub fn half_width(&self, segment: &RoadSegment, speed_kmh: f32) -> f32 {
        segment.base_half_width().max(self.config.min_half_width_m) + self.config.fixed_pad_m + self.speed_pad(speed_kmh)
    }

    /// Looser half-width for staying on the segment already tracked.
    pub fn outer_half_width(&self, segment: &RoadSegment, speed_kmh: f32) -> f32 {
        self.half_width(segment, speed_kmh) + self.config.hysteresis_band_m
    }

    /// Classifies `position` against the route and updates the tracked segment.
    pub fn check(&mut self, position: Vec3, speed_kmh: f32) -> CorridorCheck {
        if self.route.is_empty() {
            self.state.current_segment = None;
            self.state.current_t = 0.0;
            return CorridorCheck::no_route();
        }

        let p = ground(&position);

        if let Some(check) = self.check_current_segment(&p, speed_kmh) {
            return check;
        }

        let mut inside: Option<(usize, SegmentProjection, f32, f32)> = None;
        let mut nearest: Option<(usize, SegmentProjection, f32, f32)> = None;

        for (i, segment) in self.route.segments().iter().enumerate() {
            let projection = segment.project(&p);
            let score = hysteresis_score(projection.distance_sq, i, self.anchor, self.config.segment_index_penalty);
            let half_width = self.half_width(segment, speed_kmh);

            if projection.distance() <= half_width && inside.map_or(true, |(_, _, best, _)| score < best) {
                inside = Some((i, projection, score, half_width));
            }

            let closer = match nearest {
                None => true,
                Some((_, best_projection, best, _)) => {
                    score < best || (score == best && projection.distance_sq < best_projection.distance_sq)
                }
            };
            if closer {
                nearest = Some((i, projection, score, half_width));
            }
        }

        if let Some((i, projection, _, half_width)) = inside {
            if projection.t >= 1.0 {
                if let Some(check) = self.hand_over(i, &p, speed_kmh) {
                    return check;
                }
            }
            return self.acquire(i, projection, half_width);
        }

        self.state.current_segment = None;
        self.state.current_t = 0.0;

        // The route is non-empty, so there is always a nearest segment
        let teleport = nearest.map(|(i, projection, _, _)| TeleportTarget {
            segment_index: i,
            point: projection.point,
            forward: self.route.segments()[i].direction(),
        });

        CorridorCheck {
            on_road: false,
            segment_index: None,
            t: 0.0,
            distance_m: nearest.map_or(f32::INFINITY, |(_, projection, _, _)| projection.distance()),
            half_width_m: nearest.map_or(0.0, |(_, _, _, half_width)| half_width),
            remaining_m: f32::INFINITY,
            teleport,
        }
    }

    fn check_current_segment(&mut self, p: &Vec2, speed_kmh: f32) -> Option<CorridorCheck> {
        let index = self.state.current_segment?;
        // Only a segment acquired by a check gets the outer band
        if self.anchor != Some(index) {
            return None;
        }
        let segment = self.route.get(index)?;
        let projection = segment.project(p);

        // Past the far end the clamped distance is overshoot, not lateral offset
        if projection.t >= 1.0 && index + 1 < self.route.len() {
            return self.hand_over(index, p, speed_kmh);
        }

        let outer = self.outer_half_width(segment, speed_kmh);
        if projection.distance() > outer {
            return None;
        }

        self.state.current_t = projection.t;
        Some(self.on_road(index, &projection, outer))
    }

    /// Moves on to the segment after `index` if the vehicle is inside its corridor.
    fn hand_over(&mut self, index: usize, p: &Vec2, speed_kmh: f32) -> Option<CorridorCheck> {
        let next = self.route.get(index + 1)?;
        let projection = next.project(p);
        let half_width = self.half_width(next, speed_kmh);
        if projection.distance() > half_width {
            return None;
        }
        Some(self.acquire(index + 1, projection, half_width))
    }

    fn acquire(&mut self, index: usize, projection: SegmentProjection, half_width: f32) -> CorridorCheck {
        self.state.current_segment = Some(index);
        self.state.current_t = projection.t;
        self.anchor = Some(index);
        self.on_road(index, &projection, half_width)
    }

    fn on_road(&self, index: usize, projection: &SegmentProjection, half_width: f32) -> CorridorCheck {
        CorridorCheck {
            on_road: true,
            segment_index: Some(index),
            t: projection.t,
            distance_m: projection.distance(),
            half_width_m: half_width,
            remaining_m: self.route.remaining_from(index, projection.t).unwrap_or(f32::INFINITY),
            teleport: None,
        }
    }

    /// Road left ahead of the vehicle; infinite when off-road or without a route.
    pub fn remaining_road_m(&self) -> f32 {
        self.state
            .current_segment
            .and_then(|i| self.route.remaining_from(i, self.state.current_t))
            .unwrap_or(f32::INFINITY)
    }

    /// Advances the off-road state machine and returns a teleport once the
    /// vehicle has been off-road for the hold time and the cooldown is over.
    pub fn update_recovery(&mut self, check: &CorridorCheck, dt: f32) -> Option<TeleportCommand> {
        let target = self.accumulate(check, dt)?;

        if self.state.off_road_seconds < self.config.off_road_hold_seconds || self.state.teleport_cooldown_seconds > 0.0 {
            return None;
        }

        self.state.phase = RecoveryPhase::Recovering;
        self.state.off_road_seconds = 0.0;
        self.state.teleport_cooldown_seconds = self.config.teleport_cooldown_seconds;

        info!(
            "Off-road recovery: teleporting to segment {} at ({:.1}, {:.1})",
            target.segment_index, target.point.x, target.point.y
        );

        Some(TeleportCommand {
            position: Vec3::new(target.point.x, target.point.y, self.config.teleport_lift_m),
            forward: target.forward,
            segment_index: target.segment_index,
        })
    }

    /// Same bookkeeping as [`CorridorTracker::update_recovery`] without ever
    /// teleporting, for strategies that correct with forces instead.
    pub fn track_off_road_time(&mut self, check: &CorridorCheck, dt: f32) {
        self.accumulate(check, dt);
    }

    fn accumulate(&mut self, check: &CorridorCheck, dt: f32) -> Option<TeleportTarget> {
        let dt = dt.max(0.0);
        self.state.teleport_cooldown_seconds = (self.state.teleport_cooldown_seconds - dt).max(0.0);

        if check.on_road {
            self.state.off_road_seconds = 0.0;
            self.state.phase = RecoveryPhase::OnRoad;
            return None;
        }

        let target = check.teleport?;
        self.state.off_road_seconds += dt;
        self.state.phase = RecoveryPhase::OffRoadPending;
        Some(target)
    }
}
