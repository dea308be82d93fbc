//! Scheduling of "need more road" requests.

use log::{info, warn};

use crate::config::RefillConfig;
use crate::geo::GeoPoint;

/// Ask the mapping collaborator for road starting near here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees clockwise from north, `[0, 360)`.
    pub heading_degrees: u32,
}

impl RoadRequest {
    pub fn new(position: GeoPoint, heading_degrees: u32) -> Self {
        Self {
            latitude: position.latitude,
            longitude: position.longitude,
            heading_degrees: heading_degrees % 360,
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// In-flight flag plus cooldown. At most one request is outstanding and
/// consecutive requests are at least one cooldown apart.
#[derive(Debug, Clone)]
pub struct RoadRefill {
    config: RefillConfig,
    in_flight: bool,
    cooldown_seconds: f32,
}

impl RoadRefill {
    pub fn new(config: RefillConfig) -> Self {
        Self {
            config,
            in_flight: false,
            cooldown_seconds: 0.0,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn cooldown_seconds(&self) -> f32 {
        self.cooldown_seconds
    }

    /// Advances the cooldown and returns true when a new request should go out.
    pub fn update(&mut self, remaining_road_m: f32, dt: f32) -> bool {
        self.cooldown_seconds = (self.cooldown_seconds - dt.max(0.0)).max(0.0);

        if self.in_flight || self.cooldown_seconds > 0.0 {
            return false;
        }
        if !(remaining_road_m < self.config.request_threshold_m) {
            return false;
        }

        info!("Requesting more road: {:.1} m remaining", remaining_road_m);
        self.in_flight = true;
        true
    }

    /// A new route arrived.
    pub fn complete(&mut self) {
        self.in_flight = false;
        self.cooldown_seconds = self.config.cooldown_seconds;
    }

    pub fn failed(&mut self, reason: &str) {
        warn!("Road request failed: {}; retrying in {:.1} s", reason, self.config.cooldown_seconds);
        self.in_flight = false;
        self.cooldown_seconds = self.config.cooldown_seconds;
    }
}
