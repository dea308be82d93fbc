use serde::{Deserialize, Serialize};

pub mod projection;

pub use projection::*;

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS-84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Haversine great-circle distance in metres.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();

        let a = (d_lat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon * 0.5).sin().powi(2);

        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

/// Heading in whole degrees clockwise from north, in `[0, 360)`.
///
/// `east` and `north` are the ground-plane components of a forward vector.
pub fn heading_degrees(east: f32, north: f32) -> u32 {
    let mut degrees = east.atan2(north).to_degrees();
    if degrees < 0.0 {
        degrees += 360.0;
    }
    (degrees.round() as u32) % 360
}

/// 8-point compass label for a heading in degrees from north.
pub fn compass_label(heading_degrees: u32) -> &'static str {
    let degrees = (heading_degrees % 360) as f32;

    if degrees >= 337.5 || degrees < 22.5 {
        "N"
    } else if degrees < 67.5 {
        "NE"
    } else if degrees < 112.5 {
        "E"
    } else if degrees < 157.5 {
        "SE"
    } else if degrees < 202.5 {
        "S"
    } else if degrees < 247.5 {
        "SW"
    } else if degrees < 292.5 {
        "W"
    } else {
        "NW"
    }
}
