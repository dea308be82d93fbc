//! Local tangent-plane projection.
//!
//! Equirectangular approximation around an origin: one degree of latitude is
//! a constant 111 320 m and one degree of longitude is scaled by
//! `cos(origin latitude)`. Good to well under 0.1 % at city scale.

use nalgebra::Vector2;

use super::GeoPoint;

pub const METRES_PER_DEG_LAT: f64 = 111_320.0;

/// Converts between geographic points and (east, north) metre offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoProjector {
    origin: GeoPoint,
    metres_per_deg_lon: f64,
}

impl GeoProjector {
    pub fn new(origin: GeoPoint) -> Self {
        Self {
            origin,
            metres_per_deg_lon: METRES_PER_DEG_LAT * origin.latitude.to_radians().cos(),
        }
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    /// (east, north) offset of `point` from the origin, in metres.
    pub fn to_local(&self, point: &GeoPoint) -> Vector2<f32> {
        let east = (point.longitude - self.origin.longitude) * self.metres_per_deg_lon;
        let north = (point.latitude - self.origin.latitude) * METRES_PER_DEG_LAT;
        Vector2::new(east as f32, north as f32)
    }

    /// Inverse of [`GeoProjector::to_local`].
    ///
    /// Near the poles the longitude scale collapses; the origin longitude is
    /// returned rather than dividing by zero.
    pub fn to_geo(&self, local: &Vector2<f32>) -> GeoPoint {
        let latitude = self.origin.latitude + local.y as f64 / METRES_PER_DEG_LAT;
        let longitude = if self.metres_per_deg_lon.abs() < 1e-9 {
            self.origin.longitude
        } else {
            self.origin.longitude + local.x as f64 / self.metres_per_deg_lon
        };
        GeoPoint::new(latitude, longitude)
    }
}
