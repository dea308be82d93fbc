use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Validate;
use crate::geo::GeoPoint;

/// A named geographic polyline stored as TOML.
///
/// ```toml
/// name = "Wellington St"
///
/// [[points]]
/// latitude = 45.4240
/// longitude = -75.6950
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolylineFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub points: Vec<GeoPoint>,
}

impl PolylineFile {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read polyline '{}'", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let polyline: PolylineFile = toml::from_str(content)?;
        polyline.validate()?;
        Ok(polyline)
    }
}

impl Validate for PolylineFile {
    fn validate(&self) -> Result<()> {
        for (i, point) in self.points.iter().enumerate() {
            if !point.is_finite() {
                return Err(anyhow!("Polyline point {} is not finite", i));
            }

            if point.latitude.abs() > 90.0 || point.longitude.abs() > 180.0 {
                return Err(anyhow!(
                    "Polyline point {} ({}, {}) is outside latitude/longitude range",
                    i,
                    point.latitude,
                    point.longitude
                ));
            }
        }

        Ok(())
    }
}
