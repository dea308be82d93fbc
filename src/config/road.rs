use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::Validate;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoadConfig {
    pub default_lane_count: u32,
    pub default_lane_width_m: f32,
    /// Minimum spacing between kept polyline samples.
    pub sample_every_m: f32,
    /// Consecutive kept points closer than this do not produce a segment.
    pub min_segment_length_m: f32,
}

impl Default for RoadConfig {
    fn default() -> Self {
        Self {
            default_lane_count: 2,
            default_lane_width_m: 3.0,
            sample_every_m: 10.0,
            min_segment_length_m: 0.05,
        }
    }
}

/// Corridor sizing and off-road recovery tuning.
///
/// These values were tuned by driving, not derived; treat them as knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorridorConfig {
    pub min_half_width_m: f32,
    pub fixed_pad_m: f32,
    pub speed_pad_min_m: f32,
    pub speed_pad_max_m: f32,
    /// Speed pad growth per 100 km/h.
    pub speed_pad_per_100kmh_m: f32,
    /// Extra slack granted while staying on the previously tracked segment.
    pub hysteresis_band_m: f32,
    /// Score penalty (m^2) per index step away from the last tracked segment.
    pub segment_index_penalty: f32,
    pub off_road_hold_seconds: f32,
    pub teleport_cooldown_seconds: f32,
    pub teleport_lift_m: f32,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self {
            min_half_width_m: 4.0,
            fixed_pad_m: 1.0,
            speed_pad_min_m: 1.25,
            speed_pad_max_m: 3.5,
            speed_pad_per_100kmh_m: 1.5,
            hysteresis_band_m: 1.0,
            segment_index_penalty: 0.05,
            off_road_hold_seconds: 0.4,
            teleport_cooldown_seconds: 1.0,
            teleport_lift_m: 0.5,
        }
    }
}

/// When to ask the mapping collaborator for more road.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefillConfig {
    pub request_threshold_m: f32,
    pub cooldown_seconds: f32,
}

impl Default for RefillConfig {
    fn default() -> Self {
        Self {
            request_threshold_m: 60.0,
            cooldown_seconds: 5.0,
        }
    }
}

impl Validate for RoadConfig {
    fn validate(&self) -> Result<()> {
        if self.default_lane_count == 0 {
            return Err(anyhow!("Default lane count must be greater than zero"));
        }

        if self.default_lane_width_m <= 0.0 {
            return Err(anyhow!("Default lane width must be positive"));
        }

        if self.sample_every_m < 0.0 || self.min_segment_length_m < 0.0 {
            return Err(anyhow!("Sampling distances must be non-negative"));
        }

        Ok(())
    }
}

impl Validate for CorridorConfig {
    fn validate(&self) -> Result<()> {
        if self.min_half_width_m <= 0.0 {
            return Err(anyhow!("Minimum corridor half-width must be positive"));
        }

        if self.fixed_pad_m < 0.0 || self.hysteresis_band_m < 0.0 {
            return Err(anyhow!("Corridor padding must be non-negative"));
        }

        if self.speed_pad_min_m < 0.0 || self.speed_pad_max_m < self.speed_pad_min_m {
            return Err(anyhow!(
                "Speed pad range must satisfy 0 <= min <= max, got {} -> {}",
                self.speed_pad_min_m,
                self.speed_pad_max_m
            ));
        }

        if self.segment_index_penalty < 0.0 {
            return Err(anyhow!("Segment index penalty must be non-negative"));
        }

        if self.off_road_hold_seconds < 0.0 || self.teleport_cooldown_seconds < 0.0 {
            return Err(anyhow!("Recovery timers must be non-negative"));
        }

        Ok(())
    }
}

impl Validate for RefillConfig {
    fn validate(&self) -> Result<()> {
        if self.request_threshold_m <= 0.0 {
            return Err(anyhow!("Refill threshold must be positive"));
        }

        if self.cooldown_seconds < 0.0 {
            return Err(anyhow!("Refill cooldown must be non-negative"));
        }

        Ok(())
    }
}
