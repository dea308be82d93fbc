use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::Validate;

/// Gains and caps for the continuous rail assist.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RailConfig {
    pub lateral_k: f32,
    pub lateral_damping: f32,
    pub longitudinal_k: f32,
    pub longitudinal_damping: f32,
    pub yaw_k: f32,
    pub yaw_damping: f32,

    /// Dead-band around the centreline before gains start ramping.
    pub soft_band_m: f32,
    pub k_gain_per_m: f32,
    pub k_gain_per_m2: f32,
    pub d_gain_per_m: f32,
    pub d_gain_per_m2: f32,
    pub yaw_gain_per_m: f32,

    pub look_ahead_m: f32,
    pub min_yaw_speed: f32,

    pub max_lateral_force: f32,
    pub max_longitudinal_force: f32,
    pub max_yaw_torque: f32,

    pub far_brake_enabled: bool,
    pub far_brake_start_m: f32,
    pub far_brake_full_m: f32,
    pub far_brake_max_force: f32,
    pub far_target_speed: f32,
    /// Brake newtons per m/s above the far target speed.
    pub far_brake_gain: f32,
}

impl Default for RailConfig {
    fn default() -> Self {
        Self {
            lateral_k: 40.0,
            lateral_damping: 12.0,
            longitudinal_k: 25.0,
            longitudinal_damping: 10.0,
            yaw_k: 8.0,
            yaw_damping: 2.0,
            soft_band_m: 1.5,
            k_gain_per_m: 0.20,
            k_gain_per_m2: 0.0020,
            d_gain_per_m: 0.35,
            d_gain_per_m2: 0.0035,
            yaw_gain_per_m: 0.10,
            look_ahead_m: 8.0,
            min_yaw_speed: 1.0,
            max_lateral_force: 8000.0,
            max_longitudinal_force: 6000.0,
            max_yaw_torque: 4000.0,
            far_brake_enabled: true,
            far_brake_start_m: 6.0,
            far_brake_full_m: 25.0,
            far_brake_max_force: 6000.0,
            far_target_speed: 20.0,
            far_brake_gain: 300.0,
        }
    }
}

impl Validate for RailConfig {
    fn validate(&self) -> Result<()> {
        let gains = [
            self.lateral_k,
            self.lateral_damping,
            self.longitudinal_k,
            self.longitudinal_damping,
            self.yaw_k,
            self.yaw_damping,
            self.k_gain_per_m,
            self.k_gain_per_m2,
            self.d_gain_per_m,
            self.d_gain_per_m2,
            self.yaw_gain_per_m,
        ];
        if gains.iter().any(|g| *g < 0.0) {
            return Err(anyhow!("Rail gains must be non-negative"));
        }

        if self.soft_band_m < 0.0 || self.look_ahead_m < 0.0 {
            return Err(anyhow!("Rail soft band and look-ahead must be non-negative"));
        }

        if self.max_lateral_force <= 0.0 || self.max_longitudinal_force <= 0.0 || self.max_yaw_torque <= 0.0 {
            return Err(anyhow!("Rail force caps must be positive"));
        }

        if self.far_brake_enabled {
            if self.far_brake_full_m <= self.far_brake_start_m {
                return Err(anyhow!(
                    "Far brake range must be increasing, got {} -> {} m",
                    self.far_brake_start_m,
                    self.far_brake_full_m
                ));
            }

            if self.far_brake_max_force < 0.0 || self.far_target_speed < 0.0 || self.far_brake_gain < 0.0 {
                return Err(anyhow!("Far brake parameters must be non-negative"));
            }
        }

        Ok(())
    }
}
