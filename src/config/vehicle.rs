use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::Validate;

/// Physical parameters of the simulated car.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub mass: f32,
    pub drag_coefficient: f32,
    /// Newtons per m/s of speed.
    pub rolling_resistance: f32,
    pub max_throttle_force: f32,
    pub max_brake_force: f32,
    /// How fast the engine force may rise or fall, N/s.
    pub max_accel_rate: f32,
    /// How fast the brake force may rise or fall, N/s.
    pub max_brake_rate: f32,
    pub max_steering_angle_deg: f32,
    pub steering_rate_deg_per_sec: f32,
    /// Below this speed the full steering angle is available.
    pub steering_fade_start_kmh: f32,
    /// Above this speed only `min_steering_angle_deg` is available.
    pub steering_fade_end_kmh: f32,
    pub min_steering_angle_deg: f32,
    pub wheelbase: f32,
    pub max_speed_kmh: f32,
    /// Turning is skipped below this speed (m/s).
    pub min_turning_speed: f32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            mass: 1500.0,
            drag_coefficient: 0.32,
            rolling_resistance: 12.0,
            max_throttle_force: 4000.0,
            max_brake_force: 9000.0,
            max_accel_rate: 6000.0,
            max_brake_rate: 18000.0,
            max_steering_angle_deg: 30.0,
            steering_rate_deg_per_sec: 90.0,
            steering_fade_start_kmh: 20.0,
            steering_fade_end_kmh: 120.0,
            min_steering_angle_deg: 4.0,
            wheelbase: 2.4,
            max_speed_kmh: 200.0,
            min_turning_speed: 0.5,
        }
    }
}

impl Validate for VehicleConfig {
    fn validate(&self) -> Result<()> {
        if self.mass <= 0.0 {
            return Err(anyhow!("Vehicle mass must be positive"));
        }

        if self.drag_coefficient < 0.0 || self.rolling_resistance < 0.0 {
            return Err(anyhow!("Drag and rolling resistance must be non-negative"));
        }

        if self.max_throttle_force <= 0.0 || self.max_brake_force <= 0.0 {
            return Err(anyhow!("Throttle and brake forces must be positive"));
        }

        if self.max_accel_rate <= 0.0 || self.max_brake_rate <= 0.0 {
            return Err(anyhow!("Force ramp rates must be positive"));
        }

        if self.max_steering_angle_deg <= 0.0 || self.max_steering_angle_deg >= 90.0 {
            return Err(anyhow!("Max steering angle must be in range (0, 90) degrees"));
        }

        if self.min_steering_angle_deg <= 0.0 || self.min_steering_angle_deg > self.max_steering_angle_deg {
            return Err(anyhow!("Min steering angle must be in range (0, {}] degrees", self.max_steering_angle_deg));
        }

        if self.steering_rate_deg_per_sec <= 0.0 {
            return Err(anyhow!("Steering rate must be positive"));
        }

        if self.steering_fade_start_kmh < 0.0 || self.steering_fade_end_kmh <= self.steering_fade_start_kmh {
            return Err(anyhow!(
                "Steering fade range must be increasing, got {} -> {} km/h",
                self.steering_fade_start_kmh,
                self.steering_fade_end_kmh
            ));
        }

        if self.wheelbase <= 0.0 {
            return Err(anyhow!("Wheelbase must be positive"));
        }

        if self.max_speed_kmh <= 0.0 {
            return Err(anyhow!("Max speed must be positive"));
        }

        if self.min_turning_speed < 0.0 {
            return Err(anyhow!("Min turning speed must be non-negative"));
        }

        Ok(())
    }
}
