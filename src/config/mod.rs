use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod rail;
pub mod road;
pub mod vehicle;

pub use rail::*;
pub use road::*;
pub use vehicle::*;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub road: RoadConfig,
    #[serde(default)]
    pub corridor: CorridorConfig,
    #[serde(default)]
    pub rail: RailConfig,
    #[serde(default)]
    pub refill: RefillConfig,
}

impl SimulationConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read simulation config '{}'", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(content)?;

        // Validate configurations
        config.validate()?;

        Ok(config)
    }
}

impl Validate for SimulationConfig {
    fn validate(&self) -> Result<()> {
        self.vehicle.validate()?;
        self.road.validate()?;
        self.corridor.validate()?;
        self.rail.validate()?;
        self.refill.validate()?;
        Ok(())
    }
}

pub trait Validate {
    fn validate(&self) -> Result<()>;
}
