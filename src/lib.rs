pub mod config;
pub mod geo;
pub mod mapping;
pub mod road;
pub mod simulation;

pub use simulation::*;
pub use config::*;
