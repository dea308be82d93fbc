use nalgebra::Vector3;

pub mod body;
pub mod controller;
pub mod corridor;
pub mod driver;
pub mod dynamics;
pub mod rail;
pub mod refill;

pub use body::*;
pub use controller::*;
pub use corridor::*;
pub use driver::*;
pub use dynamics::*;
pub use rail::*;
pub use refill::*;

pub use crate::road::Vec2;
pub type Vec3 = Vector3<f32>;

pub const MPS_TO_KMH: f32 = 3.6;

/// Driver inputs for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Controls {
    /// `[0, 1]`
    pub throttle: f32,
    /// `[0, 1]`
    pub brake: f32,
    /// `[-1, 1]`, positive turns right.
    pub steering: f32,
}

impl Controls {
    pub fn new(throttle: f32, brake: f32, steering: f32) -> Self {
        Self { throttle, brake, steering }
    }

    /// Out-of-range inputs are clamped, never rejected. NaN reads as zero.
    pub fn clamped(&self) -> Self {
        fn clamp(v: f32, lo: f32, hi: f32) -> f32 {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(lo, hi)
            }
        }

        Self {
            throttle: clamp(self.throttle, 0.0, 1.0),
            brake: clamp(self.brake, 0.0, 1.0),
            steering: clamp(self.steering, -1.0, 1.0),
        }
    }
}

/// Ground-plane (east, north) part of a 3D vector.
pub fn ground(v: &Vec3) -> Vec2 {
    Vec2::new(v.x, v.y)
}
