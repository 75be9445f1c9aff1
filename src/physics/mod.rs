//! Point-mass / rod / joint structural dynamics.
//!
//! Bodies own their point masses in a contiguous vector; rods and joints refer to
//! them by index.

pub mod body;
pub mod collision;
pub mod joint;
pub mod point_mass;
pub mod rod;

use glam::DVec2;
use serde::{Deserialize, Serialize};

pub use body::{Body, BodyBuilder, StructureRef};
pub use joint::Joint;
pub use point_mass::PointMass;
pub use rod::Rod;

/// Axis-aligned rectangle, `min` inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec2,
    pub max: DVec2,
}

impl Aabb {
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    pub fn around(center: DVec2, radius: f64) -> Self {
        let r = DVec2::splat(radius);
        Self {
            min: center - r,
            max: center + r,
        }
    }

    pub fn expand(&self, by: f64) -> Self {
        let r = DVec2::splat(by);
        Self {
            min: self.min - r,
            max: self.max + r,
        }
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.y >= self.min.y && p.x <= self.max.x && p.y <= self.max.y
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// Signed excess of `value` beyond the `[low, high]` dead band; zero inside it.
pub fn dead_band(value: f64, low: f64, high: f64) -> f64 {
    if value > high {
        value - high
    } else if value < low {
        value - low
    } else {
        0.0
    }
}
