// All tunable simulation constants in one place.

use std::path::Path;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::physics::Aabb;

// World
pub const WORLD_MIN_X: f64 = 0.0;
pub const WORLD_MIN_Y: f64 = 0.0;
pub const WORLD_MAX_X: f64 = 2000.0;
pub const WORLD_MAX_Y: f64 = 2000.0;
pub const CHUNK_SIZE: f64 = 128.0;
pub const FIXED_DT: f64 = 1.0 / 60.0;
pub const TERRAIN_SCALE: f64 = 400.0;
pub const SPAWN_MARGIN: f64 = 50.0;

// Population
pub const INITIAL_POPULATION: usize = 40;
pub const MAX_POPULATION: usize = 300;
pub const REPORT_INTERVAL: u64 = 600;

// Structural physics
pub const FORCE_PER_DISPLACEMENT: f64 = 40.0;
pub const SPRING_FRICTION_CONSTANT: f64 = 2.0;
pub const VISCOSITY: f64 = 0.4;
pub const MUSCLE_MULTIPLIER: f64 = 30.0;
pub const JOINT_FORCE_PER_RADIAN: f64 = 20.0;
pub const JOINT_FRICTION: f64 = 0.5;
pub const VEL_MAX: f64 = 200.0;
pub const KINETIC_FRICTION: f64 = 4.0;
pub const DEFAULT_POINT_RADIUS: f64 = 4.0;
pub const THRUST_MULTIPLIER: f64 = 40.0;
pub const TURN_MULTIPLIER: f64 = 2.0;

// Brain
pub const META_MUTATION: f64 = 0.05;
pub const NEURON_UPKEEP: f64 = 0.001;
pub const FIRING_COST: f64 = 0.002;
pub const DEFAULT_THRESHOLD: f64 = 1.0;
pub const DEFAULT_DECAY: f64 = 0.5;
pub const DEFAULT_ACTION_POTENTIAL: f64 = 1.0;
pub const DEFAULT_DEPOLARIZE: f64 = -0.5;
pub const INITIAL_INTERNAL_NEURONS: usize = 4;
pub const MAX_INTERNAL_NEURONS: usize = 64;
pub const WEIGHT_RANGE: f64 = 2.0;

// Mutation
pub const MUTATION_RETRY_CAP: usize = 16;
pub const DEFAULT_MUTATION_RATE: f64 = 0.1;
pub const PARAM_SIGMA: f64 = 0.15;
pub const COMPATIBILITY_THRESHOLD: u32 = 48;
pub const TEXT_COMPATIBILITY_THRESHOLD: u32 = 200;
pub const CROSS_MIN_BLOCK: usize = 1;
pub const CROSS_MAX_BLOCK: usize = 4;

// Body assembly
pub const MAX_ASSEMBLY_STEPS: usize = 256;
pub const MAX_BODY_POINTS: usize = 48;

// Energy
pub const INITIAL_ENERGY: f64 = 100.0;
pub const MAX_ENERGY: f64 = 200.0;
pub const BASE_METABOLISM: f64 = 0.004;
pub const FEED_RATE: f64 = 0.08;
pub const ACTUATION_COST: f64 = 0.001;
pub const BITE_DRAIN: f64 = 0.5;
pub const DEATH_REDISTRIBUTION: f64 = 0.5;
pub const REPRODUCTION_THRESHOLD: f64 = 150.0;
pub const REPRODUCTION_COST: f64 = 80.0;
pub const OFFSPRING_ENERGY: f64 = 60.0;
pub const MATE_RADIUS: f64 = 150.0;
pub const CROWDING_RADIUS: f64 = 100.0;
/// Child spawn distance from the parent centroid, in parent radii.
pub const OFFSPRING_SPACING: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsParams {
    pub force_per_displacement: f64,
    pub spring_friction: f64,
    pub viscosity: f64,
    pub muscle_multiplier: f64,
    pub joint_force_per_radian: f64,
    pub joint_friction: f64,
    pub vel_max: f64,
    pub kinetic_friction: f64,
    pub thrust_multiplier: f64,
    pub turn_multiplier: f64,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            force_per_displacement: FORCE_PER_DISPLACEMENT,
            spring_friction: SPRING_FRICTION_CONSTANT,
            viscosity: VISCOSITY,
            muscle_multiplier: MUSCLE_MULTIPLIER,
            joint_force_per_radian: JOINT_FORCE_PER_RADIAN,
            joint_friction: JOINT_FRICTION,
            vel_max: VEL_MAX,
            kinetic_friction: KINETIC_FRICTION,
            thrust_multiplier: THRUST_MULTIPLIER,
            turn_multiplier: TURN_MULTIPLIER,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainParams {
    pub neuron_upkeep: f64,
    pub firing_cost: f64,
}

impl Default for BrainParams {
    fn default() -> Self {
        Self {
            neuron_upkeep: NEURON_UPKEEP,
            firing_cost: FIRING_COST,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyParams {
    pub initial: f64,
    pub max: f64,
    pub base_metabolism: f64,
    pub feed_rate: f64,
    pub actuation_cost: f64,
    pub bite_drain: f64,
    pub death_redistribution: f64,
    pub reproduction_threshold: f64,
    pub reproduction_cost: f64,
    pub offspring_energy: f64,
}

impl Default for EnergyParams {
    fn default() -> Self {
        Self {
            initial: INITIAL_ENERGY,
            max: MAX_ENERGY,
            base_metabolism: BASE_METABOLISM,
            feed_rate: FEED_RATE,
            actuation_cost: ACTUATION_COST,
            bite_drain: BITE_DRAIN,
            death_redistribution: DEATH_REDISTRIBUTION,
            reproduction_threshold: REPRODUCTION_THRESHOLD,
            reproduction_cost: REPRODUCTION_COST,
            offspring_energy: OFFSPRING_ENERGY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldParams {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub chunk_size: f64,
    pub dt: f64,
    pub max_population: usize,
    pub mate_radius: f64,
    pub crowding_radius: f64,
}

impl WorldParams {
    pub fn bounds(&self) -> Aabb {
        Aabb::new(DVec2::new(self.min_x, self.min_y), DVec2::new(self.max_x, self.max_y))
    }
}

impl Default for WorldParams {
    fn default() -> Self {
        Self {
            min_x: WORLD_MIN_X,
            min_y: WORLD_MIN_Y,
            max_x: WORLD_MAX_X,
            max_y: WORLD_MAX_Y,
            chunk_size: CHUNK_SIZE,
            dt: FIXED_DT,
            max_population: MAX_POPULATION,
            mate_radius: MATE_RADIUS,
            crowding_radius: CROWDING_RADIUS,
        }
    }
}

/// Typed simulation configuration. Missing JSON fields fall back to the constants above.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub physics: PhysicsParams,
    pub brain: BrainParams,
    pub energy: EnergyParams,
    pub world: WorldParams,
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let cfg = SimConfig::from_json_str(r#"{ "physics": { "vel_max": 50.0 } }"#).unwrap();
        assert_eq!(cfg.physics.vel_max, 50.0);
        assert_eq!(cfg.physics.force_per_displacement, FORCE_PER_DISPLACEMENT);
        assert_eq!(cfg.energy, EnergyParams::default());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(SimConfig::from_json_str("{ physics: ").is_err());
    }
}
