use glam::DVec2;
use tracing::{debug, warn};

use crate::arena::OrganismId;
use crate::brain::Brain;
use crate::config::{EnergyParams, SimConfig};
use crate::energy::{self, Energy};
use crate::genome::{Genome, GenomeKind, Phenotype};
use crate::physics::{Aabb, Body, PointMass};
use crate::wiring::{Actuator, Sense, Wiring};

/// Values the environment measures for an organism before it thinks.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Surroundings {
    pub terrain: f64,
    pub crowding: usize,
}

/// A bite attempt produced by the act phase, resolved against other bodies later.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiteIntent {
    pub point: usize,
    pub effort: f64,
}

/// A living soft body with its controller, genome and energy balance.
#[derive(Clone, Debug)]
pub struct Organism {
    genome: Genome,
    pub body: Body,
    pub brain: Brain,
    wiring: Wiring,
    pub energy: Energy,
    /// Direction thrust is applied in, radians.
    pub heading: f64,
    pub generation: u32,
    pub age: u64,
    centroid: DVec2,
    radius: f64,
    /// Per point: touched another organism in the last collision phase.
    touching: Vec<bool>,
    pub last_attacker: Option<OrganismId>,
    /// Energy lost to bites over the organism's lifetime.
    pub bite_losses: f64,
}

impl Organism {
    pub fn new(genome: Genome, phenotype: Phenotype, energy: f64, heading: f64, generation: u32) -> Self {
        let Phenotype { body, wiring, brain } = phenotype;
        let touching = vec![false; body.points().len()];
        let mut org = Self {
            genome,
            body,
            brain,
            wiring,
            energy: Energy::new(energy),
            heading,
            generation,
            age: 0,
            centroid: DVec2::ZERO,
            radius: 0.0,
            touching,
            last_attacker: None,
            bite_losses: 0.0,
        };
        org.refresh();
        org
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn kind(&self) -> GenomeKind {
        self.genome.kind()
    }

    pub fn wiring(&self) -> &Wiring {
        &self.wiring
    }

    /// Recompute the cached centroid and broad-phase radius from the body.
    pub fn refresh(&mut self) {
        self.centroid = self.body.centroid();
        self.radius = self.body.radius_about(self.centroid) + self.body.max_point_radius();
    }

    pub fn position(&self) -> DVec2 {
        self.centroid
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::around(self.centroid, self.radius)
    }

    pub fn speed(&self) -> f64 {
        self.body.velocity().length()
    }

    pub fn direction(&self) -> DVec2 {
        DVec2::from_angle(self.heading)
    }

    pub fn is_alive(&self) -> bool {
        self.energy.is_alive()
    }

    pub fn touching(&self, point: usize) -> bool {
        self.touching.get(point).copied().unwrap_or(false)
    }

    pub fn touched_points(&self) -> Vec<usize> {
        self.touching
            .iter()
            .enumerate()
            .filter(|(_, t)| **t)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn clear_touching(&mut self) {
        self.touching.fill(false);
    }

    pub fn mark_touching(&mut self, point: usize) {
        if let Some(t) = self.touching.get_mut(point) {
            *t = true;
        }
    }

    /// Read one sense. Stale joint/rod/point indices read as 0.
    pub fn sense(&self, sense: Sense, around: &Surroundings, config: &SimConfig) -> f64 {
        match sense {
            Sense::Energy => self.energy.value() / config.energy.max,
            Sense::Speed => self.speed() / config.physics.vel_max,
            Sense::Heading => self.heading.sin(),
            Sense::Terrain => around.terrain,
            Sense::Crowding => around.crowding as f64,
            Sense::JointAngle(j) => self.body.joint_angle(j).unwrap_or_else(|| {
                debug!(joint = j, "sense reads missing joint");
                0.0
            }),
            Sense::RodStrain(r) => self.body.rod_strain(r).unwrap_or_else(|| {
                debug!(rod = r, "sense reads missing rod");
                0.0
            }),
            Sense::Touch(p) => {
                if self.touching(p) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Push every wired sense into the brain's inputs.
    pub fn perceive(&mut self, around: &Surroundings, config: &SimConfig) {
        let values: Vec<f64> = self
            .wiring
            .senses()
            .iter()
            .map(|&s| self.sense(s, around, config))
            .collect();
        for (i, v) in values.into_iter().enumerate() {
            self.brain.set_input(i, v);
        }
    }

    pub fn think(&mut self, config: &SimConfig) {
        self.brain.tick(&mut self.energy, &config.brain);
    }

    /// Dispatch brain outputs to actuators. Each actuator pays
    /// `|output * strength| * actuation_cost` and delivers the granted fraction.
    pub fn act(&mut self, config: &SimConfig, dt: f64) -> Vec<BiteIntent> {
        let mut bites = Vec::new();
        let actuators = self.wiring.actuators().to_vec();
        for actuator in actuators {
            let drive = self.brain.output(actuator.output()) * actuator.strength();
            let request = drive.abs() * config.energy.actuation_cost;
            if drive == 0.0 {
                continue;
            }
            let effort = if request > 0.0 {
                let granted = self.energy.use_energy(request);
                drive * (granted / request).clamp(0.0, 1.0)
            } else {
                drive
            };
            if effort == 0.0 {
                continue;
            }

            match actuator {
                Actuator::Muscle { target, .. } => self.body.contract(target, effort),
                Actuator::Thrust { point, .. } => {
                    let force = self.direction() * effort * config.physics.thrust_multiplier;
                    match self.body.points_mut().get_mut(point) {
                        Some(p) => p.apply_force(force),
                        None => warn!(point, "thrust targets missing point"),
                    }
                }
                Actuator::Turn { .. } => {
                    self.heading = (self.heading + effort * config.physics.turn_multiplier * dt)
                        .rem_euclid(std::f64::consts::TAU);
                }
                Actuator::Bite { point, .. } => {
                    if effort > 0.0 {
                        bites.push(BiteIntent { point, effort });
                    }
                }
            }
        }
        bites
    }

    /// Upkeep for the body and food from the terrain underneath.
    pub fn metabolize(&mut self, terrain: f64, params: &EnergyParams) {
        self.energy
            .use_energy(energy::metabolic_cost(self.body.points().len(), params));
        self.energy.gain(energy::feeding_gain(terrain, params), params.max);
    }

    pub fn view(&self, id: OrganismId) -> OrganismView {
        OrganismView {
            id,
            kind: self.kind(),
            position: self.centroid,
            energy: self.energy.value(),
            speed: self.speed(),
            direction: self.direction(),
            radius: self.radius,
            generation: self.generation,
            points: self.body.points().iter().map(|p: &PointMass| p.pos).collect(),
            segments: self.body.segments().collect(),
        }
    }
}

/// Read-only snapshot of one organism for renderers.
#[derive(Clone, Debug, PartialEq)]
pub struct OrganismView {
    pub id: OrganismId,
    pub kind: GenomeKind,
    pub position: DVec2,
    pub energy: f64,
    pub speed: f64,
    pub direction: DVec2,
    pub radius: f64,
    pub generation: u32,
    pub points: Vec<DVec2>,
    pub segments: Vec<(DVec2, DVec2)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::{BuildContext, Gene};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn organism(seed: u64) -> Organism {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let genome = Genome::random(GenomeKind::Instruction, &mut rng).unwrap();
        let phenotype = genome
            .create(&mut BuildContext::new(DVec2::new(100.0, 100.0), &mut rng))
            .unwrap();
        Organism::new(genome, phenotype, 100.0, 0.0, 0)
    }

    #[test]
    fn cached_bounds_cover_every_point() {
        let org = organism(1);
        let bounds = org.bounds();
        for p in org.body.points() {
            assert!(bounds.contains(p.pos));
        }
        assert!(org.position().distance(DVec2::new(100.0, 100.0)) < 1e-6);
    }

    #[test]
    fn senses_read_energy_and_touch() {
        let config = SimConfig::default();
        let mut org = organism(2);
        let around = Surroundings {
            terrain: 0.4,
            crowding: 3,
        };
        assert_eq!(
            org.sense(Sense::Energy, &around, &config),
            100.0 / config.energy.max
        );
        assert_eq!(org.sense(Sense::Terrain, &around, &config), 0.4);
        assert_eq!(org.sense(Sense::Crowding, &around, &config), 3.0);
        assert_eq!(org.sense(Sense::Touch(0), &around, &config), 0.0);
        org.mark_touching(0);
        assert_eq!(org.sense(Sense::Touch(0), &around, &config), 1.0);
        assert_eq!(org.sense(Sense::JointAngle(999), &around, &config), 0.0);
        org.clear_touching();
        assert!(!org.touching(0));
    }

    #[test]
    fn metabolism_charges_per_point_and_feeds() {
        let params = EnergyParams::default();
        let mut org = organism(3);
        let n = org.body.points().len() as f64;
        let before = org.energy.value();
        org.metabolize(0.5, &params);
        let expected = before - params.base_metabolism * n + params.feed_rate * 0.5;
        assert!((org.energy.value() - expected).abs() < 1e-9);
    }

    #[test]
    fn quiet_brain_costs_no_actuation() {
        let config = SimConfig::default();
        let mut org = organism(4);
        let before = org.energy.value();
        let bites = org.act(&config, config.world.dt);
        assert!(bites.is_empty());
        assert_eq!(org.energy.value(), before);
    }
}
