//! World state and the fixed-order simulation step.

use std::f64::consts::TAU;

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::arena::{Arena, OrganismId};
use crate::config::{self, SimConfig};
use crate::error::GenomeError;
use crate::gene::{BuildContext, Gene};
use crate::genome::{Genome, GenomeKind};
use crate::grid::Grid;
use crate::organism::{BiteIntent, Organism, OrganismView, Surroundings};
use crate::physics::{collision, Aabb};
use crate::reproduction;
use crate::terrain::{NoiseTerrain, Terrain};

/// What happened during one step. Recoverable failures are counted here as
/// well as logged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub births: usize,
    pub sexual_births: usize,
    pub deaths: usize,
    pub construction_failures: usize,
    pub incompatible_pairings: usize,
    pub asexual_fallbacks: usize,
    pub bites: usize,
    /// Organism pairs that touched.
    pub contacts: usize,
}

impl TickReport {
    pub fn absorb(&mut self, other: &TickReport) {
        self.births += other.births;
        self.sexual_births += other.sexual_births;
        self.deaths += other.deaths;
        self.construction_failures += other.construction_failures;
        self.incompatible_pairings += other.incompatible_pairings;
        self.asexual_fallbacks += other.asexual_fallbacks;
        self.bites += other.bites;
        self.contacts += other.contacts;
    }
}

/// Express `genome` at `origin` and register it with the arena and grid.
pub(crate) fn spawn_organism(
    organisms: &mut Arena<Organism>,
    grid: &mut Grid<OrganismId>,
    rng: &mut ChaCha8Rng,
    genome: Genome,
    origin: DVec2,
    energy: f64,
    generation: u32,
) -> Result<OrganismId, GenomeError> {
    let heading = rng.gen_range(0.0..TAU);
    let phenotype = genome.create(&mut BuildContext::new(origin, rng))?;
    let organism = Organism::new(genome, phenotype, energy, heading, generation);
    let pos = organism.position();
    let id = organisms.spawn(organism);
    grid.insert(id, pos);
    Ok(id)
}

/// Owns every organism, the chunk grid, the terrain and the single seeded RNG.
pub struct Environment {
    config: SimConfig,
    organisms: Arena<Organism>,
    grid: Grid<OrganismId>,
    terrain: Box<dyn Terrain>,
    rng: ChaCha8Rng,
    seed: u64,
    tick: u64,
}

impl Environment {
    pub fn new(config: SimConfig, seed: u64, terrain: Box<dyn Terrain>) -> Self {
        Self {
            grid: Grid::new(config.world.chunk_size),
            config,
            organisms: Arena::new(),
            terrain,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            tick: 0,
        }
    }

    /// Environment over a Perlin food field derived from `seed`.
    pub fn with_noise_terrain(config: SimConfig, seed: u64) -> Self {
        let terrain = NoiseTerrain::new(seed as u32, config::TERRAIN_SCALE);
        Self::new(config, seed, Box::new(terrain))
    }

    /// Reassemble from saved state. The grid is rebuilt from organism positions.
    pub(crate) fn from_parts(
        config: SimConfig,
        seed: u64,
        tick: u64,
        rng: ChaCha8Rng,
        organisms: Arena<Organism>,
        terrain: Box<dyn Terrain>,
    ) -> Self {
        let mut grid = Grid::new(config.world.chunk_size);
        for (id, org) in organisms.iter() {
            grid.insert(id, org.position());
        }
        Self {
            config,
            organisms,
            grid,
            terrain,
            rng,
            seed,
            tick,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub(crate) fn rng(&self) -> &ChaCha8Rng {
        &self.rng
    }

    pub fn organisms(&self) -> &Arena<Organism> {
        &self.organisms
    }

    pub fn organism(&self, id: OrganismId) -> Option<&Organism> {
        self.organisms.get(id)
    }

    pub fn organism_mut(&mut self, id: OrganismId) -> Option<&mut Organism> {
        self.organisms.get_mut(id)
    }

    pub fn grid(&self) -> &Grid<OrganismId> {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.organisms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organisms.is_empty()
    }

    /// `(xmin, ymin, xmax, ymax)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let w = &self.config.world;
        (w.min_x, w.min_y, w.max_x, w.max_y)
    }

    pub fn aabb(&self) -> Aabb {
        self.config.world.bounds()
    }

    pub fn terrain_value(&self, pos: DVec2) -> f64 {
        self.terrain.value(pos)
    }

    pub fn views(&self) -> Vec<OrganismView> {
        self.organisms.iter().map(|(id, org)| org.view(id)).collect()
    }

    pub fn spawn(
        &mut self,
        genome: Genome,
        origin: DVec2,
        energy: f64,
        generation: u32,
    ) -> Result<OrganismId, GenomeError> {
        spawn_organism(
            &mut self.organisms,
            &mut self.grid,
            &mut self.rng,
            genome,
            origin,
            energy,
            generation,
        )
    }

    /// Seed `count` random organisms, cycling through `kinds` (all kinds if empty).
    /// Returns how many were built.
    pub fn populate(&mut self, count: usize, kinds: &[GenomeKind]) -> usize {
        let kinds = if kinds.is_empty() {
            &GenomeKind::ALL[..]
        } else {
            kinds
        };
        let mut spawned = 0;
        for i in 0..count {
            let kind = kinds[i % kinds.len()];
            let origin = self.random_position(config::SPAWN_MARGIN);
            let genome = match Genome::random(kind, &mut self.rng) {
                Ok(genome) => genome,
                Err(e) => {
                    warn!(?kind, error = %e, "random genome failed to express");
                    continue;
                }
            };
            match self.spawn(genome, origin, self.config.energy.initial, 0) {
                Ok(_) => spawned += 1,
                Err(e) => warn!(?kind, error = %e, "random organism failed to build"),
            }
        }
        info!(spawned, requested = count, "population seeded");
        spawned
    }

    fn random_position(&mut self, margin: f64) -> DVec2 {
        let b = self.aabb();
        let axis = |lo: f64, hi: f64, rng: &mut ChaCha8Rng| {
            if hi - lo > 2.0 * margin {
                rng.gen_range(lo + margin..hi - margin)
            } else {
                (lo + hi) * 0.5
            }
        };
        let x = axis(b.min.x, b.max.x, &mut self.rng);
        let y = axis(b.min.y, b.max.y, &mut self.rng);
        DVec2::new(x, y)
    }

    /// Largest broad-phase radius of any live organism.
    fn max_organism_radius(&self) -> f64 {
        self.organisms
            .iter()
            .map(|(_, org)| org.radius())
            .fold(0.0, f64::max)
    }

    fn surroundings(&self, id: OrganismId) -> Surroundings {
        let Some(org) = self.organisms.get(id) else {
            return Surroundings::default();
        };
        let pos = org.position();
        let crowding = self
            .grid
            .entities_in_disk(pos, self.config.world.crowding_radius, |other| {
                self.organisms.get(other).map(Organism::position)
            })
            .into_iter()
            .filter(|&other| other != id)
            .count();
        Surroundings {
            terrain: self.terrain.value(pos),
            crowding,
        }
    }

    /// One fixed step: sense/think/act, collide, structural forces, integrate,
    /// re-home; then deaths and reproduction.
    pub fn step(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let dt = self.config.world.dt;
        let bounds = self.aabb();

        let ids = self.organisms.ids();
        let surroundings: Vec<Surroundings> = ids.iter().map(|&id| self.surroundings(id)).collect();
        let mut bites = Vec::new();
        for (&id, around) in ids.iter().zip(&surroundings) {
            let Some(org) = self.organisms.get_mut(id) else {
                continue;
            };
            org.perceive(around, &self.config);
            org.think(&self.config);
            bites.extend(org.act(&self.config, dt).into_iter().map(|bite| (id, bite)));
            org.metabolize(around.terrain, &self.config.energy);
        }
        report.bites = self.resolve_bites(&bites);

        report.contacts = self.collide();

        for (_, org) in self.organisms.iter_mut() {
            org.body.accumulate_forces(&self.config.physics);
        }

        for (_, org) in self.organisms.iter_mut() {
            org.body.integrate(&self.config.physics, dt, &bounds);
            org.refresh();
            org.age += 1;
        }

        for (id, org) in self.organisms.iter() {
            self.grid.rehome(id, org.position());
        }

        self.bury_dead(&mut report);
        reproduction::check_and_spawn(
            &mut self.organisms,
            &mut self.grid,
            &self.config,
            &mut self.rng,
            &mut report,
        );

        self.tick += 1;
        report
    }

    /// Each bite drains the first organism whose point overlaps the biting point.
    fn resolve_bites(&mut self, bites: &[(OrganismId, BiteIntent)]) -> usize {
        if bites.is_empty() {
            return 0;
        }
        let reach = self.max_organism_radius();
        let mut landed = 0;
        for &(attacker, bite) in bites {
            let Some(org) = self.organisms.get(attacker) else {
                continue;
            };
            let Some(mouth) = org.body.points().get(bite.point) else {
                warn!(organism = ?attacker, point = bite.point, "bite from missing point");
                continue;
            };
            let (mouth_pos, mouth_radius) = (mouth.pos, mouth.radius);

            let search = Aabb::around(mouth_pos, mouth_radius).expand(reach);
            let victim = self
                .grid
                .entities_in_box(&search)
                .into_iter()
                .filter(|&v| v != attacker)
                .find(|&v| {
                    self.organisms.get(v).is_some_and(|o| {
                        o.body
                            .points()
                            .iter()
                            .any(|p| p.pos.distance(mouth_pos) < p.radius + mouth_radius)
                    })
                });
            let Some(victim) = victim else {
                continue;
            };
            let Some((a, v)) = self.organisms.get2_mut(attacker, victim) else {
                continue;
            };
            let taken = v.energy.drain(bite.effort * self.config.energy.bite_drain);
            v.bite_losses += taken;
            v.last_attacker = Some(attacker);
            a.energy.gain(taken, self.config.energy.max);
            landed += 1;
            debug!(?attacker, ?victim, taken, "bite landed");
        }
        landed
    }

    /// Broad phase over grid chunks, narrow phase per body pair.
    fn collide(&mut self) -> usize {
        for (_, org) in self.organisms.iter_mut() {
            org.clear_touching();
        }

        let reach = self.max_organism_radius();
        let mut pairs = Vec::new();
        for (a, org) in self.organisms.iter() {
            let bounds = org.bounds();
            for b in self.grid.entities_in_box(&bounds.expand(reach)) {
                if b <= a {
                    continue;
                }
                if self
                    .organisms
                    .get(b)
                    .is_some_and(|other| other.bounds().intersects(&bounds))
                {
                    pairs.push((a, b));
                }
            }
        }

        let mut touching = 0;
        for (a, b) in pairs {
            let Some((oa, ob)) = self.organisms.get2_mut(a, b) else {
                continue;
            };
            let contacts = collision::bodies(&mut oa.body, &mut ob.body);
            if contacts.is_empty() {
                continue;
            }
            for &p in &contacts.a {
                oa.mark_touching(p);
            }
            for &p in &contacts.b {
                ob.mark_touching(p);
            }
            oa.refresh();
            ob.refresh();
            touching += 1;
        }
        touching
    }

    /// Remove organisms with non-positive energy. The last attacker, if still
    /// alive, receives a share of what the victim lost to bites.
    fn bury_dead(&mut self, report: &mut TickReport) {
        let dead: Vec<OrganismId> = self
            .organisms
            .iter()
            .filter(|(_, org)| !org.is_alive())
            .map(|(id, _)| id)
            .collect();

        for id in dead {
            let Some(corpse) = self.organisms.despawn(id) else {
                continue;
            };
            self.grid.remove(id);
            report.deaths += 1;

            let share = self.config.energy.death_redistribution
                * (corpse.bite_losses + corpse.energy.value().max(0.0));
            if let Some(attacker) = corpse
                .last_attacker
                .and_then(|a| self.organisms.get_mut(a))
            {
                attacker.energy.gain(share, self.config.energy.max);
            }
            debug!(
                organism = ?id,
                generation = corpse.generation,
                age = corpse.age,
                "organism died"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::Energy;
    use crate::terrain::UniformTerrain;

    fn env(seed: u64) -> Environment {
        Environment::new(SimConfig::default(), seed, Box::new(UniformTerrain(0.5)))
    }

    #[test]
    fn bounds_come_from_world_params() {
        let e = env(1);
        assert_eq!(
            e.bounds(),
            (config::WORLD_MIN_X, config::WORLD_MIN_Y, config::WORLD_MAX_X, config::WORLD_MAX_Y)
        );
    }

    #[test]
    fn every_organism_stays_in_its_own_chunk() {
        let mut e = env(2);
        e.populate(12, &[]);
        for _ in 0..20 {
            e.step();
            assert_eq!(e.grid().len(), e.len());
            for (id, org) in e.organisms().iter() {
                assert_eq!(e.grid().chunk_of(id), Some(e.grid().key_for(org.position())));
            }
        }
    }

    #[test]
    fn same_seed_same_history() {
        let mut a = env(9);
        let mut b = env(9);
        a.populate(8, &[]);
        b.populate(8, &[]);
        for _ in 0..15 {
            assert_eq!(a.step(), b.step());
        }
        assert_eq!(a.views(), b.views());
    }

    #[test]
    fn dead_are_removed_and_attacker_is_credited() {
        let mut e = env(3);
        e.populate(2, &[GenomeKind::Instruction]);
        let ids = e.organisms().ids();
        let (attacker, victim) = (ids[0], ids[1]);

        e.organism_mut(attacker).unwrap().energy = Energy::new(50.0);
        let v = e.organism_mut(victim).unwrap();
        v.energy = Energy::new(-1.0);
        v.bite_losses = 10.0;
        v.last_attacker = Some(attacker);

        let mut report = TickReport::default();
        e.bury_dead(&mut report);
        assert_eq!(report.deaths, 1);
        assert!(e.organism(victim).is_none());
        assert!(!e.grid().contains(victim));
        let expected = 50.0 + config::DEATH_REDISTRIBUTION * 10.0;
        assert!((e.organism(attacker).unwrap().energy.value() - expected).abs() < 1e-9);
    }

    #[test]
    fn overlapping_bodies_touch() {
        let mut e = env(4);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let genome = Genome::random(GenomeKind::Bytes, &mut rng).unwrap();
        let origin = DVec2::new(500.0, 500.0);
        let a = e.spawn(genome.clone(), origin, 100.0, 0).unwrap();
        let b = e.spawn(genome, origin, 100.0, 0).unwrap();
        let head_a = e.organism(a).unwrap().body.points()[0].pos;
        let org_b = e.organism_mut(b).unwrap();
        let head_b = org_b.body.points()[0].pos;
        org_b.body.translate(head_a - head_b);
        org_b.refresh();
        assert!(e.collide() >= 1);
        let touched = |id| {
            let org = e.organism(id).unwrap();
            (0..org.body.points().len()).any(|p| org.touching(p))
        };
        assert!(touched(a));
        assert!(touched(b));
    }
}
