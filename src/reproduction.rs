use std::f64::consts::TAU;

use glam::DVec2;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::arena::{Arena, OrganismId};
use crate::config::{self, SimConfig};
use crate::environment::{spawn_organism, TickReport};
use crate::gene::{Gene, SexualGene};
use crate::genome::Genome;
use crate::grid::Grid;
use crate::organism::Organism;

/// Pending birth record, collected before anything is spawned.
struct Birth {
    parent: OrganismId,
    genome: Genome,
    origin: DVec2,
    generation: u32,
    sexual: bool,
}

enum MateSearch {
    Found(OrganismId),
    /// Neighbours exist but none is compatible.
    Incompatible,
    Alone,
}

/// Nearest live neighbour within the mate radius with a compatible genome.
/// This is the only compatibility check a pairing goes through.
fn find_mate(
    organisms: &Arena<Organism>,
    grid: &Grid<OrganismId>,
    id: OrganismId,
    radius: f64,
) -> MateSearch {
    let Some(parent) = organisms.get(id) else {
        return MateSearch::Alone;
    };
    let pos = parent.position();
    let mut candidates: Vec<(f64, OrganismId)> = grid
        .entities_in_disk(pos, radius, |other| organisms.get(other).map(Organism::position))
        .into_iter()
        .filter(|&other| other != id)
        .filter_map(|other| {
            organisms
                .get(other)
                .filter(|m| m.is_alive())
                .map(|m| (m.position().distance_squared(pos), other))
        })
        .collect();
    if candidates.is_empty() {
        return MateSearch::Alone;
    }
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    candidates
        .into_iter()
        .find(|(_, other)| {
            organisms
                .get(*other)
                .is_some_and(|m| parent.genome().is_compatible(m.genome()))
        })
        .map(|(_, other)| MateSearch::Found(other))
        .unwrap_or(MateSearch::Incompatible)
}

fn plan_births(
    organisms: &Arena<Organism>,
    grid: &Grid<OrganismId>,
    config: &SimConfig,
    rng: &mut ChaCha8Rng,
    report: &mut TickReport,
) -> Vec<Birth> {
    let mut births = Vec::new();

    for (id, parent) in organisms.iter() {
        if organisms.len() + births.len() >= config.world.max_population {
            break;
        }
        if !parent.is_alive() || parent.energy.value() <= config.energy.reproduction_threshold {
            continue;
        }

        let mate = match find_mate(organisms, grid, id, config.world.mate_radius) {
            MateSearch::Found(mate) => organisms.get(mate).map(|m| (mate, m)),
            MateSearch::Incompatible => {
                report.incompatible_pairings += 1;
                report.asexual_fallbacks += 1;
                debug!(organism = ?id, "no compatible mate nearby");
                None
            }
            MateSearch::Alone => None,
        };

        let (genome, generation, sexual) = match mate {
            Some((mate_id, mate)) => {
                debug!(organism = ?id, mate = ?mate_id, "pairing");
                let child = parent.genome().recombine_default(mate.genome(), rng);
                (
                    child.mutate(rng),
                    parent.generation.max(mate.generation) + 1,
                    true,
                )
            }
            None => (parent.genome().mutate(rng), parent.generation + 1, false),
        };

        let angle = rng.gen_range(0.0..TAU);
        let origin =
            parent.position() + DVec2::from_angle(angle) * parent.radius() * config::OFFSPRING_SPACING;
        births.push(Birth {
            parent: id,
            genome,
            origin,
            generation,
            sexual,
        });
    }

    births
}

/// Let every organism above the reproduction threshold produce one child.
/// Parents pay only for children that were actually built.
pub fn check_and_spawn(
    organisms: &mut Arena<Organism>,
    grid: &mut Grid<OrganismId>,
    config: &SimConfig,
    rng: &mut ChaCha8Rng,
    report: &mut TickReport,
) -> Vec<OrganismId> {
    let births = plan_births(organisms, grid, config, rng, report);
    spawn_births(births, organisms, grid, config, rng, report)
}

fn spawn_births(
    births: Vec<Birth>,
    organisms: &mut Arena<Organism>,
    grid: &mut Grid<OrganismId>,
    config: &SimConfig,
    rng: &mut ChaCha8Rng,
    report: &mut TickReport,
) -> Vec<OrganismId> {
    let bounds = config.world.bounds();
    let mut born = Vec::with_capacity(births.len());

    for birth in births {
        let origin = birth.origin.clamp(bounds.min, bounds.max);
        match spawn_organism(
            organisms,
            grid,
            rng,
            birth.genome,
            origin,
            config.energy.offspring_energy,
            birth.generation,
        ) {
            Ok(child) => {
                if let Some(parent) = organisms.get_mut(birth.parent) {
                    parent.energy.use_energy(config.energy.reproduction_cost);
                }
                report.births += 1;
                if birth.sexual {
                    report.sexual_births += 1;
                }
                debug!(parent = ?birth.parent, ?child, generation = birth.generation, "organism born");
                born.push(child);
            }
            Err(e) => {
                report.construction_failures += 1;
                warn!(parent = ?birth.parent, error = %e, "offspring failed to build");
            }
        }
    }

    born
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::BrainGene;
    use crate::energy::Energy;
    use crate::genome::{BodyGenome, GenomeKind, GraphGenome};
    use rand::SeedableRng;

    struct World {
        organisms: Arena<Organism>,
        grid: Grid<OrganismId>,
        rng: ChaCha8Rng,
        config: SimConfig,
    }

    impl World {
        fn new(seed: u64) -> Self {
            let config = SimConfig::default();
            Self {
                organisms: Arena::new(),
                grid: Grid::new(config.world.chunk_size),
                rng: ChaCha8Rng::seed_from_u64(seed),
                config,
            }
        }

        fn add(&mut self, genome: Genome, at: DVec2, energy: f64) -> OrganismId {
            spawn_organism(
                &mut self.organisms,
                &mut self.grid,
                &mut self.rng,
                genome,
                at,
                energy,
                0,
            )
            .unwrap()
        }

        fn run(&mut self) -> (Vec<OrganismId>, TickReport) {
            let mut report = TickReport::default();
            let born = check_and_spawn(
                &mut self.organisms,
                &mut self.grid,
                &self.config,
                &mut self.rng,
                &mut report,
            );
            (born, report)
        }
    }

    #[test]
    fn reproduction_requires_energy_threshold() {
        let mut w = World::new(5);
        let genome = Genome::random(GenomeKind::Instruction, &mut w.rng).unwrap();
        w.add(genome, DVec2::new(300.0, 300.0), config::REPRODUCTION_THRESHOLD - 1.0);

        let (born, report) = w.run();
        assert!(born.is_empty());
        assert_eq!(report, TickReport::default());
        assert_eq!(w.organisms.len(), 1);
    }

    #[test]
    fn lone_parent_reproduces_asexually_and_pays() {
        let mut w = World::new(9);
        let genome = Genome::random(GenomeKind::Bytes, &mut w.rng).unwrap();
        let energy = config::REPRODUCTION_THRESHOLD + 30.0;
        let parent = w.add(genome, DVec2::new(400.0, 400.0), energy);

        let (born, report) = w.run();
        assert_eq!(born.len(), 1);
        assert_eq!(report.births, 1);
        assert_eq!(report.sexual_births, 0);
        assert_eq!(report.asexual_fallbacks, 0);

        let p = w.organisms.get(parent).unwrap();
        assert!((p.energy.value() - (energy - config::REPRODUCTION_COST)).abs() < 1e-9);
        let child = w.organisms.get(born[0]).unwrap();
        assert_eq!(child.generation, 1);
        assert_eq!(child.energy, Energy::new(config::OFFSPRING_ENERGY));
        assert!(w.grid.contains(born[0]));
    }

    #[test]
    fn compatible_neighbours_mate() {
        let mut w = World::new(11);
        let genome = Genome::random(GenomeKind::Instruction, &mut w.rng).unwrap();
        let energy = config::REPRODUCTION_THRESHOLD + 10.0;
        w.add(genome.clone(), DVec2::new(500.0, 500.0), energy);
        w.add(genome, DVec2::new(520.0, 500.0), energy);

        let (_, report) = w.run();
        assert_eq!(report.incompatible_pairings, 0);
        assert_eq!(report.births + report.construction_failures, 2);
        assert_eq!(report.sexual_births, report.births);
    }

    #[test]
    fn incompatible_neighbours_fall_back_to_asexual() {
        let mut w = World::new(13);
        let a = Genome::random(GenomeKind::Instruction, &mut w.rng).unwrap();
        let b = Genome::random(GenomeKind::Bytes, &mut w.rng).unwrap();
        let energy = config::REPRODUCTION_THRESHOLD + 10.0;
        w.add(a, DVec2::new(500.0, 500.0), energy);
        w.add(b, DVec2::new(520.0, 500.0), energy);

        let (_, report) = w.run();
        assert_eq!(report.sexual_births, 0);
        assert_eq!(report.incompatible_pairings, 2);
        assert_eq!(report.asexual_fallbacks, 2);
        assert_eq!(report.births + report.construction_failures, 2);
    }

    #[test]
    fn nearest_compatible_neighbour_is_chosen_over_a_closer_stranger() {
        let mut w = World::new(19);
        let genome = Genome::random(GenomeKind::Instruction, &mut w.rng).unwrap();
        let stranger = Genome::random(GenomeKind::Graph, &mut w.rng).unwrap();
        let parent = w.add(genome.clone(), DVec2::new(500.0, 500.0), 100.0);
        w.add(stranger, DVec2::new(510.0, 500.0), 100.0);
        let kin = w.add(genome, DVec2::new(560.0, 500.0), 100.0);

        let radius = w.config.world.mate_radius;
        assert!(matches!(
            find_mate(&w.organisms, &w.grid, parent, radius),
            MateSearch::Found(mate) if mate == kin
        ));
    }

    #[test]
    fn failed_sexual_child_is_not_counted_as_a_birth() {
        let mut w = World::new(23);
        let genome = Genome::random(GenomeKind::Bytes, &mut w.rng).unwrap();
        let energy = config::REPRODUCTION_THRESHOLD + 10.0;
        let parent = w.add(genome, DVec2::new(300.0, 300.0), energy);
        let unbuildable = Genome::new(
            BodyGenome::Graph(GraphGenome::new(config::COMPATIBILITY_THRESHOLD, vec![], vec![])),
            BrainGene::random(0, 0, &mut w.rng),
        );
        let births = vec![Birth {
            parent,
            genome: unbuildable,
            origin: DVec2::new(320.0, 300.0),
            generation: 1,
            sexual: true,
        }];

        let mut report = TickReport::default();
        let born = spawn_births(
            births,
            &mut w.organisms,
            &mut w.grid,
            &w.config,
            &mut w.rng,
            &mut report,
        );
        assert!(born.is_empty());
        assert_eq!(report.construction_failures, 1);
        assert_eq!(report.births, 0);
        assert_eq!(report.sexual_births, 0);
        let p = w.organisms.get(parent).unwrap();
        assert_eq!(p.energy, Energy::new(energy));
    }

    #[test]
    fn population_cap_limits_births() {
        let mut w = World::new(17);
        w.config.world.max_population = 2;
        let energy = config::REPRODUCTION_THRESHOLD + 10.0;
        for i in 0..2 {
            let genome = Genome::random(GenomeKind::Bytes, &mut w.rng).unwrap();
            w.add(genome, DVec2::new(200.0 + 600.0 * i as f64, 200.0), energy);
        }
        let (born, _) = w.run();
        assert!(born.is_empty());
    }
}
