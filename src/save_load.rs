//! Whole-simulation snapshots. Genomes travel as their own genotype bytes; the
//! physical and neural state is stored as-is so a restored run continues exactly.

use std::path::Path;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::arena::{Arena, OrganismId};
use crate::brain::Brain;
use crate::config::SimConfig;
use crate::environment::Environment;
use crate::error::{GenomeError, SnapshotError};
use crate::gene::Gene;
use crate::genome::{Genome, Phenotype};
use crate::organism::Organism;
use crate::physics::Body;
use crate::terrain::Terrain;
use crate::wiring::Wiring;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct OrganismRecord {
    genome: Vec<u8>,
    body: Body,
    brain: Brain,
    wiring: Wiring,
    energy: f64,
    heading: f64,
    generation: u32,
    age: u64,
    last_attacker: Option<OrganismId>,
    bite_losses: f64,
    touching: Vec<usize>,
}

impl OrganismRecord {
    fn capture(org: &Organism) -> Self {
        Self {
            genome: org.genome().serialize(),
            body: org.body.clone(),
            brain: org.brain.clone(),
            wiring: org.wiring().clone(),
            energy: org.energy.value(),
            heading: org.heading,
            generation: org.generation,
            age: org.age,
            last_attacker: org.last_attacker,
            bite_losses: org.bite_losses,
            touching: org.touched_points(),
        }
    }

    /// Rebuild the organism, checking the stored phenotype against what its
    /// genome expresses.
    fn restore(&self, index: usize) -> Result<Organism, SnapshotError> {
        let invalid = |source: GenomeError| SnapshotError::Organism { index, source };
        let mismatch = |part| SnapshotError::Mismatch { index, part };

        let genome = Genome::deserialize(&self.genome).map_err(invalid)?;
        let plan = genome.body().plan().map_err(invalid)?;
        self.body.validate().map_err(|e| invalid(e.into()))?;

        if self.body.points().len() != plan.point_count()
            || self.body.rods().len() != plan.builder.rod_count()
            || self.body.joints().len() != plan.joint_count()
        {
            return Err(mismatch("body"));
        }
        if self.wiring != plan.wiring() {
            return Err(mismatch("wiring"));
        }
        let gene = genome.brain();
        if !self.brain.is_well_formed()
            || self.brain.input_count() != gene.input_count()
            || self.brain.internal_count() != gene.internal_count()
            || self.brain.output_count() != gene.output_count()
        {
            return Err(mismatch("brain"));
        }
        let phenotype = Phenotype {
            body: self.body.clone(),
            wiring: self.wiring.clone(),
            brain: self.brain.clone(),
        };
        let mut org = Organism::new(genome, phenotype, self.energy, self.heading, self.generation);
        org.age = self.age;
        org.last_attacker = self.last_attacker;
        org.bite_losses = self.bite_losses;
        for &p in &self.touching {
            org.mark_touching(p);
        }
        Ok(org)
    }
}

/// Everything needed to resume a run except the terrain, which is supplied again
/// on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    version: u32,
    tick: u64,
    seed: u64,
    config: SimConfig,
    rng: ChaCha8Rng,
    organisms: Arena<OrganismRecord>,
}

impl Snapshot {
    pub fn capture(env: &Environment) -> Self {
        let organisms = env.organisms().map(|_, org| OrganismRecord::capture(org));
        Self {
            version: SNAPSHOT_VERSION,
            tick: env.tick_count(),
            seed: env.seed(),
            config: *env.config(),
            rng: env.rng().clone(),
            organisms,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Seed of the run this snapshot came from; terrain derived from it must be
    /// rebuilt from the same value.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.organisms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organisms.is_empty()
    }

    pub fn restore(&self, terrain: Box<dyn Terrain>) -> Result<Environment, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(self.version));
        }
        let organisms = self
            .organisms
            .try_map(|id, record| record.restore(id.index as usize))?;
        Ok(Environment::from_parts(
            self.config,
            self.seed,
            self.tick,
            self.rng.clone(),
            organisms,
            terrain,
        ))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = bincode::deserialize(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }
        Ok(snapshot)
    }
}

pub fn save_to_file(env: &Environment, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
    let bytes = Snapshot::capture(env).to_bytes()?;
    std::fs::write(path.as_ref(), bytes)?;
    info!(path = %path.as_ref().display(), tick = env.tick_count(), organisms = env.len(), "snapshot saved");
    Ok(())
}

pub fn read_snapshot(path: impl AsRef<Path>) -> Result<Snapshot, SnapshotError> {
    let bytes = std::fs::read(path.as_ref())?;
    Snapshot::from_bytes(&bytes)
}

pub fn load_from_file(
    path: impl AsRef<Path>,
    terrain: Box<dyn Terrain>,
) -> Result<Environment, SnapshotError> {
    let env = read_snapshot(path.as_ref())?.restore(terrain)?;
    info!(path = %path.as_ref().display(), tick = env.tick_count(), organisms = env.len(), "snapshot loaded");
    Ok(env)
}
