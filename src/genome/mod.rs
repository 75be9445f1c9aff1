//! Organism genomes: one of three body encodings plus a brain gene.

pub mod assembler;
pub mod bytes;
pub mod graph;
pub mod instruction;

use std::f64::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::brain::{Brain, BrainGene};
use crate::codec::{ByteReader, ByteWriter};
use crate::config;
use crate::error::GenomeError;
use crate::gene::{BuildContext, Gene, MutationRates, SexualGene};
use crate::physics::{Body, BodyBuilder, StructureRef};
use crate::wiring::Wiring;

pub use bytes::ByteGenome;
pub use graph::GraphGenome;
pub use instruction::InstructionGenome;

pub const RATE_BODY: &str = "body";
pub const RATE_BRAIN: &str = "brain";

/// Brain output bound to a rod or joint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MuscleSpec {
    pub target: StructureRef,
    pub strength: f64,
}

/// An expressed but not yet validated body laid out around the origin.
#[derive(Clone, Debug)]
pub struct BodyPlan {
    pub builder: BodyBuilder,
    pub muscles: Vec<MuscleSpec>,
}

impl BodyPlan {
    pub fn point_count(&self) -> usize {
        self.builder.point_count()
    }

    pub fn joint_count(&self) -> usize {
        self.builder.joint_count()
    }

    pub fn wiring(&self) -> Wiring {
        Wiring::new(self.joint_count(), &self.muscles)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenomeKind {
    Graph,
    Instruction,
    Bytes,
}

impl GenomeKind {
    pub const ALL: [GenomeKind; 3] = [GenomeKind::Graph, GenomeKind::Instruction, GenomeKind::Bytes];

    fn tag(self) -> u8 {
        match self {
            GenomeKind::Graph => 0,
            GenomeKind::Instruction => 1,
            GenomeKind::Bytes => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, GenomeError> {
        match tag {
            0 => Ok(GenomeKind::Graph),
            1 => Ok(GenomeKind::Instruction),
            2 => Ok(GenomeKind::Bytes),
            other => Err(GenomeError::UnknownKind(other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BodyGenome {
    Graph(GraphGenome),
    Instruction(InstructionGenome),
    Bytes(ByteGenome),
}

impl BodyGenome {
    pub fn random(kind: GenomeKind, rng: &mut impl Rng) -> Self {
        match kind {
            GenomeKind::Graph => BodyGenome::Graph(GraphGenome::random(rng)),
            GenomeKind::Instruction => BodyGenome::Instruction(InstructionGenome::random(rng)),
            GenomeKind::Bytes => BodyGenome::Bytes(ByteGenome::random(rng)),
        }
    }

    pub fn kind(&self) -> GenomeKind {
        match self {
            BodyGenome::Graph(_) => GenomeKind::Graph,
            BodyGenome::Instruction(_) => GenomeKind::Instruction,
            BodyGenome::Bytes(_) => GenomeKind::Bytes,
        }
    }

    pub fn plan(&self) -> Result<BodyPlan, GenomeError> {
        match self {
            BodyGenome::Graph(g) => g.plan(),
            BodyGenome::Instruction(g) => Ok(g.plan()),
            BodyGenome::Bytes(g) => Ok(g.plan()),
        }
    }

    pub fn mutate(&self, rng: &mut impl Rng) -> Self {
        match self {
            BodyGenome::Graph(g) => BodyGenome::Graph(g.mutate(rng)),
            BodyGenome::Instruction(g) => BodyGenome::Instruction(g.mutate(rng)),
            BodyGenome::Bytes(g) => BodyGenome::Bytes(g.mutate(rng)),
        }
    }

    pub fn threshold(&self) -> u32 {
        match self {
            BodyGenome::Graph(g) => g.compatibility_threshold(),
            BodyGenome::Instruction(g) => g.compatibility_threshold(),
            BodyGenome::Bytes(g) => g.compatibility_threshold(),
        }
    }

    /// `None` across kinds: different encodings are never comparable.
    pub fn distance(&self, other: &Self) -> Option<u32> {
        match (self, other) {
            (BodyGenome::Graph(a), BodyGenome::Graph(b)) => Some(a.distance(b)),
            (BodyGenome::Instruction(a), BodyGenome::Instruction(b)) => Some(a.distance(b)),
            (BodyGenome::Bytes(a), BodyGenome::Bytes(b)) => Some(a.distance(b)),
            _ => None,
        }
    }

    fn recombine(&self, other: &Self, min_block: usize, max_block: usize, rng: &mut impl Rng) -> Self {
        match (self, other) {
            (BodyGenome::Graph(a), BodyGenome::Graph(b)) => {
                BodyGenome::Graph(a.recombine(b, min_block, max_block, rng))
            }
            (BodyGenome::Instruction(a), BodyGenome::Instruction(b)) => {
                BodyGenome::Instruction(a.recombine(b, min_block, max_block, rng))
            }
            (BodyGenome::Bytes(a), BodyGenome::Bytes(b)) => {
                BodyGenome::Bytes(a.recombine(b, min_block, max_block, rng))
            }
            _ => self.clone(),
        }
    }

    fn serialize(&self) -> Vec<u8> {
        match self {
            BodyGenome::Graph(g) => g.serialize(),
            BodyGenome::Instruction(g) => g.serialize(),
            BodyGenome::Bytes(g) => g.serialize(),
        }
    }

    fn deserialize(kind: GenomeKind, bytes: &[u8]) -> Result<Self, GenomeError> {
        Ok(match kind {
            GenomeKind::Graph => BodyGenome::Graph(GraphGenome::deserialize(bytes)?),
            GenomeKind::Instruction => BodyGenome::Instruction(InstructionGenome::deserialize(bytes)?),
            GenomeKind::Bytes => BodyGenome::Bytes(ByteGenome::deserialize(bytes)?),
        })
    }
}

/// What a genome expresses into.
#[derive(Clone, Debug)]
pub struct Phenotype {
    pub body: Body,
    pub wiring: Wiring,
    pub brain: Brain,
}

/// Full organism genome. The brain gene is kept sized to the body's senses
/// and actuators.
#[derive(Clone, Debug, PartialEq)]
pub struct Genome {
    rates: MutationRates,
    body: BodyGenome,
    brain: BrainGene,
}

impl Genome {
    pub fn default_rates() -> MutationRates {
        MutationRates::with(&[(RATE_BODY, 0.8), (RATE_BRAIN, 0.8)])
    }

    pub fn new(body: BodyGenome, brain: BrainGene) -> Self {
        Self {
            rates: Self::default_rates(),
            body,
            brain,
        }
    }

    /// Random body of `kind` with a freshly sized random brain.
    pub fn random(kind: GenomeKind, rng: &mut impl Rng) -> Result<Self, GenomeError> {
        let body = BodyGenome::random(kind, rng);
        let wiring = body.plan()?.wiring();
        let brain = BrainGene::random(wiring.input_count(), wiring.output_count(), rng);
        Ok(Self::new(body, brain))
    }

    pub fn kind(&self) -> GenomeKind {
        self.body.kind()
    }

    pub fn body(&self) -> &BodyGenome {
        &self.body
    }

    pub fn brain(&self) -> &BrainGene {
        &self.brain
    }

    /// Resize the brain to the current body. Bodies that fail to express keep
    /// their brain; construction will reject them anyway.
    fn fit_brain(&mut self, rng: &mut impl Rng) {
        if let Ok(plan) = self.body.plan() {
            let wiring = plan.wiring();
            self.brain = self
                .brain
                .with_io(wiring.input_count(), wiring.output_count(), rng);
        }
    }
}

impl Gene for Genome {
    type Output = Phenotype;

    fn rates(&self) -> &MutationRates {
        &self.rates
    }

    fn rates_mut(&mut self) -> &mut MutationRates {
        &mut self.rates
    }

    fn mutate_structure(&mut self, rng: &mut impl Rng) {
        if self.rates.roll(RATE_BODY, rng) {
            self.body = self.body.mutate(rng);
            self.fit_brain(rng);
        }
        if self.rates.roll(RATE_BRAIN, rng) {
            self.brain = self.brain.mutate(rng);
        }
    }

    /// Express the body centred on `ctx.origin` with a random orientation.
    fn create<R: Rng>(&self, ctx: &mut BuildContext<'_, R>) -> Result<Phenotype, GenomeError> {
        let plan = self.body.plan()?;
        let wiring = plan.wiring();
        let mut body = plan.builder.build()?;

        let centroid = body.centroid();
        body.rotate_about(centroid, ctx.rng.gen_range(0.0..TAU));
        body.translate(ctx.origin - centroid);

        let brain = self.brain.create(ctx)?;
        if brain.input_count() != wiring.input_count() || brain.output_count() != wiring.output_count() {
            warn!(
                inputs = brain.input_count(),
                senses = wiring.input_count(),
                outputs = brain.output_count(),
                actuators = wiring.output_count(),
                "brain shape does not match body wiring"
            );
        }
        Ok(Phenotype { body, wiring, brain })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.rates.write(&mut w);
        w.u8(self.kind().tag());
        w.bytes(&self.body.serialize());
        w.bytes(&self.brain.serialize());
        w.into_bytes()
    }

    fn deserialize(bytes: &[u8]) -> Result<Self, GenomeError> {
        let mut r = ByteReader::new(bytes);
        let rates = MutationRates::read(&mut r)?;
        let kind = GenomeKind::from_tag(r.u8()?)?;
        let body = BodyGenome::deserialize(kind, &r.bytes()?)?;
        let brain = BrainGene::deserialize(&r.bytes()?)?;
        r.finish()?;
        Ok(Self { rates, body, brain })
    }
}

impl SexualGene for Genome {
    fn compatibility_threshold(&self) -> u32 {
        self.body.threshold()
    }

    fn distance(&self, other: &Self) -> u32 {
        self.body.distance(&other.body).unwrap_or(u32::MAX)
    }

    fn recombine(&self, other: &Self, min_block: usize, max_block: usize, rng: &mut impl Rng) -> Self {
        let mut child = Self {
            rates: self.rates.blend(&other.rates),
            body: self.body.recombine(&other.body, min_block, max_block, rng),
            brain: self.brain.recombine(&other.brain, min_block, max_block, rng),
        };
        child.fit_brain(rng);
        child
    }
}

impl Genome {
    /// Recombine with the default block range. The caller has already checked
    /// compatibility; use [`SexualGene::cross`] otherwise.
    pub(crate) fn recombine_default(&self, mate: &Self, rng: &mut impl Rng) -> Self {
        self.recombine(mate, config::CROSS_MIN_BLOCK, config::CROSS_MAX_BLOCK, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn every_kind_expresses_a_matching_brain() {
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        for kind in GenomeKind::ALL {
            let genome = Genome::random(kind, &mut rng).unwrap();
            let origin = DVec2::new(300.0, 400.0);
            let mut ctx = BuildContext::new(origin, &mut rng);
            let phenotype = genome.create(&mut ctx).unwrap();
            assert_eq!(phenotype.brain.input_count(), phenotype.wiring.input_count());
            assert_eq!(phenotype.brain.output_count(), phenotype.wiring.output_count());
            assert!(phenotype.body.centroid().distance(origin) < 1e-6);
        }
    }

    #[test]
    fn mutated_genomes_stay_wired() {
        let mut rng = ChaCha8Rng::seed_from_u64(37);
        for kind in GenomeKind::ALL {
            let mut genome = Genome::random(kind, &mut rng).unwrap();
            for _ in 0..15 {
                genome = genome.mutate(&mut rng);
                if let Ok(plan) = genome.body().plan() {
                    let wiring = plan.wiring();
                    assert_eq!(genome.brain().input_count(), wiring.input_count());
                    assert_eq!(genome.brain().output_count(), wiring.output_count());
                }
            }
        }
    }

    #[test]
    fn mutate_leaves_expression_unchanged() {
        let mut rng = ChaCha8Rng::seed_from_u64(41);
        let genome = Genome::random(GenomeKind::Graph, &mut rng).unwrap();
        let before = genome.body().plan().unwrap();
        let _child = genome.mutate(&mut rng);
        let after = genome.body().plan().unwrap();
        assert_eq!(before.point_count(), after.point_count());
        assert_eq!(before.muscles, after.muscles);
    }

    #[test]
    fn genome_bytes_round_trip_for_all_kinds() {
        let mut rng = ChaCha8Rng::seed_from_u64(43);
        for kind in GenomeKind::ALL {
            let genome = Genome::random(kind, &mut rng).unwrap().mutate(&mut rng);
            assert_eq!(Genome::deserialize(&genome.serialize()).unwrap(), genome);
        }
    }

    #[test]
    fn unknown_kind_tag_is_rejected() {
        let mut w = ByteWriter::new();
        MutationRates::new().write(&mut w);
        w.u8(9);
        assert_eq!(Genome::deserialize(&w.into_bytes()), Err(GenomeError::UnknownKind(9)));
    }

    #[test]
    fn different_kinds_never_cross() {
        let mut rng = ChaCha8Rng::seed_from_u64(47);
        let a = Genome::random(GenomeKind::Graph, &mut rng).unwrap();
        let b = Genome::random(GenomeKind::Bytes, &mut rng).unwrap();
        assert!(!a.is_compatible(&b));
        let (lo, hi) = (config::CROSS_MIN_BLOCK, config::CROSS_MAX_BLOCK);
        assert!(a.cross(&b, lo, hi, &mut rng).is_err());
        assert!(a.cross(&a.clone(), lo, hi, &mut rng).is_ok());
    }
}
