//! Raw byte genome: fixed 6-byte groups decoded into assembler instructions.

use std::f32::consts::{PI, TAU};

use rand::Rng;

use super::assembler::assemble;
use super::instruction::{Instruction, Op, NEW_POINT};
use super::BodyPlan;
use crate::codec::{ByteReader, ByteWriter};
use crate::config;
use crate::error::GenomeError;
use crate::gene::{block_cross, edit_distance, BuildContext, Gene, MutationRates, SexualGene};

pub const GROUP_LEN: usize = 6;

pub const RATE_FLIP: &str = "flip";
pub const RATE_INSERT: &str = "insert";
pub const RATE_DELETE: &str = "delete";
pub const RATE_THRESHOLD: &str = "threshold";

/// Step targets at or above this byte value grow a new point.
const NEW_POINT_FROM: u8 = 32;

/// Decode one group: `[opcode, limit, a, b, c, d]`.
fn decode_group(id: u32, g: &[u8]) -> Instruction {
    let unit = |b: u8| f32::from(b) / 255.0;
    let limit = u32::from(g[1] % 4) + 1;
    let op = match g[0] % 6 {
        0 => {
            let min_len = 4.0 + unit(g[3]) * 16.0;
            Op::Step {
                target: if g[2] >= NEW_POINT_FROM {
                    NEW_POINT
                } else {
                    u32::from(g[2])
                },
                min_len,
                max_len: min_len + unit(g[4]) * 12.0,
            }
        }
        1 => Op::Goto {
            target: u32::from(u16::from_be_bytes([g[2], g[3]])),
        },
        2 => {
            let min_angle = unit(g[3]) * TAU;
            Op::Joint {
                min_angle,
                max_angle: min_angle + unit(g[4]) * PI,
            }
        }
        3 => Op::Muscle {
            strength: f32::from(g[3] as i8) / 127.0,
        },
        4 => Op::Point {
            mass: 0.5 + unit(g[3]) * 2.5,
        },
        _ => Op::Return {
            point: u32::from(g[2] % NEW_POINT_FROM),
        },
    };
    Instruction { id, limit, op }
}

/// Trailing bytes that do not fill a group are ignored.
pub fn decode(bytes: &[u8]) -> Vec<Instruction> {
    bytes
        .chunks_exact(GROUP_LEN)
        .enumerate()
        .map(|(i, g)| decode_group(i as u32, g))
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct ByteGenome {
    rates: MutationRates,
    threshold: u32,
    bytes: Vec<u8>,
}

impl ByteGenome {
    pub fn default_rates() -> MutationRates {
        MutationRates::with(&[
            (RATE_FLIP, 0.3),
            (RATE_INSERT, config::DEFAULT_MUTATION_RATE),
            (RATE_DELETE, config::DEFAULT_MUTATION_RATE),
            (RATE_THRESHOLD, config::DEFAULT_MUTATION_RATE),
        ])
    }

    pub fn new(threshold: u32, bytes: Vec<u8>) -> Self {
        Self {
            rates: Self::default_rates(),
            threshold,
            bytes,
        }
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        let groups = rng.gen_range(4..10);
        let mut bytes = vec![0u8; groups * GROUP_LEN];
        rng.fill(bytes.as_mut_slice());
        // Start by growing so every random body has at least one rod.
        bytes[0] = 0;
        bytes[2] = u8::MAX;
        Self::new(config::COMPATIBILITY_THRESHOLD, bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn plan(&self) -> BodyPlan {
        assemble(&decode(&self.bytes))
    }
}

impl Gene for ByteGenome {
    type Output = BodyPlan;

    fn rates(&self) -> &MutationRates {
        &self.rates
    }

    fn rates_mut(&mut self) -> &mut MutationRates {
        &mut self.rates
    }

    fn mutate_structure(&mut self, rng: &mut impl Rng) {
        for _ in 0..self.rates.trials(RATE_FLIP, rng) {
            if self.bytes.is_empty() {
                break;
            }
            let i = rng.gen_range(0..self.bytes.len());
            self.bytes[i] = rng.gen();
        }

        for _ in 0..self.rates.trials(RATE_INSERT, rng) {
            if self.bytes.len() / GROUP_LEN >= config::MAX_ASSEMBLY_STEPS {
                break;
            }
            let at = rng.gen_range(0..=self.bytes.len() / GROUP_LEN) * GROUP_LEN;
            let mut group = [0u8; GROUP_LEN];
            rng.fill(&mut group);
            self.bytes.splice(at..at, group);
        }

        for _ in 0..self.rates.trials(RATE_DELETE, rng) {
            let groups = self.bytes.len() / GROUP_LEN;
            if groups <= 1 {
                break;
            }
            let at = rng.gen_range(0..groups) * GROUP_LEN;
            self.bytes.drain(at..at + GROUP_LEN);
        }

        if self.rates.roll(RATE_THRESHOLD, rng) {
            let step = rng.gen_range(1..=4);
            self.threshold = if rng.gen_bool(0.5) {
                self.threshold.saturating_add(step)
            } else {
                self.threshold.saturating_sub(step)
            };
        }
    }

    fn create<R: Rng>(&self, _ctx: &mut BuildContext<'_, R>) -> Result<BodyPlan, GenomeError> {
        Ok(self.plan())
    }

    fn serialize(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.rates.write(&mut w);
        w.i32(self.threshold as i32);
        w.bytes(&self.bytes);
        w.into_bytes()
    }

    fn deserialize(bytes: &[u8]) -> Result<Self, GenomeError> {
        let mut r = ByteReader::new(bytes);
        let rates = MutationRates::read(&mut r)?;
        let threshold = r.len()? as u32;
        let bytes = r.bytes()?;
        r.finish()?;
        Ok(Self {
            rates,
            threshold,
            bytes,
        })
    }
}

impl SexualGene for ByteGenome {
    fn compatibility_threshold(&self) -> u32 {
        self.threshold
    }

    fn distance(&self, other: &Self) -> u32 {
        edit_distance(&self.bytes, &other.bytes)
    }

    fn recombine(&self, other: &Self, min_block: usize, max_block: usize, rng: &mut impl Rng) -> Self {
        Self {
            rates: self.rates.blend(&other.rates),
            threshold: if rng.gen_bool(0.5) {
                self.threshold
            } else {
                other.threshold
            },
            bytes: block_cross(&self.bytes, &other.bytes, min_block, max_block, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn groups_decode_to_instructions() {
        let bytes = [0, 0, 200, 0, 0, 0, 3, 1, 0, 127, 0, 0, 9, 9];
        let decoded = decode(&bytes);
        assert_eq!(decoded.len(), 2);
        assert_eq!(
            decoded[0].op,
            Op::Step {
                target: NEW_POINT,
                min_len: 4.0,
                max_len: 4.0
            }
        );
        assert_eq!(decoded[1].op, Op::Muscle { strength: 1.0 });
        assert_eq!(decoded[1].limit, 2);
        assert_eq!(decoded[1].id, 1);
    }

    #[test]
    fn random_genomes_express_a_rod() {
        let mut rng = ChaCha8Rng::seed_from_u64(77);
        for _ in 0..20 {
            let plan = ByteGenome::random(&mut rng).plan();
            assert!(plan.point_count() >= 2);
            assert!(plan.builder.build().is_ok());
        }
    }

    #[test]
    fn serialization_round_trips() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let genome = ByteGenome::random(&mut rng).mutate(&mut rng);
        assert_eq!(ByteGenome::deserialize(&genome.serialize()).unwrap(), genome);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut bytes = ByteGenome::new(4, vec![1, 2, 3]).serialize();
        bytes.push(0);
        assert_eq!(ByteGenome::deserialize(&bytes), Err(GenomeError::TrailingBytes(1)));
    }

    #[test]
    fn cross_is_closed_on_incompatible_parents() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let a = ByteGenome::new(3, vec![0; 12]);
        let b = ByteGenome::new(40, vec![1; 12]);
        assert_eq!(a.distance(&b), 12);
        assert!(a.cross(&b, 1, 4, &mut rng).is_err());

        let near = ByteGenome::new(40, {
            let mut v = vec![0; 12];
            v[5] = 9;
            v
        });
        assert!(a.cross(&near, 1, 4, &mut rng).is_ok());
    }

    #[test]
    fn mutation_keeps_whole_groups() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let mut genome = ByteGenome::random(&mut rng);
        genome.rates_mut().set(RATE_INSERT, 0.9);
        genome.rates_mut().set(RATE_DELETE, 0.9);
        for _ in 0..20 {
            genome = genome.mutate(&mut rng);
            assert_eq!(genome.bytes().len() % GROUP_LEN, 0);
        }
    }
}
