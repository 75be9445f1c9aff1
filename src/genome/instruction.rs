//! Text-encoded instruction genome.
//!
//! Grammar: `<threshold>#<instr>.<instr>...` where each instruction is one opcode
//! character followed by 8-digit hex fields: id, execution limit, then the
//! opcode's operands. Float operands are written as their `f32` bit patterns.

use std::f32::consts::{PI, TAU};

use rand::Rng;

use super::assembler::assemble;
use super::BodyPlan;
use crate::codec::{ByteReader, ByteWriter};
use crate::config;
use crate::error::GenomeError;
use crate::gene::{block_cross, edit_distance, BuildContext, Gene, MutationRates, SexualGene};

/// `Step` target meaning "grow a new point".
pub const NEW_POINT: u32 = u32::MAX;

pub const RATE_INSERT: &str = "insert";
pub const RATE_DELETE: &str = "delete";
pub const RATE_MODIFY: &str = "modify";
pub const RATE_DUPLICATE: &str = "duplicate";
pub const RATE_THRESHOLD: &str = "threshold";

const HEX_WIDTH: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Op {
    /// Rod from the cursor to `target`, or to a new point when `target` is not an
    /// existing point. The cursor follows a new point.
    Step { target: u32, min_len: f32, max_len: f32 },
    /// Continue at the instruction whose id is `target`.
    Goto { target: u32 },
    /// Angular band for the joint at the cursor; also sets the growth heading.
    Joint { min_angle: f32, max_angle: f32 },
    /// Drive the most recently created rod or joint.
    Muscle { strength: f32 },
    /// Set the cursor point's mass.
    Point { mass: f32 },
    /// Move the cursor to an existing point.
    Return { point: u32 },
}

impl Op {
    pub fn code(&self) -> char {
        match self {
            Op::Step { .. } => 'S',
            Op::Goto { .. } => 'G',
            Op::Joint { .. } => 'J',
            Op::Muscle { .. } => 'M',
            Op::Point { .. } => 'P',
            Op::Return { .. } => 'R',
        }
    }

    fn arity(code: char) -> Option<usize> {
        match code {
            'S' => Some(3),
            'J' => Some(2),
            'G' | 'M' | 'P' | 'R' => Some(1),
            _ => None,
        }
    }

    fn words(&self) -> Vec<u32> {
        match *self {
            Op::Step {
                target,
                min_len,
                max_len,
            } => vec![target, min_len.to_bits(), max_len.to_bits()],
            Op::Goto { target } => vec![target],
            Op::Joint {
                min_angle,
                max_angle,
            } => vec![min_angle.to_bits(), max_angle.to_bits()],
            Op::Muscle { strength } => vec![strength.to_bits()],
            Op::Point { mass } => vec![mass.to_bits()],
            Op::Return { point } => vec![point],
        }
    }

    fn from_words(code: char, w: &[u32]) -> Option<Self> {
        let op = match (code, w) {
            ('S', [target, min, max]) => Op::Step {
                target: *target,
                min_len: f32::from_bits(*min),
                max_len: f32::from_bits(*max),
            },
            ('G', [target]) => Op::Goto { target: *target },
            ('J', [min, max]) => Op::Joint {
                min_angle: f32::from_bits(*min),
                max_angle: f32::from_bits(*max),
            },
            ('M', [s]) => Op::Muscle {
                strength: f32::from_bits(*s),
            },
            ('P', [m]) => Op::Point {
                mass: f32::from_bits(*m),
            },
            ('R', [p]) => Op::Return { point: *p },
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instruction {
    pub id: u32,
    /// How many times this instruction may execute during one assembly.
    pub limit: u32,
    pub op: Op,
}

impl Instruction {
    pub fn to_text(&self) -> String {
        let mut s = String::with_capacity(1 + HEX_WIDTH * 5);
        s.push(self.op.code());
        for word in [self.id, self.limit].into_iter().chain(self.op.words()) {
            s.push_str(&format!("{word:08X}"));
        }
        s
    }

    pub fn parse(index: usize, text: &str) -> Result<Self, GenomeError> {
        let mut chars = text.chars();
        let code = chars.next().ok_or(GenomeError::FieldWidth {
            index,
            expected: 1,
            found: 0,
        })?;
        let arity = Op::arity(code).ok_or(GenomeError::UnknownOpcode {
            index,
            opcode: code,
        })?;
        let fields = chars.as_str();
        let expected = HEX_WIDTH * (2 + arity);
        if fields.len() != expected {
            return Err(GenomeError::FieldWidth {
                index,
                expected,
                found: fields.len(),
            });
        }

        let mut words = Vec::with_capacity(2 + arity);
        for i in 0..2 + arity {
            let field = fields.get(i * HEX_WIDTH..(i + 1) * HEX_WIDTH).unwrap_or("");
            if !field.bytes().all(|b| b.is_ascii_hexdigit()) || field.len() != HEX_WIDTH {
                return Err(GenomeError::BadHex {
                    index,
                    field: field.to_string(),
                });
            }
            let word = u32::from_str_radix(field, 16).map_err(|_| GenomeError::BadHex {
                index,
                field: field.to_string(),
            })?;
            words.push(word);
        }

        let op = Op::from_words(code, &words[2..]).ok_or(GenomeError::UnknownOpcode {
            index,
            opcode: code,
        })?;
        Ok(Self {
            id: words[0],
            limit: words[1],
            op,
        })
    }

    pub fn random(id: u32, known_ids: u32, rng: &mut impl Rng) -> Self {
        let op = match rng.gen_range(0..20) {
            0..=7 => random_step(rng),
            8..=11 => random_joint(rng),
            12..=15 => Op::Muscle {
                strength: rng.gen_range(-1.0..=1.0),
            },
            16 => Op::Point {
                mass: rng.gen_range(0.5..3.0),
            },
            17 => Op::Goto {
                target: rng.gen_range(0..known_ids.max(1)),
            },
            _ => Op::Return {
                point: rng.gen_range(0..4),
            },
        };
        Self {
            id,
            limit: rng.gen_range(1..=2),
            op,
        }
    }
}

fn jitter(v: f32, scale: f32, rng: &mut impl Rng) -> f32 {
    v + rng.gen_range(-1.0..=1.0) * config::PARAM_SIGMA as f32 * scale
}

fn random_step(rng: &mut impl Rng) -> Op {
    let min_len = rng.gen_range(6.0..14.0);
    Op::Step {
        target: if rng.gen_bool(0.85) {
            NEW_POINT
        } else {
            rng.gen_range(0..8)
        },
        min_len,
        max_len: min_len + rng.gen_range(0.0..6.0),
    }
}

fn random_joint(rng: &mut impl Rng) -> Op {
    let min_angle = rng.gen_range(0.5..2.5);
    Op::Joint {
        min_angle,
        max_angle: min_angle + rng.gen_range(0.0..1.0),
    }
}

/// Instruction-stream genome with an evolvable compatibility threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct InstructionGenome {
    rates: MutationRates,
    threshold: u32,
    instructions: Vec<Instruction>,
}

impl InstructionGenome {
    pub fn default_rates() -> MutationRates {
        MutationRates::with(&[
            (RATE_INSERT, config::DEFAULT_MUTATION_RATE),
            (RATE_DELETE, config::DEFAULT_MUTATION_RATE),
            (RATE_MODIFY, 0.3),
            (RATE_DUPLICATE, config::DEFAULT_MUTATION_RATE * 0.5),
            (RATE_THRESHOLD, config::DEFAULT_MUTATION_RATE),
        ])
    }

    pub fn new(threshold: u32, instructions: Vec<Instruction>) -> Self {
        Self {
            rates: Self::default_rates(),
            threshold,
            instructions,
        }
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        let mut instructions = vec![Instruction {
            id: 0,
            limit: 1,
            op: random_step(rng),
        }];
        let extra = rng.gen_range(3..8);
        for id in 1..=extra {
            instructions.push(Instruction::random(id, id, rng));
        }
        let id = extra + 1;
        instructions.push(Instruction {
            id,
            limit: 1,
            op: Op::Muscle {
                strength: rng.gen_range(-1.0..=1.0),
            },
        });
        Self::new(config::TEXT_COMPATIBILITY_THRESHOLD, instructions)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    fn stream_text(&self) -> String {
        self.instructions
            .iter()
            .map(Instruction::to_text)
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn to_text(&self) -> String {
        format!("{}#{}", self.threshold, self.stream_text())
    }

    pub fn from_text(text: &str) -> Result<Self, GenomeError> {
        let hashes = text.matches('#').count();
        if hashes != 1 {
            return Err(GenomeError::DelimiterCount {
                delimiter: '#',
                expected: 1,
                found: hashes,
            });
        }
        let (distance, stream) = text.split_once('#').ok_or(GenomeError::DelimiterCount {
            delimiter: '#',
            expected: 1,
            found: 0,
        })?;
        let threshold = distance
            .trim()
            .parse::<u32>()
            .map_err(|_| GenomeError::BadDistance(distance.to_string()))?;

        let mut instructions = Vec::new();
        if !stream.is_empty() {
            let parts: Vec<&str> = stream.split('.').collect();
            if parts.iter().any(|p| p.is_empty()) {
                let filled = parts.iter().filter(|p| !p.is_empty()).count();
                return Err(GenomeError::DelimiterCount {
                    delimiter: '.',
                    expected: filled.saturating_sub(1),
                    found: parts.len() - 1,
                });
            }
            for (index, part) in parts.iter().enumerate() {
                instructions.push(Instruction::parse(index, part)?);
            }
        }
        Ok(Self::new(threshold, instructions))
    }

    pub fn plan(&self) -> BodyPlan {
        assemble(&self.instructions)
    }

    fn next_id(&self) -> u32 {
        self.instructions
            .iter()
            .map(|i| i.id)
            .max()
            .map_or(0, |m| m.saturating_add(1))
    }

    fn modify(&mut self, rng: &mut impl Rng) {
        if self.instructions.is_empty() {
            return;
        }
        let ids = self.next_id();
        let i = rng.gen_range(0..self.instructions.len());
        let inst = &mut self.instructions[i];
        inst.op = match inst.op {
            Op::Step {
                target,
                min_len,
                max_len,
            } => {
                let min_len = jitter(min_len, 8.0, rng).max(1.0);
                Op::Step {
                    target,
                    min_len,
                    max_len: jitter(max_len, 8.0, rng).max(min_len),
                }
            }
            Op::Joint {
                min_angle,
                max_angle,
            } => {
                let min_angle = jitter(min_angle, PI, rng).rem_euclid(TAU);
                Op::Joint {
                    min_angle,
                    max_angle: jitter(max_angle, PI, rng).max(min_angle),
                }
            }
            Op::Muscle { strength } => Op::Muscle {
                strength: jitter(strength, 1.0, rng).clamp(-1.0, 1.0),
            },
            Op::Point { mass } => Op::Point {
                mass: jitter(mass, 1.0, rng).max(0.1),
            },
            Op::Goto { .. } => Op::Goto {
                target: rng.gen_range(0..ids.max(1)),
            },
            Op::Return { point } => Op::Return {
                point: if rng.gen_bool(0.5) {
                    point.saturating_add(1)
                } else {
                    point.saturating_sub(1)
                },
            },
        };
        if rng.gen_bool(0.25) {
            inst.limit = if rng.gen_bool(0.5) {
                inst.limit.saturating_add(1).min(4)
            } else {
                inst.limit.saturating_sub(1).max(1)
            };
        }
    }
}

impl Gene for InstructionGenome {
    type Output = BodyPlan;

    fn rates(&self) -> &MutationRates {
        &self.rates
    }

    fn rates_mut(&mut self) -> &mut MutationRates {
        &mut self.rates
    }

    fn mutate_structure(&mut self, rng: &mut impl Rng) {
        for _ in 0..self.rates.trials(RATE_INSERT, rng) {
            if self.instructions.len() >= config::MAX_ASSEMBLY_STEPS {
                break;
            }
            let id = self.next_id();
            let at = rng.gen_range(0..=self.instructions.len());
            self.instructions.insert(at, Instruction::random(id, id, rng));
        }

        for _ in 0..self.rates.trials(RATE_DELETE, rng) {
            if self.instructions.len() <= 1 {
                break;
            }
            let at = rng.gen_range(0..self.instructions.len());
            self.instructions.remove(at);
        }

        for _ in 0..self.rates.trials(RATE_MODIFY, rng) {
            self.modify(rng);
        }

        if self.rates.roll(RATE_DUPLICATE, rng) && !self.instructions.is_empty() {
            let len = rng.gen_range(config::CROSS_MIN_BLOCK..=config::CROSS_MAX_BLOCK);
            let start = rng.gen_range(0..self.instructions.len());
            let end = (start + len).min(self.instructions.len());
            let mut id = self.next_id();
            let block: Vec<Instruction> = self.instructions[start..end].to_vec();
            for mut inst in block {
                if self.instructions.len() >= config::MAX_ASSEMBLY_STEPS {
                    break;
                }
                inst.id = id;
                id = id.saturating_add(1);
                self.instructions.push(inst);
            }
        }

        if self.rates.roll(RATE_THRESHOLD, rng) {
            let step = rng.gen_range(1..=8);
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
        w.utf16(&self.to_text());
        w.into_bytes()
    }

    fn deserialize(bytes: &[u8]) -> Result<Self, GenomeError> {
        let mut r = ByteReader::new(bytes);
        let rates = MutationRates::read(&mut r)?;
        let text = r.utf16()?;
        r.finish()?;
        let mut genome = Self::from_text(&text)?;
        genome.rates = rates;
        Ok(genome)
    }
}

impl SexualGene for InstructionGenome {
    fn compatibility_threshold(&self) -> u32 {
        self.threshold
    }

    /// Character edit distance between the serialized instruction streams.
    fn distance(&self, other: &Self) -> u32 {
        let a: Vec<u8> = self.stream_text().into_bytes();
        let b: Vec<u8> = other.stream_text().into_bytes();
        edit_distance(&a, &b)
    }

    fn recombine(&self, other: &Self, min_block: usize, max_block: usize, rng: &mut impl Rng) -> Self {
        let instructions = block_cross(
            &self.instructions,
            &other.instructions,
            min_block,
            max_block,
            rng,
        );
        Self {
            rates: self.rates.blend(&other.rates),
            threshold: if rng.gen_bool(0.5) {
                self.threshold
            } else {
                other.threshold
            },
            instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn step(id: u32) -> Instruction {
        Instruction {
            id,
            limit: 1,
            op: Op::Step {
                target: NEW_POINT,
                min_len: 8.0,
                max_len: 12.0,
            },
        }
    }

    #[test]
    fn instruction_text_layout() {
        let text = step(1).to_text();
        assert!(text.starts_with("S0000000100000001FFFFFFFF"));
        assert_eq!(text.len(), 1 + 5 * 8);
        assert_eq!(Instruction::parse(0, &text).unwrap(), step(1));
    }

    #[test]
    fn text_round_trips() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let genome = InstructionGenome::random(&mut rng);
        let back = InstructionGenome::from_text(&genome.to_text()).unwrap();
        assert_eq!(back.instructions(), genome.instructions());
        assert_eq!(back.threshold(), genome.threshold());
    }

    #[test]
    fn wrong_hash_count_is_a_parse_failure() {
        let err = InstructionGenome::from_text("12#S#").unwrap_err();
        assert_eq!(
            err,
            GenomeError::DelimiterCount {
                delimiter: '#',
                expected: 1,
                found: 2
            }
        );
        assert!(InstructionGenome::from_text("no delimiter").is_err());
    }

    #[test]
    fn empty_instruction_between_dots_is_rejected() {
        let s = step(0).to_text();
        let text = format!("10#{s}..{s}");
        assert!(matches!(
            InstructionGenome::from_text(&text),
            Err(GenomeError::DelimiterCount { delimiter: '.', .. })
        ));
    }

    #[test]
    fn bad_fields_are_rejected() {
        assert!(matches!(
            Instruction::parse(3, "X0000000000000001"),
            Err(GenomeError::UnknownOpcode { index: 3, opcode: 'X' })
        ));
        assert!(matches!(
            Instruction::parse(0, "M000000000000000100"),
            Err(GenomeError::FieldWidth { .. })
        ));
        assert!(matches!(
            Instruction::parse(0, "M00000000000000013F80000Z"),
            Err(GenomeError::BadHex { .. })
        ));
        assert!(matches!(
            InstructionGenome::from_text("abc#"),
            Err(GenomeError::BadDistance(_))
        ));
    }

    #[test]
    fn byte_serialization_keeps_rates() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let genome = InstructionGenome::random(&mut rng).mutate(&mut rng);
        let back = InstructionGenome::deserialize(&genome.serialize()).unwrap();
        assert_eq!(back, genome);
    }

    #[test]
    fn mutation_does_not_touch_parent() {
        let mut rng = ChaCha8Rng::seed_from_u64(15);
        let genome = InstructionGenome::random(&mut rng);
        let before = genome.clone();
        for _ in 0..30 {
            let _ = genome.mutate(&mut rng);
        }
        assert_eq!(genome, before);
        assert_eq!(genome.plan().point_count(), before.plan().point_count());
    }

    #[test]
    fn distant_genomes_cannot_cross() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let a = InstructionGenome::new(5, vec![step(0), step(1)]);
        let b = InstructionGenome::new(
            500,
            vec![Instruction {
                id: 9,
                limit: 3,
                op: Op::Muscle { strength: 0.5 },
            }],
        );
        assert!(!a.is_compatible(&b));
        let err = a.cross(&b, 1, 2, &mut rng).unwrap_err();
        assert_eq!(err.threshold, 5);
        assert!(err.distance >= 5);
    }

    #[test]
    fn identical_genomes_cross() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let a = InstructionGenome::new(5, vec![step(0), step(1)]);
        let child = a.cross(&a.clone(), 1, 2, &mut rng).unwrap();
        assert_eq!(child.instructions(), a.instructions());
    }
}
