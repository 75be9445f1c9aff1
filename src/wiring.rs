//! Which brain input reads which sense, and which brain output drives which actuator.
//!
//! The tables are derived from the expressed body so they always match the brain
//! gene's input/output counts after a body mutation.

use serde::{Deserialize, Serialize};

use crate::genome::MuscleSpec;
use crate::physics::StructureRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    Energy,
    Speed,
    /// `sin` of the organism's heading.
    Heading,
    /// Terrain value under the centroid.
    Terrain,
    /// Neighbours within the crowding radius.
    Crowding,
    JointAngle(usize),
    RodStrain(usize),
    /// Point touched another organism during the last collision phase.
    Touch(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Actuator {
    Muscle {
        output: usize,
        target: StructureRef,
        strength: f64,
    },
    Thrust {
        output: usize,
        point: usize,
        strength: f64,
    },
    Turn {
        output: usize,
        strength: f64,
    },
    Bite {
        output: usize,
        point: usize,
        strength: f64,
    },
}

impl Actuator {
    pub fn output(&self) -> usize {
        match *self {
            Actuator::Muscle { output, .. }
            | Actuator::Thrust { output, .. }
            | Actuator::Turn { output, .. }
            | Actuator::Bite { output, .. } => output,
        }
    }

    pub fn strength(&self) -> f64 {
        match *self {
            Actuator::Muscle { strength, .. }
            | Actuator::Thrust { strength, .. }
            | Actuator::Turn { strength, .. }
            | Actuator::Bite { strength, .. } => strength,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wiring {
    senses: Vec<Sense>,
    actuators: Vec<Actuator>,
}

/// The first point of every body is its head.
const HEAD: usize = 0;

impl Wiring {
    pub fn new(joint_count: usize, muscles: &[MuscleSpec]) -> Self {
        let mut senses = vec![
            Sense::Energy,
            Sense::Speed,
            Sense::Heading,
            Sense::Terrain,
            Sense::Crowding,
            Sense::Touch(HEAD),
        ];
        senses.extend((0..joint_count).map(Sense::JointAngle));
        senses.extend(muscles.iter().filter_map(|m| match m.target {
            StructureRef::Rod(r) => Some(Sense::RodStrain(r)),
            StructureRef::Joint(_) => None,
        }));

        let mut actuators: Vec<Actuator> = muscles
            .iter()
            .enumerate()
            .map(|(output, m)| Actuator::Muscle {
                output,
                target: m.target,
                strength: m.strength,
            })
            .collect();
        let next = actuators.len();
        actuators.push(Actuator::Thrust {
            output: next,
            point: HEAD,
            strength: 1.0,
        });
        actuators.push(Actuator::Turn {
            output: next + 1,
            strength: 1.0,
        });
        actuators.push(Actuator::Bite {
            output: next + 2,
            point: HEAD,
            strength: 1.0,
        });

        Self { senses, actuators }
    }

    pub fn senses(&self) -> &[Sense] {
        &self.senses
    }

    pub fn actuators(&self) -> &[Actuator] {
        &self.actuators
    }

    pub fn input_count(&self) -> usize {
        self.senses.len()
    }

    pub fn output_count(&self) -> usize {
        self.actuators.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiring_counts_follow_the_body() {
        let muscles = [
            MuscleSpec {
                target: StructureRef::Rod(2),
                strength: 0.5,
            },
            MuscleSpec {
                target: StructureRef::Joint(0),
                strength: -1.0,
            },
        ];
        let w = Wiring::new(3, &muscles);
        assert_eq!(w.input_count(), 6 + 3 + 1);
        assert!(w.senses().contains(&Sense::RodStrain(2)));
        assert_eq!(w.output_count(), 2 + 3);

        let outputs: Vec<usize> = w.actuators().iter().map(Actuator::output).collect();
        assert_eq!(outputs, vec![0, 1, 2, 3, 4]);
        assert_eq!(w.actuators()[1].strength(), -1.0);
    }
}
