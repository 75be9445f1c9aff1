//! Turtle-style body assembly shared by the instruction and byte genomes.

use glam::DVec2;
use tracing::debug;

use super::instruction::{Instruction, Op};
use super::{BodyPlan, MuscleSpec};
use crate::config;
use crate::physics::{BodyBuilder, StructureRef};

struct Cursor {
    point: usize,
    heading: f64,
    pending_joint: Option<(f64, f64)>,
    last_structure: Option<StructureRef>,
}

/// Run `instructions` from a single root point at the origin.
///
/// Execution halts at the end of the stream or after `MAX_ASSEMBLY_STEPS`
/// executed instructions; each instruction runs at most `limit` times.
pub fn assemble(instructions: &[Instruction]) -> BodyPlan {
    let mut builder = BodyBuilder::new();
    builder.add_point(DVec2::ZERO, 1.0, config::DEFAULT_POINT_RADIUS);
    // Rod a point was grown along, and the point it was grown from.
    let mut grown_from: Vec<Option<(usize, usize)>> = vec![None];
    let mut muscles: Vec<MuscleSpec> = Vec::new();
    let mut cursor = Cursor {
        point: 0,
        heading: 0.0,
        pending_joint: None,
        last_structure: None,
    };

    let mut executed = vec![0u32; instructions.len()];
    let mut pc = 0;
    let mut steps = 0;
    while pc < instructions.len() && steps < config::MAX_ASSEMBLY_STEPS {
        let inst = &instructions[pc];
        if executed[pc] >= inst.limit {
            pc += 1;
            continue;
        }
        executed[pc] += 1;
        steps += 1;

        match inst.op {
            Op::Step {
                target,
                min_len,
                max_len,
            } => {
                let (low, high) = (f64::from(min_len), f64::from(max_len));
                let target = target as usize;
                if target < builder.point_count() && target != cursor.point {
                    let rod = builder.add_rod(Some(cursor.point), Some(target), low, high);
                    cursor.last_structure = Some(StructureRef::Rod(rod));
                } else if builder.point_count() < config::MAX_BODY_POINTS {
                    let previous = builder.rods_at(cursor.point).last().copied();
                    let from = builder
                        .point(cursor.point)
                        .map_or(DVec2::ZERO, |p| p.pos);
                    let length = ((low + high) * 0.5).abs().max(1.0);
                    let rod = builder.add_rod(Some(cursor.point), None, low, high);
                    let point = builder.add_point(
                        from + DVec2::from_angle(cursor.heading) * length,
                        1.0,
                        config::DEFAULT_POINT_RADIUS,
                    );
                    builder.set_rod_end(rod, point);
                    grown_from.push(Some((rod, cursor.point)));
                    cursor.last_structure = Some(StructureRef::Rod(rod));

                    if let (Some((lo, hi)), Some(prev)) = (cursor.pending_joint.take(), previous) {
                        let joint = builder.add_joint(cursor.point, [prev, rod], lo, hi);
                        cursor.last_structure = Some(StructureRef::Joint(joint));
                    }
                    cursor.point = point;
                }
                pc += 1;
            }
            Op::Goto { target } => {
                match instructions.iter().position(|i| i.id == target) {
                    Some(dest) => pc = dest,
                    None => pc += 1,
                }
            }
            Op::Joint {
                min_angle,
                max_angle,
            } => {
                let (lo, hi) = (f64::from(min_angle), f64::from(max_angle));
                let rods = builder.rods_at(cursor.point);
                if rods.len() >= 2 {
                    let pair = [rods[rods.len() - 2], rods[rods.len() - 1]];
                    let joint = builder.add_joint(cursor.point, pair, lo, hi);
                    cursor.last_structure = Some(StructureRef::Joint(joint));
                } else {
                    cursor.pending_joint = Some((lo, hi));
                }
                // Next growth leaves at the band's centre, measured from the way back.
                let back = grown_from
                    .get(cursor.point)
                    .copied()
                    .flatten()
                    .and_then(|(_, from)| {
                        let here = builder.point(cursor.point)?.pos;
                        let there = builder.point(from)?.pos;
                        Some((there - here).to_angle())
                    })
                    .unwrap_or(cursor.heading);
                cursor.heading = back + (lo + hi) * 0.5;
                pc += 1;
            }
            Op::Muscle { strength } => {
                match cursor.last_structure {
                    Some(target) => {
                        let strength = f64::from(strength);
                        match muscles.iter_mut().find(|m| m.target == target) {
                            Some(existing) => existing.strength = strength,
                            None => muscles.push(MuscleSpec { target, strength }),
                        }
                    }
                    None => debug!(pc, "muscle instruction with nothing to drive"),
                }
                pc += 1;
            }
            Op::Point { mass } => {
                if let Some(p) = builder.point_mut(cursor.point) {
                    p.mass = f64::from(mass);
                }
                pc += 1;
            }
            Op::Return { point } => {
                let point = point as usize;
                if point < builder.point_count() {
                    cursor.point = point;
                }
                pc += 1;
            }
        }
    }

    BodyPlan { builder, muscles }
}
