//! Graph genome: nodes become point masses, structural edges become rods.
//!
//! Expression starts at the first node and follows outgoing edges depth-first.
//! An edge may be taken at most `max_recurse` times along any one path, so a
//! self-loop with `max_recurse = 3` grows a limb three segments long.

use std::f64::consts::TAU;

use glam::DVec2;
use rand::Rng;

use super::{BodyPlan, MuscleSpec};
use crate::codec::{ByteReader, ByteWriter};
use crate::config;
use crate::error::{GenomeError, StructureError};
use crate::gene::{block_cross, BuildContext, Gene, MutationRates, SexualGene};
use crate::physics::{BodyBuilder, StructureRef};

/// Terminates the node list and the edge list in the byte layout.
pub const LIST_END: i32 = -2;

pub const RATE_ADD_NODE: &str = "add_node";
pub const RATE_REMOVE_NODE: &str = "remove_node";
pub const RATE_ADD_EDGE: &str = "add_edge";
pub const RATE_REMOVE_EDGE: &str = "remove_edge";
pub const RATE_PERTURB: &str = "perturb";
pub const RATE_THRESHOLD: &str = "threshold";

const MAX_RECURSE: i32 = 8;
const BRANCH_SPREAD: f64 = 0.9;

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: i32,
    pub mass: f64,
    /// Angular band for joints formed at this node.
    pub rest_low: f64,
    pub rest_high: f64,
    /// Muscle strength for this node's joints, if driven.
    pub muscle: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RodSpan {
    pub rest_low: f64,
    pub rest_high: f64,
    pub muscle: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub from: i32,
    pub to: i32,
    pub max_recurse: i32,
    /// `None` for a grouping edge: the child's edges expand from the parent's point.
    pub rod: Option<RodSpan>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphGenome {
    rates: MutationRates,
    threshold: u32,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

fn random_node(id: i32, rng: &mut impl Rng) -> Node {
    let rest_low = rng.gen_range(0.5..2.5);
    Node {
        id,
        mass: rng.gen_range(0.5..2.0),
        rest_low,
        rest_high: rest_low + rng.gen_range(0.0..1.0),
        muscle: rng.gen_bool(0.3).then(|| rng.gen_range(-1.0..=1.0)),
    }
}

fn random_span(rng: &mut impl Rng) -> RodSpan {
    let rest_low = rng.gen_range(6.0..14.0);
    RodSpan {
        rest_low,
        rest_high: rest_low + rng.gen_range(0.0..6.0),
        muscle: rng.gen_bool(0.4).then(|| rng.gen_range(-1.0..=1.0)),
    }
}

fn jitter(v: f64, scale: f64, rng: &mut impl Rng) -> f64 {
    v + rng.gen_range(-1.0..=1.0) * config::PARAM_SIGMA * scale
}

fn differs(a: f64, b: f64) -> bool {
    (a - b).abs() > config::PARAM_SIGMA
}

impl GraphGenome {
    pub fn default_rates() -> MutationRates {
        MutationRates::with(&[
            (RATE_ADD_NODE, config::DEFAULT_MUTATION_RATE),
            (RATE_REMOVE_NODE, config::DEFAULT_MUTATION_RATE * 0.5),
            (RATE_ADD_EDGE, config::DEFAULT_MUTATION_RATE),
            (RATE_REMOVE_EDGE, config::DEFAULT_MUTATION_RATE * 0.5),
            (RATE_PERTURB, 0.3),
            (RATE_THRESHOLD, config::DEFAULT_MUTATION_RATE),
        ])
    }

    pub fn new(threshold: u32, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            rates: Self::default_rates(),
            threshold,
            nodes,
            edges,
        }
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        let count = rng.gen_range(2..5);
        let nodes: Vec<Node> = (0..count).map(|id| random_node(id, rng)).collect();
        let mut edges = Vec::new();
        for to in 1..count {
            let mut span = random_span(rng);
            if to == 1 {
                span.muscle.get_or_insert(1.0);
            }
            edges.push(Edge {
                from: rng.gen_range(0..to),
                to,
                max_recurse: rng.gen_range(1..=2),
                rod: Some(span),
            });
        }
        Self::new(config::COMPATIBILITY_THRESHOLD, nodes, edges)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    fn node_index(&self, id: i32) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    fn next_id(&self) -> i32 {
        self.nodes.iter().map(|n| n.id).max().map_or(0, |m| m + 1)
    }

    /// Lay the body out around the origin.
    pub fn plan(&self) -> Result<BodyPlan, GenomeError> {
        let root = self.nodes.first().ok_or(StructureError::EmptyBody)?;
        let mut ex = Expander {
            genome: self,
            builder: BodyBuilder::new(),
            muscles: Vec::new(),
            point_node: Vec::new(),
            taken: vec![0; self.edges.len()],
            steps: 0,
        };
        let p = ex
            .builder
            .add_point(DVec2::ZERO, root.mass, config::DEFAULT_POINT_RADIUS);
        ex.point_node.push(0);
        ex.expand(0, p, 0.0, true)?;

        let Expander {
            mut builder,
            mut muscles,
            point_node,
            ..
        } = ex;
        for (point, node) in point_node.iter().enumerate() {
            let rods = builder.rods_at(point);
            let node = &self.nodes[*node];
            for pair in rods.windows(2) {
                let joint = builder.add_joint(point, [pair[0], pair[1]], node.rest_low, node.rest_high);
                if let Some(strength) = node.muscle {
                    muscles.push(MuscleSpec {
                        target: StructureRef::Joint(joint),
                        strength,
                    });
                }
            }
        }
        Ok(BodyPlan { builder, muscles })
    }

    fn perturb(&mut self, rng: &mut impl Rng) {
        let total = self.nodes.len() + self.edges.len();
        if total == 0 {
            return;
        }
        let pick = rng.gen_range(0..total);
        if pick < self.nodes.len() {
            let node = &mut self.nodes[pick];
            node.mass = jitter(node.mass, 1.0, rng).max(0.1);
            node.rest_low = jitter(node.rest_low, 1.0, rng).rem_euclid(TAU);
            node.rest_high = jitter(node.rest_high, 1.0, rng).max(node.rest_low);
            if let Some(s) = node.muscle.as_mut() {
                *s = jitter(*s, 1.0, rng).clamp(-1.0, 1.0);
            }
        } else {
            let edge = &mut self.edges[pick - self.nodes.len()];
            if rng.gen_bool(0.2) {
                edge.max_recurse = (edge.max_recurse + rng.gen_range(-1..=1)).clamp(1, MAX_RECURSE);
            }
            if let Some(span) = edge.rod.as_mut() {
                span.rest_low = jitter(span.rest_low, 8.0, rng).max(1.0);
                span.rest_high = jitter(span.rest_high, 8.0, rng).max(span.rest_low);
                if let Some(s) = span.muscle.as_mut() {
                    *s = jitter(*s, 1.0, rng).clamp(-1.0, 1.0);
                }
            }
        }
    }
}

struct Expander<'a> {
    genome: &'a GraphGenome,
    builder: BodyBuilder,
    muscles: Vec<MuscleSpec>,
    /// Node each point was expressed from.
    point_node: Vec<usize>,
    /// Times each edge has been taken on the current path.
    taken: Vec<i32>,
    steps: usize,
}

impl Expander<'_> {
    fn expand(&mut self, node: usize, point: usize, heading: f64, root: bool) -> Result<(), GenomeError> {
        let id = self.genome.nodes[node].id;
        let out: Vec<usize> = (0..self.genome.edges.len())
            .filter(|e| self.genome.edges[*e].from == id)
            .collect();
        let n = out.len() as f64;
        let spread = if root { TAU / n.max(1.0) } else { BRANCH_SPREAD };

        for (k, e) in out.into_iter().enumerate() {
            if self.steps >= config::MAX_ASSEMBLY_STEPS
                || self.builder.point_count() >= config::MAX_BODY_POINTS
            {
                return Ok(());
            }
            let edge = &self.genome.edges[e];
            if self.taken[e] >= edge.max_recurse {
                continue;
            }
            let child = self
                .genome
                .node_index(edge.to)
                .ok_or(GenomeError::UnknownNode(edge.to))?;
            self.taken[e] += 1;
            self.steps += 1;

            match &edge.rod {
                Some(span) => {
                    let offset = if root { k as f64 } else { k as f64 - (n - 1.0) * 0.5 };
                    let angle = heading + offset * spread;
                    let from = self.builder.point(point).map_or(DVec2::ZERO, |p| p.pos);
                    let length = ((span.rest_low + span.rest_high) * 0.5).max(1.0);
                    let p = self.builder.add_point(
                        from + DVec2::from_angle(angle) * length,
                        self.genome.nodes[child].mass,
                        config::DEFAULT_POINT_RADIUS,
                    );
                    let rod = self
                        .builder
                        .add_rod(Some(point), Some(p), span.rest_low, span.rest_high);
                    if let Some(strength) = span.muscle {
                        self.muscles.push(MuscleSpec {
                            target: StructureRef::Rod(rod),
                            strength,
                        });
                    }
                    self.point_node.push(child);
                    self.expand(child, p, angle, false)?;
                }
                None => {
                    if let Some(host) = self.builder.point_mut(point) {
                        host.mass += self.genome.nodes[child].mass;
                    }
                    self.expand(child, point, heading, false)?;
                }
            }
            self.taken[e] -= 1;
        }
        Ok(())
    }
}

impl Gene for GraphGenome {
    type Output = BodyPlan;

    fn rates(&self) -> &MutationRates {
        &self.rates
    }

    fn rates_mut(&mut self) -> &mut MutationRates {
        &mut self.rates
    }

    fn mutate_structure(&mut self, rng: &mut impl Rng) {
        for _ in 0..self.rates.trials(RATE_ADD_NODE, rng) {
            if self.nodes.len() >= config::MAX_BODY_POINTS || self.nodes.is_empty() {
                break;
            }
            let id = self.next_id();
            let from = self.nodes[rng.gen_range(0..self.nodes.len())].id;
            self.nodes.push(random_node(id, rng));
            self.edges.push(Edge {
                from,
                to: id,
                max_recurse: 1,
                rod: Some(random_span(rng)),
            });
        }

        if self.nodes.len() > 1 && self.rates.roll(RATE_REMOVE_NODE, rng) {
            let victim = self.nodes.remove(rng.gen_range(1..self.nodes.len()));
            self.edges.retain(|e| e.from != victim.id && e.to != victim.id);
        }

        for _ in 0..self.rates.trials(RATE_ADD_EDGE, rng) {
            if self.nodes.is_empty() || self.edges.len() >= config::MAX_ASSEMBLY_STEPS {
                break;
            }
            let from = self.nodes[rng.gen_range(0..self.nodes.len())].id;
            let to = self.nodes[rng.gen_range(0..self.nodes.len())].id;
            self.edges.push(Edge {
                from,
                to,
                max_recurse: rng.gen_range(1..=3),
                rod: rng.gen_bool(0.8).then(|| random_span(rng)),
            });
        }

        if !self.edges.is_empty() && self.rates.roll(RATE_REMOVE_EDGE, rng) {
            self.edges.remove(rng.gen_range(0..self.edges.len()));
        }

        for _ in 0..self.rates.trials(RATE_PERTURB, rng) {
            self.perturb(rng);
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
        self.plan()
    }

    fn serialize(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.rates.write(&mut w);
        w.i32(self.threshold as i32);
        for node in &self.nodes {
            w.i32(node.id);
            w.f64(node.mass);
            w.f64(node.rest_low);
            w.f64(node.rest_high);
            w.bool(node.muscle.is_some());
            if let Some(strength) = node.muscle {
                w.f64(strength);
            }
        }
        w.i32(LIST_END);
        for edge in &self.edges {
            w.i32(edge.from);
            w.i32(edge.to);
            w.i32(edge.max_recurse);
            w.bool(edge.rod.is_some());
            if let Some(span) = &edge.rod {
                w.f64(span.rest_low);
                w.f64(span.rest_high);
                w.bool(span.muscle.is_some());
                w.f64(span.muscle.unwrap_or(0.0));
            }
        }
        w.i32(LIST_END);
        w.into_bytes()
    }

    fn deserialize(bytes: &[u8]) -> Result<Self, GenomeError> {
        let mut r = ByteReader::new(bytes);
        let rates = MutationRates::read(&mut r)?;
        let threshold = r.len()? as u32;

        let mut nodes = Vec::new();
        loop {
            let id = r.i32()?;
            if id == LIST_END {
                break;
            }
            if id < 0 {
                return Err(GenomeError::UnknownNode(id));
            }
            let mass = r.f64()?;
            let rest_low = r.f64()?;
            let rest_high = r.f64()?;
            let muscle = if r.bool()? { Some(r.f64()?) } else { None };
            nodes.push(Node {
                id,
                mass,
                rest_low,
                rest_high,
                muscle,
            });
        }

        let mut edges = Vec::new();
        loop {
            let from = r.i32()?;
            if from == LIST_END {
                break;
            }
            let to = r.i32()?;
            let max_recurse = r.i32()?;
            let rod = if r.bool()? {
                let rest_low = r.f64()?;
                let rest_high = r.f64()?;
                let is_muscle = r.bool()?;
                let strength = r.f64()?;
                Some(RodSpan {
                    rest_low,
                    rest_high,
                    muscle: is_muscle.then_some(strength),
                })
            } else {
                None
            };
            edges.push(Edge {
                from,
                to,
                max_recurse,
                rod,
            });
        }
        r.finish()?;

        Ok(Self {
            rates,
            threshold,
            nodes,
            edges,
        })
    }
}

impl SexualGene for GraphGenome {
    fn compatibility_threshold(&self) -> u32 {
        self.threshold
    }

    /// Count difference plus the number of aligned nodes and edges that differ.
    fn distance(&self, other: &Self) -> u32 {
        let mut d = self.nodes.len().abs_diff(other.nodes.len()) + self.edges.len().abs_diff(other.edges.len());
        for (a, b) in self.nodes.iter().zip(&other.nodes) {
            let changed = a.id != b.id
                || differs(a.mass, b.mass)
                || differs(a.rest_low, b.rest_low)
                || differs(a.rest_high, b.rest_high)
                || a.muscle.is_some() != b.muscle.is_some();
            d += usize::from(changed);
        }
        for (a, b) in self.edges.iter().zip(&other.edges) {
            let changed = a.from != b.from
                || a.to != b.to
                || a.max_recurse != b.max_recurse
                || match (&a.rod, &b.rod) {
                    (Some(x), Some(y)) => {
                        differs(x.rest_low, y.rest_low)
                            || differs(x.rest_high, y.rest_high)
                            || x.muscle.is_some() != y.muscle.is_some()
                    }
                    (None, None) => false,
                    _ => true,
                };
            d += usize::from(changed);
        }
        d as u32
    }

    fn recombine(&self, other: &Self, min_block: usize, max_block: usize, rng: &mut impl Rng) -> Self {
        let mut nodes: Vec<Node> = Vec::new();
        for node in block_cross(&self.nodes, &other.nodes, min_block, max_block, rng) {
            if !nodes.iter().any(|n| n.id == node.id) {
                nodes.push(node);
            }
        }
        let edges = block_cross(&self.edges, &other.edges, min_block, max_block, rng)
            .into_iter()
            .filter(|e| nodes.iter().any(|n| n.id == e.from) && nodes.iter().any(|n| n.id == e.to))
            .collect();
        Self {
            rates: self.rates.blend(&other.rates),
            threshold: if rng.gen_bool(0.5) {
                self.threshold
            } else {
                other.threshold
            },
            nodes,
            edges,
        }
    }
}
