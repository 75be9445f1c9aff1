use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Aabb, Joint, PointMass, Rod};
use crate::config::PhysicsParams;
use crate::error::StructureError;

/// Addresses a muscle-drivable structure inside one body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureRef {
    Rod(usize),
    Joint(usize),
}

/// A fully wired soft body. Only [`BodyBuilder::build`] creates one, so every rod
/// and joint index is known to be valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body {
    points: Vec<PointMass>,
    rods: Vec<Rod>,
    joints: Vec<Joint>,
}

impl Body {
    pub fn points(&self) -> &[PointMass] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [PointMass] {
        &mut self.points
    }

    pub fn rods(&self) -> &[Rod] {
        &self.rods
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn total_mass(&self) -> f64 {
        self.points.iter().map(|p| p.mass).sum()
    }

    /// Mass-weighted centre.
    pub fn centroid(&self) -> DVec2 {
        let mass = self.total_mass();
        if mass <= 0.0 {
            return DVec2::ZERO;
        }
        self.points.iter().map(|p| p.pos * p.mass).sum::<DVec2>() / mass
    }

    /// Mass-weighted mean velocity.
    pub fn velocity(&self) -> DVec2 {
        let mass = self.total_mass();
        if mass <= 0.0 {
            return DVec2::ZERO;
        }
        self.points.iter().map(|p| p.vel * p.mass).sum::<DVec2>() / mass
    }

    /// Distance from `center` to the farthest point edge.
    pub fn radius_about(&self, center: DVec2) -> f64 {
        self.points
            .iter()
            .map(|p| p.pos.distance(center) + p.radius)
            .fold(0.0, f64::max)
    }

    pub fn max_point_radius(&self) -> f64 {
        self.points.iter().map(|p| p.radius).fold(0.0, f64::max)
    }

    pub fn translate(&mut self, by: DVec2) {
        for p in &mut self.points {
            p.pos += by;
        }
    }

    pub fn rotate_about(&mut self, center: DVec2, angle: f64) {
        let rot = DVec2::from_angle(angle);
        for p in &mut self.points {
            p.pos = center + rot.rotate(p.pos - center);
            p.vel = rot.rotate(p.vel);
        }
    }

    /// Mutable access to both endpoints of a rod.
    pub fn rod_ends_mut(&mut self, rod: usize) -> Option<(&mut PointMass, &mut PointMass)> {
        let r = self.rods.get(rod)?;
        let (a, b) = (r.a, r.b);
        if a == b || a >= self.points.len() || b >= self.points.len() {
            return None;
        }
        let (lo, hi) = (a.min(b), a.max(b));
        let (head, tail) = self.points.split_at_mut(hi);
        let (first, second) = (&mut head[lo], &mut tail[0]);
        if a < b {
            Some((first, second))
        } else {
            Some((second, first))
        }
    }

    /// Queue a muscle contraction. Stale references are reported and ignored.
    pub fn contract(&mut self, target: StructureRef, strength: f64) {
        match target {
            StructureRef::Rod(i) => match self.rods.get_mut(i) {
                Some(rod) => rod.add_muscle(strength),
                None => warn!(rod = i, len = self.rods.len(), "muscle targets missing rod"),
            },
            StructureRef::Joint(i) => match self.joints.get_mut(i) {
                Some(joint) => joint.add_muscle(strength),
                None => warn!(joint = i, len = self.joints.len(), "muscle targets missing joint"),
            },
        }
    }

    pub fn has_structure(&self, target: StructureRef) -> bool {
        match target {
            StructureRef::Rod(i) => i < self.rods.len(),
            StructureRef::Joint(i) => i < self.joints.len(),
        }
    }

    pub fn rod_strain(&self, rod: usize) -> Option<f64> {
        self.rods.get(rod).map(|r| r.strain(&self.points))
    }

    pub fn joint_angle(&self, joint: usize) -> Option<f64> {
        self.joints
            .get(joint)
            .map(|j| j.angle(&self.points, &self.rods))
    }

    /// Rod then joint forces; muscle accumulators are consumed.
    pub fn accumulate_forces(&mut self, params: &PhysicsParams) {
        for rod in &mut self.rods {
            rod.apply_forces(&mut self.points, params);
        }
        for joint in &mut self.joints {
            joint.apply_forces(&mut self.points, &self.rods, params);
        }
    }

    pub fn integrate(&mut self, params: &PhysicsParams, dt: f64, bounds: &Aabb) {
        for p in &mut self.points {
            p.integrate(params, dt);
            p.reflect_into(bounds);
        }
    }

    /// Rod segments as endpoint positions.
    /// Check that every rod and joint refers to real structure. Bodies from
    /// [`BodyBuilder::build`] always pass; deserialized ones may not.
    pub fn validate(&self) -> Result<(), StructureError> {
        if self.points.is_empty() {
            return Err(StructureError::EmptyBody);
        }
        for (point, p) in self.points.iter().enumerate() {
            if !p.mass.is_finite() || p.mass <= 0.0 {
                return Err(StructureError::InvalidMass {
                    point,
                    mass: p.mass,
                });
            }
        }

        let len = self.points.len();
        for (rod, r) in self.rods.iter().enumerate() {
            for point in [r.a, r.b] {
                if point >= len {
                    return Err(StructureError::EndpointOutOfRange { rod, point, len });
                }
            }
            if r.a == r.b {
                return Err(StructureError::DegenerateRod { rod, point: r.a });
            }
        }

        for (joint, j) in self.joints.iter().enumerate() {
            for rod in j.rods {
                let r = self
                    .rods
                    .get(rod)
                    .ok_or(StructureError::MissingRod { joint, rod })?;
                if !r.touches(j.pivot) {
                    return Err(StructureError::RodNotAtPivot {
                        joint,
                        rod,
                        pivot: j.pivot,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn segments(&self) -> impl Iterator<Item = (DVec2, DVec2)> + '_ {
        self.rods
            .iter()
            .map(|r| (self.points[r.a].pos, self.points[r.b].pos))
    }
}

#[derive(Clone, Debug)]
struct RodSpec {
    a: Option<usize>,
    b: Option<usize>,
    rest_low: f64,
    rest_high: f64,
}

#[derive(Clone, Debug)]
struct JointSpec {
    pivot: usize,
    rods: [usize; 2],
    rest_low: f64,
    rest_high: f64,
}

/// Incremental body wiring. Endpoints may be left unassigned while a genome is
/// being expressed; `build` rejects anything not fully connected.
#[derive(Clone, Debug, Default)]
pub struct BodyBuilder {
    points: Vec<PointMass>,
    rods: Vec<RodSpec>,
    joints: Vec<JointSpec>,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn rod_count(&self) -> usize {
        self.rods.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn point(&self, index: usize) -> Option<&PointMass> {
        self.points.get(index)
    }

    pub fn point_mut(&mut self, index: usize) -> Option<&mut PointMass> {
        self.points.get_mut(index)
    }

    pub fn add_point(&mut self, pos: DVec2, mass: f64, radius: f64) -> usize {
        self.points.push(PointMass::new(pos, mass, radius));
        self.points.len() - 1
    }

    pub fn add_rod(&mut self, a: Option<usize>, b: Option<usize>, rest_low: f64, rest_high: f64) -> usize {
        self.rods.push(RodSpec {
            a,
            b,
            rest_low,
            rest_high,
        });
        self.rods.len() - 1
    }

    pub fn set_rod_end(&mut self, rod: usize, b: usize) {
        if let Some(spec) = self.rods.get_mut(rod) {
            spec.b = Some(b);
        }
    }

    pub fn add_joint(&mut self, pivot: usize, rods: [usize; 2], rest_low: f64, rest_high: f64) -> usize {
        self.joints.push(JointSpec {
            pivot,
            rods,
            rest_low,
            rest_high,
        });
        self.joints.len() - 1
    }

    /// Rods incident to `point`, in creation order.
    pub fn rods_at(&self, point: usize) -> Vec<usize> {
        self.rods
            .iter()
            .enumerate()
            .filter(|(_, r)| r.a == Some(point) || r.b == Some(point))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn build(self) -> Result<Body, StructureError> {
        let mut rods = Vec::with_capacity(self.rods.len());
        for (rod, spec) in self.rods.iter().enumerate() {
            match (spec.a, spec.b) {
                (Some(a), Some(b)) => rods.push(Rod::new(a, b, spec.rest_low, spec.rest_high)),
                _ => return Err(StructureError::UnassignedEndpoint { rod }),
            }
        }
        let joints = self
            .joints
            .iter()
            .map(|spec| Joint::new(spec.pivot, spec.rods, spec.rest_low, spec.rest_high))
            .collect();

        let body = Body {
            points: self.points,
            rods,
            joints,
        };
        body.validate()?;
        Ok(body)
    }
}
