use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use super::{PointMass, Rod};
use crate::config::PhysicsParams;

/// Angular dead-band spring between two rods sharing a pivot point.
///
/// The measured angle is the counter-clockwise sweep from `rods[0]` to `rods[1]`
/// around `pivot`, in `[0, TAU)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub pivot: usize,
    pub rods: [usize; 2],
    pub rest_low: f64,
    pub rest_high: f64,
    pub health: f64,
    muscle_strength: f64,
}

impl Joint {
    pub fn new(pivot: usize, rods: [usize; 2], rest_low: f64, rest_high: f64) -> Self {
        let a = rest_low.rem_euclid(TAU);
        let b = rest_high.rem_euclid(TAU);
        Self {
            pivot,
            rods,
            rest_low: a.min(b),
            rest_high: a.max(b),
            health: 1.0,
            muscle_strength: 0.0,
        }
    }

    /// Far endpoints of both rods.
    fn arms(&self, rods: &[Rod]) -> (usize, usize) {
        (
            rods[self.rods[0]].other(self.pivot),
            rods[self.rods[1]].other(self.pivot),
        )
    }

    pub fn angle(&self, points: &[PointMass], rods: &[Rod]) -> f64 {
        let (f0, f1) = self.arms(rods);
        let p = points[self.pivot].pos;
        let u0 = points[f0].pos - p;
        let u1 = points[f1].pos - p;
        u0.perp_dot(u1).atan2(u0.dot(u1)).rem_euclid(TAU)
    }

    /// Signed deviation from the nearer edge of the band, measured on the circle.
    pub fn strain(&self, points: &[PointMass], rods: &[Rod]) -> f64 {
        let theta = self.angle(points, rods);
        if theta >= self.rest_low && theta <= self.rest_high {
            return 0.0;
        }
        let over = wrap_pi(theta - self.rest_high);
        let under = wrap_pi(theta - self.rest_low);
        if over.abs() < under.abs() {
            over
        } else {
            under
        }
    }

    /// Positive strength opens the joint. Consumed by the next `apply_forces`.
    pub fn add_muscle(&mut self, strength: f64) {
        self.muscle_strength += strength;
    }

    pub fn muscle_strength(&self) -> f64 {
        self.muscle_strength
    }

    pub fn apply_forces(&mut self, points: &mut [PointMass], rods: &[Rod], params: &PhysicsParams) {
        let (f0, f1) = self.arms(rods);
        let pivot = points[self.pivot].pos;
        let pivot_vel = points[self.pivot].vel;
        let u0 = points[f0].pos - pivot;
        let u1 = points[f1].pos - pivot;
        let (l0, l1) = (u0.length_squared(), u1.length_squared());
        if l0 <= f64::EPSILON || l1 <= f64::EPSILON {
            self.muscle_strength = 0.0;
            return;
        }

        let omega0 = u0.perp_dot(points[f0].vel - pivot_vel) / l0;
        let omega1 = u1.perp_dot(points[f1].vel - pivot_vel) / l1;
        let opening_rate = omega1 - omega0;

        let strain = self.strain(points, rods);
        let torque = -strain * params.joint_force_per_radian
            - opening_rate * params.joint_friction
            + self.muscle_strength * params.muscle_multiplier;

        // Tangential force of magnitude torque / arm on each far end, reaction on the pivot.
        let force1 = u1.perp() * (torque / l1);
        let force0 = -u0.perp() * (torque / l0);
        points[f1].apply_force(force1);
        points[f0].apply_force(force0);
        points[self.pivot].apply_force(-(force0 + force1));

        self.muscle_strength = 0.0;
    }
}

fn wrap_pi(angle: f64) -> f64 {
    let a = (angle + PI).rem_euclid(TAU) - PI;
    if a == -PI {
        PI
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    /// Pivot at origin, arm 0 along +x, arm 1 at `angle`.
    fn elbow(angle: f64) -> (Vec<PointMass>, Vec<Rod>) {
        let points = vec![
            PointMass::new(DVec2::ZERO, 1.0, 1.0),
            PointMass::new(DVec2::new(10.0, 0.0), 1.0, 1.0),
            PointMass::new(DVec2::from_angle(angle) * 10.0, 1.0, 1.0),
        ];
        let rods = vec![Rod::new(0, 1, 10.0, 10.0), Rod::new(0, 2, 10.0, 10.0)];
        (points, rods)
    }

    #[test]
    fn angle_is_counter_clockwise_sweep() {
        let (points, rods) = elbow(PI / 2.0);
        let joint = Joint::new(0, [0, 1], 0.0, PI);
        assert!((joint.angle(&points, &rods) - PI / 2.0).abs() < 1e-12);

        let (points, rods) = elbow(-PI / 2.0);
        assert!((joint.angle(&points, &rods) - 1.5 * PI).abs() < 1e-12);
    }

    #[test]
    fn no_torque_inside_angular_band() {
        let (mut points, rods) = elbow(1.0);
        let mut joint = Joint::new(0, [0, 1], 0.5, 1.5);
        joint.apply_forces(&mut points, &rods, &PhysicsParams::default());
        assert!(points.iter().all(|p| p.force == DVec2::ZERO));
    }

    #[test]
    fn strain_picks_nearer_band_edge_across_wrap() {
        let (points, rods) = elbow(-0.1);
        let joint = Joint::new(0, [0, 1], 0.2, 1.0);
        assert!((joint.strain(&points, &rods) + 0.3).abs() < 1e-9);
    }

    #[test]
    fn over_extended_joint_closes_and_conserves_momentum() {
        let (mut points, rods) = elbow(2.0);
        let mut joint = Joint::new(0, [0, 1], 0.5, 1.5);
        joint.apply_forces(&mut points, &rods, &PhysicsParams::default());

        let total: DVec2 = points.iter().map(|p| p.force).sum();
        assert!(total.length() < 1e-9);
        // Arm 1 is pushed clockwise, i.e. back toward arm 0.
        let tangent = DVec2::from_angle(2.0).perp();
        assert!(points[2].force.dot(tangent) < 0.0);
    }
}
