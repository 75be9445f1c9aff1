use serde::{Deserialize, Serialize};

use super::{dead_band, PointMass};
use crate::config::PhysicsParams;

/// Dead-band spring between two point masses of the same body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rod {
    pub a: usize,
    pub b: usize,
    pub rest_low: f64,
    pub rest_high: f64,
    pub health: f64,
    muscle_strength: f64,
}

impl Rod {
    pub fn new(a: usize, b: usize, rest_low: f64, rest_high: f64) -> Self {
        let (rest_low, rest_high) = ordered(rest_low, rest_high);
        Self {
            a,
            b,
            rest_low,
            rest_high,
            health: 1.0,
            muscle_strength: 0.0,
        }
    }

    pub fn touches(&self, point: usize) -> bool {
        self.a == point || self.b == point
    }

    /// The endpoint that is not `point`.
    pub fn other(&self, point: usize) -> usize {
        if self.a == point {
            self.b
        } else {
            self.a
        }
    }

    pub fn length(&self, points: &[PointMass]) -> f64 {
        points[self.a].pos.distance(points[self.b].pos)
    }

    pub fn strain(&self, points: &[PointMass]) -> f64 {
        dead_band(self.length(points), self.rest_low, self.rest_high)
    }

    /// Positive strength contracts. Consumed by the next `apply_forces`.
    pub fn add_muscle(&mut self, strength: f64) {
        self.muscle_strength += strength;
    }

    pub fn muscle_strength(&self) -> f64 {
        self.muscle_strength
    }

    pub fn apply_forces(&mut self, points: &mut [PointMass], params: &PhysicsParams) {
        let delta = points[self.b].pos - points[self.a].pos;
        let len = delta.length();
        if len <= f64::EPSILON {
            self.muscle_strength = 0.0;
            return;
        }
        let dir = delta / len;

        let strain = dead_band(len, self.rest_low, self.rest_high);
        let (va, vb) = (points[self.a].vel, points[self.b].vel);
        let closing = (vb - va).dot(dir);

        // Positive magnitude pulls the ends together.
        let pull = strain * params.force_per_displacement
            + closing * params.spring_friction
            + self.muscle_strength * params.muscle_multiplier;

        let drag_a = -(va - dir * va.dot(dir)) * params.viscosity;
        let drag_b = -(vb - dir * vb.dot(dir)) * params.viscosity;

        points[self.a].apply_force(dir * pull + drag_a);
        points[self.b].apply_force(-dir * pull + drag_b);

        self.muscle_strength = 0.0;
    }
}

fn ordered(low: f64, high: f64) -> (f64, f64) {
    if low <= high {
        (low, high)
    } else {
        (high, low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    fn pair(distance: f64) -> Vec<PointMass> {
        vec![
            PointMass::new(DVec2::ZERO, 1.0, 1.0),
            PointMass::new(DVec2::new(distance, 0.0), 1.0, 1.0),
        ]
    }

    #[test]
    fn no_force_inside_dead_band() {
        let params = PhysicsParams::default();
        let mut points = pair(15.0);
        let mut rod = Rod::new(0, 1, 10.0, 20.0);
        rod.apply_forces(&mut points, &params);
        assert_eq!(points[0].force, DVec2::ZERO);
        assert_eq!(points[1].force, DVec2::ZERO);
    }

    #[test]
    fn stretched_force_is_proportional_to_excess() {
        let params = PhysicsParams::default();
        let mut points = pair(25.0);
        let mut rod = Rod::new(0, 1, 10.0, 20.0);
        rod.apply_forces(&mut points, &params);
        let k = params.force_per_displacement;
        assert!((points[0].force.x - 5.0 * k).abs() < 1e-9);
        assert!((points[1].force.x + 5.0 * k).abs() < 1e-9);
    }

    #[test]
    fn fixed_rest_length_pulls_both_ends_inward() {
        let params = PhysicsParams::default();
        let mut points = pair(10.0);
        let mut rod = Rod::new(0, 1, 5.0, 5.0);
        rod.apply_forces(&mut points, &params);
        let expected = 5.0 * params.force_per_displacement;
        assert_eq!(points[0].force, DVec2::new(expected, 0.0));
        assert_eq!(points[1].force, DVec2::new(-expected, 0.0));
    }

    #[test]
    fn muscle_is_consumed_after_one_step() {
        let params = PhysicsParams::default();
        let mut points = pair(15.0);
        let mut rod = Rod::new(0, 1, 10.0, 20.0);
        rod.add_muscle(1.0);
        rod.apply_forces(&mut points, &params);
        assert!(points[0].force.x > 0.0);
        assert_eq!(rod.muscle_strength(), 0.0);
    }

    #[test]
    fn viscosity_opposes_normal_motion_only() {
        let params = PhysicsParams::default();
        let mut points = pair(15.0);
        points[0].vel = DVec2::new(0.0, 2.0);
        let mut rod = Rod::new(0, 1, 10.0, 20.0);
        rod.apply_forces(&mut points, &params);
        assert!((points[0].force.y + 2.0 * params.viscosity).abs() < 1e-12);
    }
}
