use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::Aabb;
use crate::config::PhysicsParams;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointMass {
    pub pos: DVec2,
    pub vel: DVec2,
    /// Accumulated this step, zeroed by `integrate`.
    pub force: DVec2,
    pub mass: f64,
    pub radius: f64,
}

impl PointMass {
    pub fn new(pos: DVec2, mass: f64, radius: f64) -> Self {
        Self {
            pos,
            vel: DVec2::ZERO,
            force: DVec2::ZERO,
            mass,
            radius,
        }
    }

    pub fn apply_force(&mut self, f: DVec2) {
        self.force += f;
    }

    pub fn inverse_mass(&self) -> f64 {
        if self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    /// Speed cap, kinetic friction, then semi-implicit Euler.
    pub fn integrate(&mut self, params: &PhysicsParams, dt: f64) {
        let vel_max = params.vel_max;
        let mut accel = self.force * self.inverse_mass();

        let speed = self.vel.length();
        if speed > vel_max {
            self.vel *= vel_max / speed;
        }
        // At the cap, acceleration may turn the velocity but not lengthen it.
        if speed >= vel_max && speed > 0.0 {
            let dir = self.vel / speed;
            let along = accel.dot(dir);
            if along > 0.0 {
                accel -= dir * along;
            }
        }

        let speed = self.vel.length();
        if speed > 0.0 {
            let slow = (params.kinetic_friction * dt).min(speed);
            self.vel -= self.vel / speed * slow;
        }

        self.vel += accel * dt;
        let speed = self.vel.length();
        if speed > vel_max {
            self.vel *= vel_max / speed;
        }
        self.pos += self.vel * dt;

        self.force = DVec2::ZERO;
    }

    /// Reflect back inside `bounds`, negating the offending velocity component.
    pub fn reflect_into(&mut self, bounds: &Aabb) {
        if self.pos.x < bounds.min.x {
            self.pos.x = 2.0 * bounds.min.x - self.pos.x;
            self.vel.x = self.vel.x.abs();
        } else if self.pos.x > bounds.max.x {
            self.pos.x = 2.0 * bounds.max.x - self.pos.x;
            self.vel.x = -self.vel.x.abs();
        }
        if self.pos.y < bounds.min.y {
            self.pos.y = 2.0 * bounds.min.y - self.pos.y;
            self.vel.y = self.vel.y.abs();
        } else if self.pos.y > bounds.max.y {
            self.pos.y = 2.0 * bounds.max.y - self.pos.y;
            self.vel.y = -self.vel.y.abs();
        }
        self.pos = self.pos.clamp(bounds.min, bounds.max);
    }
}
