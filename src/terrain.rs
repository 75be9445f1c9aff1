//! Food/terrain field sampled by the environment: `value(pos) -> [0, 1]`.

use glam::DVec2;
use noise::{Fbm, NoiseFn, Perlin};

pub trait Terrain {
    /// Food density under `pos`, in `[0, 1]`.
    fn value(&self, pos: DVec2) -> f64;
}

impl<F: Fn(DVec2) -> f64> Terrain for F {
    fn value(&self, pos: DVec2) -> f64 {
        self(pos).clamp(0.0, 1.0)
    }
}

/// The same value everywhere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformTerrain(pub f64);

impl Terrain for UniformTerrain {
    fn value(&self, _pos: DVec2) -> f64 {
        self.0.clamp(0.0, 1.0)
    }
}

/// Fractal Perlin field. `scale` is the world distance covered by one noise unit.
pub struct NoiseTerrain {
    fbm: Fbm<Perlin>,
    seed: u32,
    scale: f64,
}

impl NoiseTerrain {
    pub fn new(seed: u32, scale: f64) -> Self {
        Self {
            fbm: Fbm::new(seed),
            seed,
            scale: scale.max(f64::EPSILON),
        }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl std::fmt::Debug for NoiseTerrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseTerrain")
            .field("seed", &self.seed)
            .field("scale", &self.scale)
            .finish()
    }
}

impl Terrain for NoiseTerrain {
    fn value(&self, pos: DVec2) -> f64 {
        let raw = self.fbm.get([pos.x / self.scale, pos.y / self.scale]);
        ((raw + 1.0) * 0.5).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_stays_in_unit_interval_and_is_seeded() {
        let a = NoiseTerrain::new(7, 300.0);
        let b = NoiseTerrain::new(7, 300.0);
        for i in 0..200 {
            let p = DVec2::new(i as f64 * 13.7, i as f64 * -4.1);
            let v = a.value(p);
            assert!((0.0..=1.0).contains(&v));
            assert_eq!(v, b.value(p));
        }
    }

    #[test]
    fn closures_are_clamped() {
        let t = |p: DVec2| p.x;
        assert_eq!(t.value(DVec2::new(3.0, 0.0)), 1.0);
        assert_eq!(t.value(DVec2::new(-3.0, 0.0)), 0.0);
        assert_eq!(UniformTerrain(0.25).value(DVec2::ZERO), 0.25);
    }
}
