use serde::{Deserialize, Serialize};

use crate::config::EnergyParams;

/// Energy balance. Requests are always charged in full; only `is_alive` looks at the sign.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Energy {
    value: f64,
}

impl Energy {
    pub fn new(value: f64) -> Self {
        Self { value }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns `min(request, energy)` and subtracts the whole request, overdraft included.
    pub fn use_energy(&mut self, request: f64) -> f64 {
        let granted = request.min(self.value);
        self.value -= request;
        granted
    }

    /// Adds energy up to `cap`. A balance already above the cap is left alone.
    pub fn gain(&mut self, amount: f64, cap: f64) {
        if self.value < cap {
            self.value = (self.value + amount).min(cap);
        }
    }

    /// Moves up to `amount` of non-negative balance out; returns what was taken.
    pub fn drain(&mut self, amount: f64) -> f64 {
        let taken = amount.min(self.value.max(0.0)).max(0.0);
        self.value -= taken;
        taken
    }

    pub fn is_alive(&self) -> bool {
        self.value > 0.0
    }
}

/// Per-tick upkeep for a body of `point_count` point masses.
pub fn metabolic_cost(point_count: usize, params: &EnergyParams) -> f64 {
    params.base_metabolism * point_count as f64
}

/// Energy gained from the terrain value under the organism this tick.
pub fn feeding_gain(terrain_value: f64, params: &EnergyParams) -> f64 {
    params.feed_rate * terrain_value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_energy_returns_min_and_charges_full_request() {
        let mut e = Energy::new(3.0);
        assert_eq!(e.use_energy(5.0), 3.0);
        assert_eq!(e.value(), -2.0);
        assert!(!e.is_alive());

        let mut e = Energy::new(10.0);
        assert_eq!(e.use_energy(4.0), 4.0);
        assert_eq!(e.value(), 6.0);
    }

    #[test]
    fn use_energy_on_overdrawn_balance_grants_negative() {
        let mut e = Energy::new(-1.0);
        assert_eq!(e.use_energy(2.0), -1.0);
        assert_eq!(e.value(), -3.0);
    }

    #[test]
    fn drain_never_takes_more_than_positive_balance() {
        let mut e = Energy::new(2.0);
        assert_eq!(e.drain(5.0), 2.0);
        assert_eq!(e.value(), 0.0);
        assert_eq!(e.drain(1.0), 0.0);
    }

    #[test]
    fn gain_respects_cap() {
        let mut e = Energy::new(190.0);
        e.gain(50.0, 200.0);
        assert_eq!(e.value(), 200.0);
    }
}
