//! Generic evolvable-encoding protocol: named mutation rates, copy-on-mutate,
//! and the sexual extension with a fail-closed `cross`.

use std::collections::BTreeMap;

use glam::DVec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::codec::{ByteReader, ByteWriter};
use crate::config;
use crate::error::{GenomeError, IncompatibleParents};

/// Named mutation-rate table. Every value stays in [0, 1].
///
/// Keys are kept ordered so that meta-mutation consumes the RNG in a stable order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationRates {
    rates: BTreeMap<String, f64>,
}

impl MutationRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(pairs: &[(&str, f64)]) -> Self {
        let mut rates = Self::new();
        for (key, value) in pairs {
            rates.set(key, *value);
        }
        rates
    }

    /// Missing keys read as 0 so stale tables never enable a mutation.
    pub fn get(&self, key: &str) -> f64 {
        self.rates.get(key).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, key: &str, value: f64) {
        let value = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.rates.insert(key.to_string(), value);
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.rates.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Perturb every rate by `uniform(-1, 1) * META_MUTATION`, clamped to [0, 1].
    pub fn meta_mutate(&mut self, rng: &mut impl Rng) {
        for value in self.rates.values_mut() {
            let step = rng.gen_range(-1.0..=1.0) * config::META_MUTATION;
            *value = (*value + step).clamp(0.0, 1.0);
        }
    }

    /// Number of consecutive Bernoulli successes at `key`'s rate, capped so a
    /// rate saturating near 1 cannot grow a genome without bound in one generation.
    pub fn trials(&self, key: &str, rng: &mut impl Rng) -> usize {
        let p = self.get(key);
        let mut n = 0;
        while n < config::MUTATION_RETRY_CAP && rng.gen_bool(p) {
            n += 1;
        }
        n
    }

    /// Single Bernoulli trial at `key`'s rate.
    pub fn roll(&self, key: &str, rng: &mut impl Rng) -> bool {
        rng.gen_bool(self.get(key))
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.i32(self.rates.len() as i32);
        for (key, value) in &self.rates {
            w.utf16(key);
            w.f64(*value);
        }
    }

    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, GenomeError> {
        let count = r.len()?;
        let mut rates = Self::new();
        for _ in 0..count {
            let key = r.utf16()?;
            let value = r.f64()?;
            rates.set(&key, value);
        }
        Ok(rates)
    }

    /// Mean of both parents' rates, key by key.
    pub fn blend(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (key, value) in other.iter() {
            let mine = self.rates.get(key).copied().unwrap_or(value);
            out.set(key, (mine + value) * 0.5);
        }
        out
    }
}

/// Inputs threaded into `Gene::create`: where to build and the environment's RNG.
pub struct BuildContext<'a, R: Rng> {
    pub origin: DVec2,
    pub rng: &'a mut R,
}

impl<'a, R: Rng> BuildContext<'a, R> {
    pub fn new(origin: DVec2, rng: &'a mut R) -> Self {
        Self { origin, rng }
    }
}

/// Capability shared by every evolvable encoding.
///
/// `mutate` never touches the receiver: it clones, meta-mutates the rates, then
/// lets the subtype apply structural edits driven by the already-mutated rates.
pub trait Gene: Clone {
    type Output;

    fn rates(&self) -> &MutationRates;
    fn rates_mut(&mut self) -> &mut MutationRates;

    /// Subtype structural edits; runs on the clone after meta-mutation.
    fn mutate_structure(&mut self, rng: &mut impl Rng);

    fn create<R: Rng>(&self, ctx: &mut BuildContext<'_, R>) -> Result<Self::Output, GenomeError>;

    fn serialize(&self) -> Vec<u8>;

    fn deserialize(bytes: &[u8]) -> Result<Self, GenomeError>;

    fn mutate(&self, rng: &mut impl Rng) -> Self {
        let mut child = self.clone();
        child.rates_mut().meta_mutate(rng);
        child.mutate_structure(rng);
        child
    }
}

/// Sexual extension. The threshold is part of the genome.
pub trait SexualGene: Gene {
    fn compatibility_threshold(&self) -> u32;

    fn distance(&self, other: &Self) -> u32;

    /// Recombine without checking compatibility.
    fn recombine(&self, other: &Self, min_block: usize, max_block: usize, rng: &mut impl Rng)
        -> Self;

    fn is_compatible(&self, other: &Self) -> bool {
        self.distance(other) < self.shared_threshold(other)
    }

    fn shared_threshold(&self, other: &Self) -> u32 {
        self.compatibility_threshold()
            .min(other.compatibility_threshold())
    }

    fn cross(
        &self,
        other: &Self,
        min_block: usize,
        max_block: usize,
        rng: &mut impl Rng,
    ) -> Result<Self, IncompatibleParents> {
        let distance = self.distance(other);
        let threshold = self.shared_threshold(other);
        if distance >= threshold {
            return Err(IncompatibleParents {
                distance,
                threshold,
            });
        }
        Ok(self.recombine(other, min_block, max_block, rng))
    }
}

/// Levenshtein distance over any comparable sequence.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> u32 {
    if a.is_empty() {
        return b.len() as u32;
    }
    if b.is_empty() {
        return a.len() as u32;
    }
    let mut prev: Vec<u32> = (0..=b.len() as u32).collect();
    let mut cur = vec![0u32; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        cur[0] = i as u32 + 1;
        for (j, y) in b.iter().enumerate() {
            let substitution = prev[j] + u32::from(x != y);
            cur[j + 1] = substitution.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Alternating-block crossover: copy `[min_block, max_block]`-long runs from one
/// parent then the other at the same positions, stopping when the current source
/// runs out.
pub fn block_cross<T: Clone>(
    a: &[T],
    b: &[T],
    min_block: usize,
    max_block: usize,
    rng: &mut impl Rng,
) -> Vec<T> {
    let min_block = min_block.max(1);
    let max_block = max_block.max(min_block);
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let mut from_a = rng.gen_bool(0.5);
    let mut i = 0;
    loop {
        let src = if from_a { a } else { b };
        if i >= src.len() {
            break;
        }
        let k = rng.gen_range(min_block..=max_block);
        let end = (i + k).min(src.len());
        out.extend_from_slice(&src[i..end]);
        i = end;
        from_a = !from_a;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn rates_stay_in_unit_interval_after_many_meta_mutations() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut rates = MutationRates::with(&[("a", 0.0), ("b", 1.0), ("c", 0.5)]);
        for _ in 0..5_000 {
            rates.meta_mutate(&mut rng);
            assert!(rates.iter().all(|(_, v)| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn set_clamps_and_sanitises() {
        let mut rates = MutationRates::new();
        rates.set("hi", 4.0);
        rates.set("lo", -1.0);
        rates.set("nan", f64::NAN);
        assert_eq!(rates.get("hi"), 1.0);
        assert_eq!(rates.get("lo"), 0.0);
        assert_eq!(rates.get("nan"), 0.0);
        assert_eq!(rates.get("missing"), 0.0);
    }

    #[test]
    fn saturated_rate_hits_retry_cap() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let rates = MutationRates::with(&[("grow", 1.0)]);
        assert_eq!(rates.trials("grow", &mut rng), config::MUTATION_RETRY_CAP);
        assert_eq!(rates.trials("absent", &mut rng), 0);
    }

    #[test]
    fn rate_table_round_trips_through_bytes() {
        let rates = MutationRates::with(&[("add", 0.25), ("delete", 0.75)]);
        let mut w = ByteWriter::new();
        rates.write(&mut w);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(MutationRates::read(&mut r).unwrap(), rates);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance(b"kitten", b"sitting"), 3);
        assert_eq!(edit_distance::<u8>(b"", b"abc"), 3);
        assert_eq!(edit_distance(b"same", b"same"), 0);
    }

    #[test]
    fn block_cross_only_contains_parent_material_at_matching_positions() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let a = vec![1u8; 20];
        let b = vec![2u8; 12];
        for _ in 0..50 {
            let child = block_cross(&a, &b, 1, 4, &mut rng);
            assert!(child.len() >= 12 && child.len() <= 20);
            assert!(child.iter().all(|v| *v == 1 || *v == 2));
        }
    }
}
