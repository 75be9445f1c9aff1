use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codec::{ByteReader, ByteWriter};
use crate::config::{self, BrainParams};
use crate::energy::Energy;
use crate::error::GenomeError;
use crate::gene::{block_cross, BuildContext, Gene, MutationRates};

pub const RATE_ADD_NEURON: &str = "add_neuron";
pub const RATE_DELETE_NEURON: &str = "delete_neuron";
pub const RATE_ALTER_CONNECTION: &str = "alter_connection";
pub const RATE_PERTURB_PARAMS: &str = "perturb_params";

/// How a neuron turns its accumulated activation into an output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Above threshold: output = action potential, activation reset to `depolarize`.
    Spiking,
    /// Output = action potential * sigmoid(activation - threshold); never resets.
    Sigmoid,
    /// Above threshold: output = activation clamped to +-action potential, otherwise 0.
    Cutoff,
}

impl Activation {
    fn tag(self) -> u8 {
        match self {
            Activation::Spiking => 0,
            Activation::Sigmoid => 1,
            Activation::Cutoff => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, GenomeError> {
        match tag {
            0 => Ok(Activation::Spiking),
            1 => Ok(Activation::Sigmoid),
            2 => Ok(Activation::Cutoff),
            other => Err(GenomeError::UnknownKind(other)),
        }
    }
}

/// Scalar neuron parameters shared by every neuron in a brain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeuronParams {
    pub threshold: f64,
    pub decay: f64,
    pub action_potential: f64,
    pub depolarize: f64,
    pub activation: Activation,
}

impl Default for NeuronParams {
    fn default() -> Self {
        Self {
            threshold: config::DEFAULT_THRESHOLD,
            decay: config::DEFAULT_DECAY,
            action_potential: config::DEFAULT_ACTION_POTENTIAL,
            depolarize: config::DEFAULT_DEPOLARIZE,
            activation: Activation::Spiking,
        }
    }
}

/// Evolvable controller. Rows are internal neurons then output neurons; columns are
/// internal neuron outputs then external inputs. Its shape is fixed for its lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Brain {
    n_inputs: usize,
    n_internal: usize,
    n_outputs: usize,
    /// Row-major `(n_internal + n_outputs) x (n_internal + n_inputs)`.
    weights: Vec<f64>,
    activation: Vec<f64>,
    outputs: Vec<f64>,
    inputs: Vec<f64>,
    params: NeuronParams,
}

impl Brain {
    fn from_parts(
        n_inputs: usize,
        n_internal: usize,
        n_outputs: usize,
        weights: Vec<f64>,
        params: NeuronParams,
    ) -> Self {
        let rows = n_internal + n_outputs;
        debug_assert_eq!(weights.len(), rows * (n_internal + n_inputs));
        Self {
            n_inputs,
            n_internal,
            n_outputs,
            weights,
            activation: vec![0.0; rows],
            outputs: vec![0.0; rows],
            inputs: vec![0.0; n_inputs],
            params,
        }
    }

    pub fn input_count(&self) -> usize {
        self.n_inputs
    }

    pub fn internal_count(&self) -> usize {
        self.n_internal
    }

    pub fn output_count(&self) -> usize {
        self.n_outputs
    }

    pub fn params(&self) -> &NeuronParams {
        &self.params
    }

    fn cols(&self) -> usize {
        self.n_internal + self.n_inputs
    }

    /// Buffer lengths agree with the declared neuron counts.
    pub fn is_well_formed(&self) -> bool {
        let rows = self.n_internal + self.n_outputs;
        self.weights.len() == rows * self.cols()
            && self.activation.len() == rows
            && self.outputs.len() == rows
            && self.inputs.len() == self.n_inputs
    }

    /// Write an external sensed value. Out-of-range indices are reported and ignored.
    pub fn set_input(&mut self, index: usize, value: f64) {
        match self.inputs.get_mut(index) {
            Some(slot) => *slot = value,
            None => warn!(index, len = self.n_inputs, "brain input index out of range"),
        }
    }

    /// Output neuron value. Out-of-range indices are reported and read as 0.
    pub fn output(&self, index: usize) -> f64 {
        if index >= self.n_outputs {
            warn!(index, len = self.n_outputs, "brain output index out of range");
            return 0.0;
        }
        self.outputs[self.n_internal + index]
    }

    /// Activation of output neuron `index` (0 if out of range).
    pub fn output_activation(&self, index: usize) -> f64 {
        if index >= self.n_outputs {
            return 0.0;
        }
        self.activation[self.n_internal + index]
    }

    pub fn internal_activation(&self, index: usize) -> f64 {
        self.activation.get(index).copied().unwrap_or(0.0)
    }

    pub fn weight(&self, row: usize, col: usize) -> f64 {
        if row >= self.n_internal + self.n_outputs || col >= self.cols() {
            return 0.0;
        }
        self.weights[row * self.cols() + col]
    }

    /// One think step; the metabolic cost is charged to `energy`.
    pub fn tick(&mut self, energy: &mut Energy, costs: &BrainParams) {
        let p = self.params;

        for a in &mut self.activation {
            *a *= p.decay;
        }
        for o in &mut self.outputs {
            *o *= p.decay;
        }

        let cols = self.cols();
        let source: Vec<f64> = self.outputs[..self.n_internal]
            .iter()
            .chain(self.inputs.iter())
            .copied()
            .collect();
        for (row, a) in self.activation.iter_mut().enumerate() {
            let w = &self.weights[row * cols..(row + 1) * cols];
            *a += w.iter().zip(&source).map(|(w, s)| w * s).sum::<f64>();
        }

        for (a, o) in self.activation.iter_mut().zip(self.outputs.iter_mut()) {
            match p.activation {
                Activation::Spiking => {
                    if *a > p.threshold {
                        *o = p.action_potential;
                        *a = p.depolarize;
                    }
                }
                Activation::Sigmoid => {
                    *o = p.action_potential / (1.0 + (-(*a - p.threshold)).exp());
                }
                Activation::Cutoff => {
                    *o = if *a > p.threshold {
                        a.clamp(-p.action_potential, p.action_potential)
                    } else {
                        0.0
                    };
                }
            }
        }

        self.inputs.fill(0.0);

        let firing: f64 = self.outputs.iter().map(|o| o.abs()).sum();
        let cost = costs.neuron_upkeep * self.n_internal as f64 + costs.firing_cost * firing;
        energy.use_energy(cost);
    }
}

/// Gene for a brain: the neuron-slot arena plus shared neuron parameters.
///
/// Rows and columns use the same layout as [`Brain`]. Growing or shrinking builds a
/// fresh arena through [`BrainGene::remapped`]; nothing is resized in place.
#[derive(Clone, Debug, PartialEq)]
pub struct BrainGene {
    rates: MutationRates,
    n_inputs: usize,
    n_internal: usize,
    n_outputs: usize,
    weights: Vec<f64>,
    params: NeuronParams,
}

impl BrainGene {
    pub fn default_rates() -> MutationRates {
        MutationRates::with(&[
            (RATE_ADD_NEURON, config::DEFAULT_MUTATION_RATE),
            (RATE_DELETE_NEURON, config::DEFAULT_MUTATION_RATE),
            (RATE_ALTER_CONNECTION, 0.5),
            (RATE_PERTURB_PARAMS, config::DEFAULT_MUTATION_RATE),
        ])
    }

    pub fn random(n_inputs: usize, n_outputs: usize, rng: &mut impl Rng) -> Self {
        let n_internal = config::INITIAL_INTERNAL_NEURONS;
        let len = (n_internal + n_outputs) * (n_internal + n_inputs);
        let weights = (0..len)
            .map(|_| rng.gen_range(-config::WEIGHT_RANGE..config::WEIGHT_RANGE))
            .collect();
        Self {
            rates: Self::default_rates(),
            n_inputs,
            n_internal,
            n_outputs,
            weights,
            params: NeuronParams::default(),
        }
    }

    /// Explicit gene; `weights` must be row-major with the layout of [`Brain`].
    pub fn from_weights(
        n_inputs: usize,
        n_internal: usize,
        n_outputs: usize,
        weights: Vec<f64>,
        params: NeuronParams,
    ) -> Option<Self> {
        if weights.len() != (n_internal + n_outputs) * (n_internal + n_inputs) {
            return None;
        }
        Some(Self {
            rates: Self::default_rates(),
            n_inputs,
            n_internal,
            n_outputs,
            weights,
            params,
        })
    }

    pub fn input_count(&self) -> usize {
        self.n_inputs
    }

    pub fn internal_count(&self) -> usize {
        self.n_internal
    }

    pub fn output_count(&self) -> usize {
        self.n_outputs
    }

    pub fn params(&self) -> &NeuronParams {
        &self.params
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn cols(&self) -> usize {
        self.n_internal + self.n_inputs
    }

    /// Build a new weight arena of the given shape. `row_src`/`col_src` map each new
    /// slot to the old slot it inherits from; `None` slots are filled by `fresh`.
    fn remapped(
        &self,
        n_inputs: usize,
        n_internal: usize,
        n_outputs: usize,
        row_src: impl Fn(usize) -> Option<usize>,
        col_src: impl Fn(usize) -> Option<usize>,
        mut fresh: impl FnMut() -> f64,
    ) -> Self {
        let old_cols = self.cols();
        let new_cols = n_internal + n_inputs;
        let rows = n_internal + n_outputs;
        let mut weights = Vec::with_capacity(rows * new_cols);
        for r in 0..rows {
            for c in 0..new_cols {
                let w = match (row_src(r), col_src(c)) {
                    (Some(or), Some(oc)) => self.weights[or * old_cols + oc],
                    _ => fresh(),
                };
                weights.push(w);
            }
        }
        Self {
            rates: self.rates.clone(),
            n_inputs,
            n_internal,
            n_outputs,
            weights,
            params: self.params,
        }
    }

    /// Append an internal neuron with an all-zero row and column.
    pub fn with_added_neuron(&self) -> Self {
        let k = self.n_internal;
        self.remapped(
            self.n_inputs,
            k + 1,
            self.n_outputs,
            |r| match r {
                r if r < k => Some(r),
                r if r == k => None,
                r => Some(r - 1),
            },
            |c| match c {
                c if c < k => Some(c),
                c if c == k => None,
                c => Some(c - 1),
            },
            || 0.0,
        )
    }

    /// Drop internal neuron `victim`'s row and column.
    pub fn with_deleted_neuron(&self, victim: usize) -> Self {
        if victim >= self.n_internal {
            return self.clone();
        }
        let skip = |i: usize| Some(if i < victim { i } else { i + 1 });
        self.remapped(
            self.n_inputs,
            self.n_internal - 1,
            self.n_outputs,
            skip,
            skip,
            || 0.0,
        )
    }

    /// Reshape to new sense/actuator counts, keeping overlapping weights and
    /// filling new ones randomly.
    pub fn with_io(&self, n_inputs: usize, n_outputs: usize, rng: &mut impl Rng) -> Self {
        if n_inputs == self.n_inputs && n_outputs == self.n_outputs {
            return self.clone();
        }
        let k = self.n_internal;
        let (old_in, old_out) = (self.n_inputs, self.n_outputs);
        self.remapped(
            n_inputs,
            k,
            n_outputs,
            |r| (r < k || r - k < old_out).then_some(r),
            |c| (c < k || c - k < old_in).then_some(c),
            || rng.gen_range(-config::WEIGHT_RANGE..config::WEIGHT_RANGE),
        )
    }

    fn alter_connection(&mut self, rng: &mut impl Rng) {
        if self.weights.is_empty() {
            return;
        }
        let i = rng.gen_range(0..self.weights.len());
        self.weights[i] = rng.gen_range(-config::WEIGHT_RANGE..config::WEIGHT_RANGE);
    }

    fn perturb_params(&mut self, rng: &mut impl Rng) {
        let mut jitter = |v: f64| v + rng.gen_range(-1.0..=1.0) * config::PARAM_SIGMA;
        let p = &mut self.params;
        p.threshold = jitter(p.threshold).max(0.01);
        p.decay = jitter(p.decay).clamp(0.01, 0.99);
        p.action_potential = jitter(p.action_potential).max(0.0);
        p.depolarize = jitter(p.depolarize).min(0.0);
    }
}

impl BrainGene {
    /// Block crossover of the weight arenas when both parents share a shape;
    /// otherwise the child takes one parent's brain whole.
    pub fn recombine(
        &self,
        other: &Self,
        min_block: usize,
        max_block: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let same_shape = self.n_inputs == other.n_inputs
            && self.n_internal == other.n_internal
            && self.n_outputs == other.n_outputs;
        if !same_shape {
            return if rng.gen_bool(0.5) {
                self.clone()
            } else {
                other.clone()
            };
        }
        let weights = block_cross(&self.weights, &other.weights, min_block, max_block, rng);
        Self {
            rates: self.rates.blend(&other.rates),
            n_inputs: self.n_inputs,
            n_internal: self.n_internal,
            n_outputs: self.n_outputs,
            weights,
            params: if rng.gen_bool(0.5) {
                self.params
            } else {
                other.params
            },
        }
    }
}

impl Gene for BrainGene {
    type Output = Brain;

    fn rates(&self) -> &MutationRates {
        &self.rates
    }

    fn rates_mut(&mut self) -> &mut MutationRates {
        &mut self.rates
    }

    fn mutate_structure(&mut self, rng: &mut impl Rng) {
        let adds = self.rates.trials(RATE_ADD_NEURON, rng);
        for _ in 0..adds {
            if self.n_internal >= config::MAX_INTERNAL_NEURONS {
                break;
            }
            *self = self.with_added_neuron();
        }

        if self.n_internal > 0 && self.rates.roll(RATE_DELETE_NEURON, rng) {
            let victim = rng.gen_range(0..self.n_internal);
            *self = self.with_deleted_neuron(victim);
        }

        let alters = self.rates.trials(RATE_ALTER_CONNECTION, rng);
        for _ in 0..alters {
            self.alter_connection(rng);
        }

        if self.rates.roll(RATE_PERTURB_PARAMS, rng) {
            self.perturb_params(rng);
        }
    }

    fn create<R: Rng>(&self, _ctx: &mut BuildContext<'_, R>) -> Result<Brain, GenomeError> {
        Ok(self.build())
    }

    fn serialize(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        write_brain_gene(self, &mut w);
        w.into_bytes()
    }

    fn deserialize(bytes: &[u8]) -> Result<Self, GenomeError> {
        let mut r = ByteReader::new(bytes);
        let gene = read_brain_gene(&mut r)?;
        r.finish()?;
        Ok(gene)
    }
}

impl BrainGene {
    /// Express without an environment; brains need no placement or RNG.
    pub fn build(&self) -> Brain {
        Brain::from_parts(
            self.n_inputs,
            self.n_internal,
            self.n_outputs,
            self.weights.clone(),
            self.params,
        )
    }
}

pub(crate) fn write_brain_gene(gene: &BrainGene, w: &mut ByteWriter) {
    gene.rates.write(w);
    w.i32(gene.n_inputs as i32);
    w.i32(gene.n_internal as i32);
    w.i32(gene.n_outputs as i32);
    w.f64(gene.params.threshold);
    w.f64(gene.params.decay);
    w.f64(gene.params.action_potential);
    w.f64(gene.params.depolarize);
    w.u8(gene.params.activation.tag());
    for v in &gene.weights {
        w.f64(*v);
    }
}

pub(crate) fn read_brain_gene(r: &mut ByteReader<'_>) -> Result<BrainGene, GenomeError> {
    let rates = MutationRates::read(r)?;
    let n_inputs = r.len()?;
    let n_internal = r.len()?;
    let n_outputs = r.len()?;
    let params = NeuronParams {
        threshold: r.f64()?,
        decay: r.f64()?,
        action_potential: r.f64()?,
        depolarize: r.f64()?,
        activation: Activation::from_tag(r.u8()?)?,
    };
    let len = (n_internal + n_outputs) * (n_internal + n_inputs);
    if len.saturating_mul(8) > r.remaining() {
        return Err(GenomeError::Truncated {
            offset: r.remaining(),
        });
    }
    let mut weights = Vec::with_capacity(len);
    for _ in 0..len {
        weights.push(r.f64()?);
    }
    Ok(BrainGene {
        rates,
        n_inputs,
        n_internal,
        n_outputs,
        weights,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn single_output_brain(weight: f64, params: NeuronParams) -> Brain {
        BrainGene::from_weights(1, 0, 1, vec![weight], params)
            .unwrap()
            .build()
    }

    fn no_costs() -> BrainParams {
        BrainParams {
            neuron_upkeep: 0.0,
            firing_cost: 0.0,
        }
    }

    #[test]
    fn spiking_neuron_fires_then_depolarizes() {
        let params = NeuronParams {
            threshold: 1.0,
            decay: 0.5,
            action_potential: 2.0,
            depolarize: -0.5,
            activation: Activation::Spiking,
        };
        let mut brain = single_output_brain(1.5, params);
        let mut energy = Energy::new(10.0);

        brain.set_input(0, 1.0);
        brain.tick(&mut energy, &no_costs());
        assert_eq!(brain.output(0), 2.0);
        assert_eq!(brain.output_activation(0), -0.5);

        brain.tick(&mut energy, &no_costs());
        assert_eq!(brain.output_activation(0), -0.25);
        assert_eq!(brain.output(0), 1.0);
    }

    #[test]
    fn inputs_are_cleared_after_tick() {
        let mut brain = single_output_brain(0.4, NeuronParams::default());
        let mut energy = Energy::new(10.0);
        brain.set_input(0, 1.0);
        brain.tick(&mut energy, &no_costs());
        let after_first = brain.output_activation(0);
        brain.tick(&mut energy, &no_costs());
        assert_eq!(brain.output_activation(0), after_first * 0.5);
    }

    #[test]
    fn out_of_range_io_is_a_noop() {
        let mut brain = single_output_brain(1.0, NeuronParams::default());
        brain.set_input(7, 99.0);
        assert_eq!(brain.output(3), 0.0);
    }

    #[test]
    fn tick_charges_upkeep_and_firing_cost() {
        let gene = BrainGene::from_weights(
            1,
            1,
            1,
            vec![0.0, 0.0, 0.0, 5.0],
            NeuronParams::default(),
        )
        .unwrap();
        let mut brain = gene.build();
        let mut energy = Energy::new(1.0);
        brain.set_input(0, 1.0);
        brain.tick(
            &mut energy,
            &BrainParams {
                neuron_upkeep: 0.1,
                firing_cost: 0.01,
            },
        );
        let expected = 1.0 - (0.1 + 0.01 * config::DEFAULT_ACTION_POTENTIAL);
        assert!((energy.value() - expected).abs() < 1e-12);
    }

    #[test]
    fn added_neuron_is_causally_inert() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let gene = BrainGene::random(3, 2, &mut rng);
        let grown = gene.with_added_neuron();
        assert_eq!(grown.internal_count(), gene.internal_count() + 1);

        let k = gene.internal_count();
        let cols = grown.internal_count() + grown.input_count();
        for c in 0..cols {
            assert_eq!(grown.weights()[k * cols + c], 0.0);
        }
        let rows = grown.internal_count() + grown.output_count();
        for r in 0..rows {
            assert_eq!(grown.weights()[r * cols + k], 0.0);
        }
        // Input weights of the first output row survive the remap.
        let old_cols = gene.internal_count() + gene.input_count();
        let old_row = &gene.weights()[k * old_cols..(k + 1) * old_cols];
        let new_row = &grown.weights()[(k + 1) * cols..(k + 2) * cols];
        assert_eq!(&new_row[k + 1..], &old_row[k..]);
    }

    #[test]
    fn deleted_neuron_drops_row_and_column() {
        let weights: Vec<f64> = (0..16).map(f64::from).collect();
        // 2 internal, 2 inputs, 2 outputs -> 4x4
        let gene = BrainGene::from_weights(2, 2, 2, weights, NeuronParams::default()).unwrap();
        let shrunk = gene.with_deleted_neuron(0);
        assert_eq!(shrunk.internal_count(), 1);
        // rows 1,2,3 and cols 1,2,3 of the original
        assert_eq!(
            shrunk.weights(),
            &[5.0, 6.0, 7.0, 9.0, 10.0, 11.0, 13.0, 14.0, 15.0]
        );
    }

    #[test]
    fn mutate_leaves_receiver_unchanged() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let gene = BrainGene::random(4, 3, &mut rng);
        let before = gene.clone();
        for _ in 0..20 {
            let _child = gene.mutate(&mut rng);
        }
        assert_eq!(gene, before);
    }

    #[test]
    fn saturated_add_rate_is_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut gene = BrainGene::random(2, 2, &mut rng);
        gene.rates_mut().set(RATE_ADD_NEURON, 1.0);
        gene.rates_mut().set(RATE_DELETE_NEURON, 0.0);
        let child = gene.mutate(&mut rng);
        assert!(child.internal_count() <= gene.internal_count() + config::MUTATION_RETRY_CAP);
    }

    #[test]
    fn with_io_keeps_overlap() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let gene = BrainGene::random(3, 2, &mut rng);
        let wider = gene.with_io(5, 4, &mut rng);
        assert_eq!(wider.input_count(), 5);
        assert_eq!(wider.output_count(), 4);
        let old_cols = gene.internal_count() + 3;
        let new_cols = wider.internal_count() + 5;
        for r in 0..gene.internal_count() + 2 {
            for c in 0..old_cols {
                assert_eq!(wider.weights()[r * new_cols + c], gene.weights()[r * old_cols + c]);
            }
        }
    }

    #[test]
    fn same_shape_recombination_mixes_weights() {
        let a = BrainGene::from_weights(1, 0, 4, vec![1.0; 4], NeuronParams::default()).unwrap();
        let b = BrainGene::from_weights(1, 0, 4, vec![2.0; 4], NeuronParams::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let child = a.recombine(&b, 1, 1, &mut rng);
        assert_eq!(child.weights().len(), 4);
        assert!(child.weights().contains(&1.0) && child.weights().contains(&2.0));
    }

    #[test]
    fn create_expresses_the_same_brain_as_build() {
        let mut rng = ChaCha8Rng::seed_from_u64(29);
        let gene = BrainGene::random(4, 3, &mut rng).with_added_neuron();
        let created = gene
            .create(&mut BuildContext::new(glam::DVec2::ZERO, &mut rng))
            .unwrap();
        let built = gene.build();
        assert_eq!(created.input_count(), built.input_count());
        assert_eq!(created.internal_count(), built.internal_count());
        assert_eq!(created.output_count(), built.output_count());
        assert_eq!(created.params(), built.params());
        let rows = built.internal_count() + built.output_count();
        let cols = built.internal_count() + built.input_count();
        for row in 0..rows {
            for col in 0..cols {
                assert_eq!(created.weight(row, col), built.weight(row, col));
            }
        }
    }

    #[test]
    fn serialization_round_trips() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let gene = BrainGene::random(3, 2, &mut rng).mutate(&mut rng);
        let back = BrainGene::deserialize(&gene.serialize()).unwrap();
        assert_eq!(back, gene);
    }

    #[test]
    fn truncated_bytes_fail_to_parse() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let bytes = BrainGene::random(3, 2, &mut rng).serialize();
        assert!(BrainGene::deserialize(&bytes[..bytes.len() - 3]).is_err());
    }
}
