//! Rolling population statistics for the headless runner.

use crate::environment::{Environment, TickReport};

/// Ring buffer that stores the last N samples of a metric.
#[derive(Clone, Debug)]
pub struct RingBuffer {
    data: Vec<f64>,
    head: usize,
    len: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn push(&mut self, value: f64) {
        let cap = self.capacity();
        self.data[self.head] = value;
        self.head = (self.head + 1) % cap;
        if self.len < cap {
            self.len += 1;
        }
    }

    /// Return samples in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let cap = self.capacity();
        let start = if self.len < cap { 0 } else { self.head };
        (0..self.len).map(move |i| self.data[(start + i) % cap])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn last(&self) -> Option<f64> {
        if self.len == 0 {
            None
        } else {
            let cap = self.capacity();
            Some(self.data[(self.head + cap - 1) % cap])
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.len == 0 {
            None
        } else {
            Some(self.iter().sum::<f64>() / self.len as f64)
        }
    }
}

/// Population summary at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Census {
    pub population: usize,
    pub mean_energy: f64,
    pub mean_generation: f64,
    pub max_generation: u32,
}

impl Census {
    pub fn of(env: &Environment) -> Self {
        let mut census = Census::default();
        let mut total_energy = 0.0;
        let mut total_generation = 0.0;
        for (_, org) in env.organisms().iter() {
            census.population += 1;
            total_energy += org.energy.value();
            total_generation += f64::from(org.generation);
            census.max_generation = census.max_generation.max(org.generation);
        }
        if census.population > 0 {
            census.mean_energy = total_energy / census.population as f64;
            census.mean_generation = total_generation / census.population as f64;
        }
        census
    }
}

/// All tracked simulation statistics.
#[derive(Clone, Debug)]
pub struct SimStats {
    pub population: RingBuffer,
    pub avg_energy: RingBuffer,
    pub avg_generation: RingBuffer,
    pub births: RingBuffer,
    pub deaths: RingBuffer,

    /// Totals since the last sample.
    pub pending: TickReport,
    /// Totals since the run started.
    pub lifetime: TickReport,
    pub sample_interval: u64,
    pub tick_counter: u64,
}

impl SimStats {
    pub fn new(capacity: usize, sample_interval: u64) -> Self {
        Self {
            population: RingBuffer::new(capacity),
            avg_energy: RingBuffer::new(capacity),
            avg_generation: RingBuffer::new(capacity),
            births: RingBuffer::new(capacity),
            deaths: RingBuffer::new(capacity),
            pending: TickReport::default(),
            lifetime: TickReport::default(),
            sample_interval: sample_interval.max(1),
            tick_counter: 0,
        }
    }

    /// Fold in one tick. Returns true when this tick closed a sample.
    pub fn record(&mut self, census: &Census, report: &TickReport) -> bool {
        self.pending.absorb(report);
        self.lifetime.absorb(report);

        self.tick_counter += 1;
        if self.tick_counter % self.sample_interval != 0 {
            return false;
        }

        self.population.push(census.population as f64);
        self.avg_energy.push(census.mean_energy);
        self.avg_generation.push(census.mean_generation);
        self.births.push(self.pending.births as f64);
        self.deaths.push(self.pending.deaths as f64);
        self.pending = TickReport::default();
        true
    }
}
