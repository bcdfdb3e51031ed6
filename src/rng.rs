// Copyright 2025 Cowboy AI, LLC.

//! Deterministic random supply for the simulation
//!
//! A single seed threads through one counter-based generator. Subsystems that
//! draw randomness (placement, target selection, template sampling, lineage
//! distances) each receive the generator as an explicit argument; nothing in
//! the crate touches process-global random state. Labelled sub-streams let a
//! new consumer be added without perturbing the draw sequence seen by
//! existing consumers.

use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded counter-based generator threaded through the engine
#[derive(Debug, Clone)]
pub struct EngineRng {
    seed: u64,
    rng: ChaCha8Rng,
}

impl EngineRng {
    /// Create the root generator for a run
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The seed this generator (and all of its sub-streams) descends from
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Derive an independent sub-stream for a named consumer
    ///
    /// ChaCha exposes 2^64 independent streams per seed; the label is hashed
    /// into a stream index so the mapping is stable across runs.
    pub fn derive(&self, label: &str) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(fnv1a(label));
        Self {
            seed: self.seed,
            rng,
        }
    }

    /// Uniform draw in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform draw in [low, high)
    pub fn range_f64(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..high)
    }

    /// Uniform draw in [0, bound)
    pub fn range_usize(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        self.rng.gen_range(0..bound)
    }

    /// Bernoulli draw with probability `p`
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Pick an index proportionally to `weights`; `None` when all weights
    /// are zero or the slice is empty
    pub fn pick_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        match WeightedIndex::new(weights) {
            Ok(dist) => Some(dist.sample(&mut self.rng)),
            Err(WeightedError::AllWeightsZero) | Err(WeightedError::NoItem) => None,
            Err(_) => None,
        }
    }

    /// Standard-normal draw via the Box-Muller transform
    pub fn gaussian(&mut self, mean: f64, sigma: f64) -> f64 {
        // u1 must be nonzero for the log
        let mut u1 = self.next_f64();
        if u1 <= f64::MIN_POSITIVE {
            u1 = f64::MIN_POSITIVE;
        }
        let u2 = self.next_f64();
        let mag = (-2.0 * u1.ln()).sqrt();
        mean + sigma * mag * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Unit direction vector of dimension `dim`, via normalised gaussians
    pub fn unit_vector(&mut self, dim: usize) -> Vec<f64> {
        loop {
            let v: Vec<f64> = (0..dim).map(|_| self.gaussian(0.0, 1.0)).collect();
            let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > 1e-12 {
                return v.into_iter().map(|x| x / norm).collect();
            }
        }
    }
}

impl RngCore for EngineRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

fn fnv1a(label: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in label.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
