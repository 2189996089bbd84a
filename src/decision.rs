//! Randomness seam for everything the pipeline "decides".
//!
//! Verdicts, simulated measurements and remediation outcomes all draw
//! through `DecisionSource`, so tests can substitute a seeded source and
//! get reproducible runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::LogNormal;
use std::ops::RangeInclusive;
use std::sync::Mutex;

/// Source of the pipeline's random draws.
pub trait DecisionSource: Send + Sync {
    /// Uniform draw from a closed f64 range.
    fn uniform(&self, range: RangeInclusive<f64>) -> f64;

    /// Uniform draw from a closed integer range.
    fn int_in(&self, range: RangeInclusive<u64>) -> u64;

    /// Bernoulli draw with probability `p` of true.
    fn chance(&self, p: f64) -> bool;

    /// Pick an index in `0..len`. `len` must be non-zero.
    fn pick(&self, len: usize) -> usize;

    /// Log-normal draw for long-tailed quantities. Falls back to `exp(mu)`
    /// if the parameters are degenerate.
    fn lognormal(&self, mu: f64, sigma: f64) -> f64;
}

fn sample_lognormal<R: Rng>(rng: &mut R, mu: f64, sigma: f64) -> f64 {
    match LogNormal::new(mu, sigma) {
        Ok(dist) => rng.sample(dist),
        Err(_) => mu.exp(),
    }
}

/// Thread-rng backed source for live runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveDecisions;

impl DecisionSource for LiveDecisions {
    fn uniform(&self, range: RangeInclusive<f64>) -> f64 {
        rand::rng().random_range(range)
    }

    fn int_in(&self, range: RangeInclusive<u64>) -> u64 {
        rand::rng().random_range(range)
    }

    fn chance(&self, p: f64) -> bool {
        rand::rng().random_bool(p.clamp(0.0, 1.0))
    }

    fn pick(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }

    fn lognormal(&self, mu: f64, sigma: f64) -> f64 {
        sample_lognormal(&mut rand::rng(), mu, sigma)
    }
}

/// Deterministic source seeded from a u64, for tests and replayable demos.
pub struct SeededDecisions {
    rng: Mutex<StdRng>,
}

impl SeededDecisions {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl DecisionSource for SeededDecisions {
    fn uniform(&self, range: RangeInclusive<f64>) -> f64 {
        self.rng.lock().unwrap().random_range(range)
    }

    fn int_in(&self, range: RangeInclusive<u64>) -> u64 {
        self.rng.lock().unwrap().random_range(range)
    }

    fn chance(&self, p: f64) -> bool {
        self.rng.lock().unwrap().random_bool(p.clamp(0.0, 1.0))
    }

    fn pick(&self, len: usize) -> usize {
        self.rng.lock().unwrap().random_range(0..len)
    }

    fn lognormal(&self, mu: f64, sigma: f64) -> f64 {
        sample_lognormal(&mut *self.rng.lock().unwrap(), mu, sigma)
    }
}
