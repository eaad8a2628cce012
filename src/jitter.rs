//! Randomized timing.
//!
//! Every random decision in the engine goes through [`Jitter`] so that runs
//! can be made reproducible (seeded) or fully deterministic in tests.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of randomness for timing and selection decisions.
pub trait Jitter: Send + Sync {
    /// Uniform sample in `[lo, hi]`. Returns `lo` when the range is empty.
    fn uniform(&self, lo: f64, hi: f64) -> f64;

    /// True with probability `p` (clamped to `[0, 1]`).
    fn chance(&self, p: f64) -> bool;

    /// Uniform index in `0..n`. `n` must be non-zero.
    fn index(&self, n: usize) -> usize;
}

/// [`Jitter`] backed by a seedable standard RNG.
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    /// Reproducible sequence from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Seeded when `seed` is given, from entropy otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new(seed),
            None => Self::from_entropy(),
        }
    }
}

impl Jitter for SeededJitter {
    fn uniform(&self, lo: f64, hi: f64) -> f64 {
        if lo.is_nan() || hi.is_nan() || hi <= lo {
            return lo;
        }
        self.rng.lock().random_range(lo..=hi)
    }

    fn chance(&self, p: f64) -> bool {
        self.rng.lock().random_bool(p.clamp(0.0, 1.0))
    }

    fn index(&self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        self.rng.lock().random_range(0..n)
    }
}

/// Deterministic [`Jitter`]: midpoints, never fires chance events, always
/// picks the first index.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn uniform(&self, lo: f64, hi: f64) -> f64 {
        if hi > lo { (lo + hi) / 2.0 } else { lo }
    }

    fn chance(&self, _p: f64) -> bool {
        false
    }

    fn index(&self, _n: usize) -> usize {
        0
    }
}
