//! Seeded decision source
//!
//! Every randomized choice the harness makes is drawn from one
//! [`RandomPolicy`]. The policy is seeded once, so the same seed and the same
//! sequence of calls always produce the same sequence of decisions.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Seeded generator answering yes/no and range questions.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    seed: u64,
    rng: StdRng,
}

impl RandomPolicy {
    /// Create a policy from an explicit seed.
    pub fn from_seed(seed: u64) -> Self {
        RandomPolicy {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Derive an independent policy from a caller-owned generator.
    ///
    /// Consumes exactly one `u64` from `parent`, so callers that keep using
    /// their generator stay reproducible.
    pub fn substream<R: RngCore + ?Sized>(parent: &mut R) -> Self {
        Self::from_seed(parent.next_u64())
    }

    /// Seed this policy was created with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// True with probability `1/n`. `n <= 1` is always true.
    pub fn one_in(&mut self, n: u32) -> bool {
        n <= 1 || self.rng.gen_range(0..n) == 0
    }

    /// Fair coin flip
    pub fn coin(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    /// Uniform integer in `[lo, hi]`; `hi < lo` yields `lo`.
    pub fn int_in(&mut self, lo: u64, hi: u64) -> u64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }
}
