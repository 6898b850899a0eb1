//! Seeded pseudo-random stream shared by every pass of a run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic 32-bit integer stream.
///
/// One engine is shared by all passes and all functions of a run, so its draw order depends on
/// the order in which passes execute. The same seed and the same processing order always yield
/// the same output.
#[derive(Debug, Clone)]
pub struct RandomEngine {
    seed: u32,
    rng: StdRng,
}

impl RandomEngine {
    /// Starts a stream from `seed`.
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(u64::from(seed)),
        }
    }

    /// Draws a seed from the operating system for runs that were not given one.
    pub fn entropy_seed() -> u32 {
        rand::rng().random()
    }

    /// The seed the stream was started from.
    pub const fn seed(&self) -> u32 {
        self.seed
    }

    /// Next value of the stream.
    pub fn next_int(&mut self) -> i32 {
        self.rng.random()
    }
}
