//! Evaluation session - run-wide mutable context
//!
//! Level 4 - Utilities and configuration
//!
//! Carries the generation counter, the match id sequence and the seeded
//! RNG used for shuffles and per-match seeds. Passed explicitly to every
//! evaluation call.

use std::ops::Range;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Mutable state shared across every batch of a run
#[derive(Clone, Debug)]
pub struct EvalSession {
    generation: u32,
    next_match_id: u64,
    seed: u64,
    rng: ChaCha8Rng,
}

impl EvalSession {
    pub fn new(seed: u64) -> Self {
        Self {
            generation: 0,
            next_match_id: 0,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Current generation (0 before the first `begin_generation`)
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Advance to the next generation and return its number
    pub fn begin_generation(&mut self) -> u32 {
        self.generation += 1;
        self.generation
    }

    /// Reserve `n` consecutive match ids; ids never repeat within a session
    pub fn allocate_match_ids(&mut self, n: usize) -> Range<u64> {
        let start = self.next_match_id;
        self.next_match_id += n as u64;
        start..self.next_match_id
    }

    /// Seed for one engine run
    pub fn next_seed(&mut self) -> u64 {
        self.rng.next_u64()
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

impl Default for EvalSession {
    fn default() -> Self {
        Self::new(42)
    }
}
