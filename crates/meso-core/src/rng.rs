//! Deterministic per-conflux RNG.
//!
//! # Determinism strategy
//!
//! Each conflux owns an independent `SmallRng` seeded by:
//!
//!   seed = global_seed XOR (conflux_id * MIXING_CONSTANT)
//!
//! The mixing constant is the 64-bit fractional part of the golden ratio,
//! which spreads consecutive IDs uniformly across the seed space.  Because a
//! conflux draws from its own stream only while it is being updated, the
//! sequence of tie-breaks it sees depends on the seed and its own state, never
//! on which worker thread runs it or in which order workers finish.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::ConfluxId;

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

// ── ConfluxRng ────────────────────────────────────────────────────────────────

/// Per-conflux deterministic RNG used for candidate tie-breaks.
#[derive(Clone, Debug)]
pub struct ConfluxRng(SmallRng);

impl ConfluxRng {
    /// Seed deterministically from the run's global seed and a conflux ID.
    pub fn new(global_seed: u64, conflux: ConfluxId) -> Self {
        let seed = global_seed ^ (conflux.0 as u64).wrapping_mul(MIXING_CONSTANT);
        ConfluxRng(SmallRng::seed_from_u64(seed))
    }

    /// Fair coin: `true` with probability 0.5.
    #[inline]
    pub fn coin_flip(&mut self) -> bool {
        self.0.gen_bool(0.5)
    }

    /// `true` with probability `p` (clamped to [0, 1]).
    #[inline]
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.0.gen_bool(p.clamp(0.0, 1.0))
    }
}
