use crate::rng::{derive_seed, SplitMix64};

/// Per-tick simulation context handed to every tree and behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// Monotonic tick counter.
    pub tick: u64,
    /// Simulation delta for this tick, in seconds.
    pub dt_seconds: f32,
    /// Global seed for this run.
    pub seed: u64,
}

impl TickContext {
    /// Deterministic RNG for one tree instance stream.
    pub fn rng_for_stream(&self, stream: u64) -> SplitMix64 {
        SplitMix64::new(derive_seed(self.seed, stream, 0))
    }
}
