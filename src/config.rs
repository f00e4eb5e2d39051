//! Engine configuration and random stream derivation.
//!
//! Every stage draws its randomness (noise seeds, humanization, grace
//! notes, impulse responses, stutter) from a stream created here. With no
//! seed the streams are seeded from OS entropy, so each render differs;
//! with a seed every stream is reproducible and independent of the others.

use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

/// Default render sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Global engine settings shared by all pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Output sample rate for every rendered buffer.
    pub sample_rate: u32,
    /// Deterministic seed. `None` keeps the default nondeterministic behaviour.
    pub seed: Option<u64>,
    /// Apply timing/velocity humanization in the sequencer.
    pub humanize: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            seed: None,
            humanize: true,
        }
    }
}

impl EngineConfig {
    /// Config with a fixed seed and otherwise default values.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Creates the random stream for one pipeline component.
    pub fn rng(&self, stream: &str) -> Pcg64 {
        match self.seed {
            Some(seed) => Pcg64::seed_from_u64(derive_stream_seed(seed, stream)),
            None => Pcg64::from_entropy(),
        }
    }

    /// Sample rate as `f64`, for DSP arithmetic.
    pub fn sample_rate_f64(&self) -> f64 {
        self.sample_rate as f64
    }
}

/// Derives an independent seed for a named stream with BLAKE3.
pub fn derive_stream_seed(base_seed: u64, stream: &str) -> u64 {
    let mut input = Vec::with_capacity(8 + stream.len());
    input.extend_from_slice(&base_seed.to_le_bytes());
    input.extend_from_slice(stream.as_bytes());

    let hash = blake3::hash(&input);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}
