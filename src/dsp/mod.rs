//! DSP building blocks for offline rendering.
//!
//! Everything here is deterministic given its inputs (noise takes an
//! explicit RNG), so whole renders are reproducible under a fixed seed.

pub mod automation;
pub mod buffer;
pub mod compressor;
pub mod context;
pub mod convolver;
pub mod filter;
pub mod noise;
pub mod oscillator;
pub mod panner;
pub mod shaper;

pub use automation::Automation;
pub use buffer::{AudioBuffer, cents_to_ratio};
pub use compressor::{Compressor, DynamicsParams};
pub use context::{OfflineContext, Playback};
pub use convolver::Convolver;
pub use filter::{BiquadFilter, FilterType};
pub use oscillator::{Oscillator, Waveform};
pub use shaper::Waveshaper;
