//! Periodic oscillators in the manner of OscillatorNode.
//!
//! The caller supplies the instantaneous frequency every sample, which is
//! how both automation sweeps and FM reach the oscillator. Detune scales
//! that frequency, so a modulated tone detunes as a whole. Saw and square
//! edges are smoothed with PolyBLEP.

use std::f64::consts::TAU;

use super::buffer::cents_to_ratio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    detune_ratio: f64,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            detune_ratio: 1.0,
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn with_detune(mut self, cents: f64) -> Self {
        self.detune_ratio = cents_to_ratio(cents);
        self
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Emit one sample at `frequency` Hz and advance the phase. Negative
    /// frequencies (deep FM) run the phase backwards.
    pub fn tick(&mut self, frequency: f64) -> f64 {
        let inc = frequency * self.detune_ratio / self.sample_rate;
        let out = shape(self.waveform, self.phase, inc.abs());
        self.phase = (self.phase + inc).rem_euclid(1.0);
        out
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Waveform value at `phase` in [0, 1), band-limited for increment `dt`.
pub fn shape(waveform: Waveform, phase: f64, dt: f64) -> f64 {
    match waveform {
        Waveform::Sine => (TAU * phase).sin(),
        Waveform::Sawtooth => 2.0 * phase - 1.0 - poly_blep(phase, dt),
        Waveform::Square => {
            let naive = if phase < 0.5 { 1.0 } else { -1.0 };
            naive + poly_blep(phase, dt) - poly_blep((phase + 0.5).fract(), dt)
        }
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
    }
}

/// Two-sample polynomial residual of a unit step at phase 0.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 || dt >= 0.5 {
        return 0.0;
    }
    if t < dt {
        let x = t / dt;
        2.0 * x - x * x - 1.0
    } else if t > 1.0 - dt {
        let x = (t - 1.0) / dt;
        x * x + 2.0 * x + 1.0
    } else {
        0.0
    }
}
