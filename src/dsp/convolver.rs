//! Convolution reverb.
//!
//! FFT overlap-add convolution against a multi-channel impulse response,
//! with the power normalization a browser `ConvolverNode` applies so that
//! the wet level does not depend on impulse length.

use std::sync::Arc;

use rand::Rng;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::buffer::AudioBuffer;
use super::noise::white_noise;

const GAIN_CALIBRATION: f64 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f64 = 44100.0;
const MIN_POWER: f64 = 0.000125;

/// Exponentially decaying stereo noise: `noise * (1 - i/len)^2`.
pub fn decaying_noise_impulse<R: Rng + ?Sized>(
    seconds: f64,
    sample_rate: u32,
    rng: &mut R,
) -> AudioBuffer {
    let frames = (seconds * sample_rate as f64).round().max(1.0) as usize;
    let channels = (0..2)
        .map(|_| {
            let mut data = white_noise(frames, rng);
            for (i, s) in data.iter_mut().enumerate() {
                let decay = 1.0 - i as f32 / frames as f32;
                *s *= decay * decay;
            }
            data
        })
        .collect();
    AudioBuffer::from_channels(channels, sample_rate)
}

/// Scale applied to the wet signal for a given impulse response.
pub fn normalization_scale(impulse: &AudioBuffer) -> f64 {
    let n_channels = impulse.num_channels();
    let len = impulse.len();
    if n_channels == 0 || len == 0 {
        return 0.0;
    }

    let sum_sq: f64 = impulse
        .channels()
        .iter()
        .flat_map(|c| c.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    let mut power = (sum_sq / (n_channels * len) as f64).sqrt();
    if !power.is_finite() || power < MIN_POWER {
        power = MIN_POWER;
    }

    let mut scale = GAIN_CALIBRATION / power;
    if impulse.sample_rate > 0 {
        scale *= GAIN_CALIBRATION_SAMPLE_RATE / impulse.sample_rate as f64;
    }
    scale
}

/// Precomputed impulse spectra for one reverb.
pub struct Convolver {
    fft_len: usize,
    block_len: usize,
    spectra: Vec<Vec<Complex<f64>>>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scale: f64,
}

impl Convolver {
    /// Prepare a normalized convolver.
    pub fn new(impulse: &AudioBuffer) -> Self {
        Self::with_scale(impulse, normalization_scale(impulse))
    }

    /// Prepare a convolver with an explicit output scale.
    pub fn with_scale(impulse: &AudioBuffer, scale: f64) -> Self {
        let ir_len = impulse.len().max(1);
        let fft_len = (2 * ir_len).next_power_of_two();
        let block_len = fft_len - ir_len + 1;

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);

        let spectra = impulse
            .channels()
            .iter()
            .map(|channel| {
                let mut spectrum = vec![Complex::new(0.0, 0.0); fft_len];
                for (bin, &s) in spectrum.iter_mut().zip(channel.iter()) {
                    bin.re = s as f64;
                }
                forward.process(&mut spectrum);
                spectrum
            })
            .collect();

        Convolver {
            fft_len,
            block_len,
            spectra,
            forward,
            inverse,
            scale,
        }
    }

    /// Convolve one input channel with impulse channel `ir_channel`.
    /// Output has the input's length; the tail past it is discarded.
    pub fn convolve_channel(&self, input: &[f32], ir_channel: usize) -> Vec<f32> {
        let mut out = vec![0.0_f64; input.len()];
        let Some(spectrum) = self.spectra.get(ir_channel) else {
            return vec![0.0; input.len()];
        };
        let norm = self.scale / self.fft_len as f64;
        let mut work = vec![Complex::new(0.0, 0.0); self.fft_len];

        for (block_idx, block) in input.chunks(self.block_len).enumerate() {
            if block.iter().all(|&s| s == 0.0) {
                continue;
            }
            let offset = block_idx * self.block_len;

            for (i, bin) in work.iter_mut().enumerate() {
                *bin = Complex::new(block.get(i).map_or(0.0, |&s| s as f64), 0.0);
            }
            self.forward.process(&mut work);
            for (bin, h) in work.iter_mut().zip(spectrum.iter()) {
                *bin = *bin * *h;
            }
            self.inverse.process(&mut work);

            for (i, bin) in work.iter().enumerate() {
                let Some(slot) = out.get_mut(offset + i) else {
                    break;
                };
                *slot += bin.re * norm;
            }
        }

        out.into_iter().map(|s| s as f32).collect()
    }

    /// Convolve a buffer into `channels` output channels. Mono inputs or
    /// impulses are up-mixed by reuse.
    pub fn process(&self, input: &AudioBuffer, channels: usize) -> AudioBuffer {
        let n_ir = self.spectra.len();
        let out = (0..channels)
            .map(|c| {
                let source = input
                    .source_channel(c)
                    .or_else(|| input.channels().first().map(Vec::as_slice));
                let ir_channel = c.min(n_ir.saturating_sub(1));
                match source {
                    Some(data) => self.convolve_channel(data, ir_channel),
                    None => vec![0.0; input.len()],
                }
            })
            .collect();
        AudioBuffer::from_channels(out, input.sample_rate)
    }
}
