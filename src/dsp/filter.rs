//! Biquad filter matching WebAudio BiquadFilterNode coefficients.
//!
//! Coefficients follow the Audio EQ Cookbook. Shelves use slope S = 1 and
//! the corner frequency is clamped below Nyquist, as browsers do.

use std::f64::consts::{PI, SQRT_2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Peaking,
    Lowshelf,
    Highshelf,
}

/// Normalized biquad coefficients (a0 divided out).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub b: [f64; 3],
    pub a: [f64; 2],
}

impl Coefficients {
    pub const IDENTITY: Coefficients = Coefficients {
        b: [1.0, 0.0, 0.0],
        a: [0.0, 0.0],
    };

    pub fn design(kind: FilterType, sample_rate: f64, frequency: f64, q: f64, gain_db: f64) -> Self {
        if sample_rate <= 0.0 || !frequency.is_finite() {
            return Self::IDENTITY;
        }
        let frequency = frequency.clamp(1.0, sample_rate * 0.4995);
        let w0 = 2.0 * PI * frequency / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q.max(1e-4));
        let amp = 10f64.powf(gain_db / 40.0);

        let (b, a0, a) = match kind {
            FilterType::Lowpass => {
                let k = (1.0 - cos) / 2.0;
                ([k, 1.0 - cos, k], 1.0 + alpha, [-2.0 * cos, 1.0 - alpha])
            }
            FilterType::Highpass => {
                let k = (1.0 + cos) / 2.0;
                ([k, -(1.0 + cos), k], 1.0 + alpha, [-2.0 * cos, 1.0 - alpha])
            }
            FilterType::Bandpass => ([alpha, 0.0, -alpha], 1.0 + alpha, [-2.0 * cos, 1.0 - alpha]),
            FilterType::Notch => ([1.0, -2.0 * cos, 1.0], 1.0 + alpha, [-2.0 * cos, 1.0 - alpha]),
            FilterType::Peaking => (
                [1.0 + alpha * amp, -2.0 * cos, 1.0 - alpha * amp],
                1.0 + alpha / amp,
                [-2.0 * cos, 1.0 - alpha / amp],
            ),
            FilterType::Lowshelf | FilterType::Highshelf => {
                // S = 1 reduces the shelf alpha to sin/sqrt(2)
                let k = 2.0 * amp.sqrt() * sin / SQRT_2;
                let (p, m) = (amp + 1.0, amp - 1.0);
                // the high shelf is the low shelf with cos and the odd terms negated
                let sign = if kind == FilterType::Lowshelf { 1.0 } else { -1.0 };
                let c = sign * cos;
                (
                    [amp * (p - m * c + k), sign * 2.0 * amp * (m - p * c), amp * (p - m * c - k)],
                    p + m * c + k,
                    [-sign * 2.0 * (m + p * c), p + m * c - k],
                )
            }
        };

        Coefficients {
            b: [b[0] / a0, b[1] / a0, b[2] / a0],
            a: [a[0] / a0, a[1] / a0],
        }
    }
}

/// One channel of biquad filtering, Direct Form II Transposed.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    kind: FilterType,
    sample_rate: f64,
    frequency: f64,
    q: f64,
    gain_db: f64,
    coeffs: Coefficients,
    z: [f64; 2],
}

impl BiquadFilter {
    fn build(kind: FilterType, sample_rate: f64, frequency: f64, q: f64, gain_db: f64) -> Self {
        BiquadFilter {
            kind,
            sample_rate,
            frequency,
            q,
            gain_db,
            coeffs: Coefficients::design(kind, sample_rate, frequency, q, gain_db),
            z: [0.0; 2],
        }
    }

    /// WebAudio defaults: 350 Hz, Q = 1.
    pub fn new(kind: FilterType, sample_rate: f64) -> Self {
        Self::build(kind, sample_rate, 350.0, 1.0, 0.0)
    }

    pub fn with_params(kind: FilterType, sample_rate: f64, frequency: f64, q: f64) -> Self {
        Self::build(kind, sample_rate, frequency, q, 0.0)
    }

    /// A shelving (or peaking) filter with `gain_db` of boost or cut.
    pub fn shelf(kind: FilterType, sample_rate: f64, frequency: f64, gain_db: f64) -> Self {
        Self::build(kind, sample_rate, frequency, 1.0, gain_db)
    }

    pub fn kind(&self) -> FilterType {
        self.kind
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn coefficients(&self) -> Coefficients {
        self.coeffs
    }

    /// Retune the corner, keeping the filter state. Redesigns only when the
    /// value actually changes, so per-sample sweeps stay cheap on plateaus.
    pub fn set_frequency(&mut self, frequency: f64) {
        if frequency != self.frequency {
            self.frequency = frequency;
            self.coeffs = Coefficients::design(self.kind, self.sample_rate, frequency, self.q, self.gain_db);
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let Coefficients { b, a } = self.coeffs;
        let out = b[0] * input + self.z[0];
        self.z[0] = b[1] * input - a[0] * out + self.z[1];
        self.z[1] = b[2] * input - a[1] * out;
        out
    }

    pub fn process_slice(&mut self, data: &mut [f32]) {
        for s in data.iter_mut() {
            *s = self.process(*s as f64) as f32;
        }
    }

    pub fn reset(&mut self) {
        self.z = [0.0; 2];
    }
}
