//! Feed-forward dynamics compressor modelled on DynamicsCompressorNode.
//!
//! The detector is a peak follower linked across every channel of a frame,
//! so the stereo image never shifts under gain reduction. There is no
//! automatic makeup gain; callers add their own after the stage.

use super::buffer::AudioBuffer;

/// Static curve and timing of a compressor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicsParams {
    pub threshold_db: f64,
    /// Soft-knee width in dB; 0 is a hard knee.
    pub knee_db: f64,
    pub ratio: f64,
    /// Seconds.
    pub attack: f64,
    /// Seconds.
    pub release: f64,
}

impl Default for DynamicsParams {
    /// The browser defaults, also used as the vocal glue compressor.
    fn default() -> Self {
        DynamicsParams {
            threshold_db: -24.0,
            knee_db: 30.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

impl DynamicsParams {
    /// Clamp every field to the range a DynamicsCompressorNode accepts.
    pub fn clamped(self) -> Self {
        DynamicsParams {
            threshold_db: self.threshold_db.clamp(-100.0, 0.0),
            knee_db: self.knee_db.clamp(0.0, 40.0),
            ratio: self.ratio.clamp(1.0, 20.0),
            attack: self.attack.clamp(0.0001, 1.0),
            release: self.release.clamp(0.001, 1.0),
        }
    }

    /// Gain change in dB (≤ 0) for a detector level in dB.
    pub fn gain_db(&self, level_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio;
        let over = level_db - self.threshold_db;
        let half = self.knee_db / 2.0;
        if over <= -half {
            0.0
        } else if over >= half || self.knee_db <= 0.0 {
            -over * slope
        } else {
            let x = over + half;
            -slope * x * x / (2.0 * self.knee_db)
        }
    }
}

fn to_db(linear: f64) -> f64 {
    if linear <= 1e-6 { -120.0 } else { 20.0 * linear.log10() }
}

#[derive(Debug, Clone)]
pub struct Compressor {
    params: DynamicsParams,
    attack_coef: f64,
    release_coef: f64,
    envelope: f64,
}

impl Compressor {
    /// A compressor with [`DynamicsParams::default`].
    pub fn new(sample_rate: f64) -> Self {
        Self::with(sample_rate, DynamicsParams::default())
    }

    pub fn with(sample_rate: f64, params: DynamicsParams) -> Self {
        let params = params.clamped();
        let sr = sample_rate.max(1.0);
        Compressor {
            params,
            attack_coef: (-1.0 / (params.attack * sr)).exp(),
            release_coef: (-1.0 / (params.release * sr)).exp(),
            envelope: 0.0,
        }
    }

    pub fn params(&self) -> &DynamicsParams {
        &self.params
    }

    /// Advance the detector by one frame and return the linear gain for it.
    pub fn next_gain(&mut self, level: f64) -> f64 {
        let coef = if level > self.envelope { self.attack_coef } else { self.release_coef };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;
        10f64.powf(self.params.gain_db(to_db(self.envelope)) / 20.0)
    }

    /// Compress every channel of `buffer` in place with a linked detector.
    pub fn process_buffer(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.num_channels();
        for i in 0..buffer.len() {
            let level = (0..channels)
                .map(|c| buffer.channel(c)[i].abs() as f64)
                .fold(0.0, f64::max);
            let gain = self.next_gain(level);
            for c in 0..channels {
                let s = &mut buffer.channel_mut(c)[i];
                *s = (*s as f64 * gain) as f32;
            }
        }
    }

    /// Current gain reduction in dB, as a positive number.
    pub fn gain_reduction_db(&self) -> f64 {
        -self.params.gain_db(to_db(self.envelope))
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44_100.0;

    fn hard(threshold_db: f64, ratio: f64, attack: f64, release: f64) -> Compressor {
        Compressor::with(
            SR,
            DynamicsParams {
                threshold_db,
                knee_db: 0.0,
                ratio,
                attack,
                release,
            },
        )
    }

    fn run(comp: &mut Compressor, level: f64, frames: usize) -> f64 {
        let mut gain = 1.0;
        for _ in 0..frames {
            gain = comp.next_gain(level);
        }
        gain * level
    }

    #[test]
    fn quiet_signals_pass_untouched() {
        let mut comp = hard(-20.0, 4.0, 0.001, 0.1);
        let out = run(&mut comp, 0.05, 2000);
        assert!((out - 0.05).abs() < 1e-6, "got {out}");
        assert_eq!(comp.gain_reduction_db(), 0.0);
    }

    #[test]
    fn limiter_settles_at_ratio() {
        let mut limiter = hard(-10.0, 20.0, 0.001, 0.1);
        let out = run(&mut limiter, 1.0, 10_000);
        // 10 dB over at 20:1 leaves 0.5 dB over the threshold
        let expected = 10f64.powf(-9.5 / 20.0);
        assert!((out - expected).abs() < 0.01, "expected {expected}, got {out}");
    }

    #[test]
    fn soft_knee_is_continuous() {
        let p = DynamicsParams::default();
        let lower = p.threshold_db - p.knee_db / 2.0;
        let upper = p.threshold_db + p.knee_db / 2.0;
        assert!(p.gain_db(lower + 1e-9).abs() < 1e-6);
        assert!((p.gain_db(upper - 1e-9) - p.gain_db(upper + 1e-9)).abs() < 1e-6);
        assert!(p.gain_db(p.threshold_db) < 0.0);
    }

    #[test]
    fn attack_then_release() {
        let mut comp = hard(-20.0, 10.0, 0.01, 0.05);
        let first = comp.next_gain(1.0);
        let squeezed = run(&mut comp, 1.0, 2000);
        assert!(first > squeezed);
        let held = run(&mut comp, 0.1, 1);
        let recovered = run(&mut comp, 0.1, 10_000);
        assert!(recovered > held);
    }

    #[test]
    fn params_are_clamped() {
        let p = DynamicsParams {
            threshold_db: 12.0,
            knee_db: 90.0,
            ratio: 0.5,
            attack: 0.0,
            release: 9.0,
        }
        .clamped();
        assert_eq!((p.threshold_db, p.knee_db, p.ratio), (0.0, 40.0, 1.0));
        assert_eq!((p.attack, p.release), (0.0001, 1.0));
    }

    #[test]
    fn linked_detector_keeps_balance() {
        let mut buf = AudioBuffer::from_channels(vec![vec![0.9; 8000], vec![0.3; 8000]], 8000);
        Compressor::new(8000.0).process_buffer(&mut buf);
        let (l, r) = (buf.channel(0)[7999], buf.channel(1)[7999]);
        assert!(l < 0.5);
        assert!((l / r - 3.0).abs() < 1e-3);
    }
}
