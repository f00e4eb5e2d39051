//! Offline rendering context.
//!
//! A fixed-length accumulation bus. Each render operation creates one,
//! schedules every source at an absolute time, and consumes it with
//! [`OfflineContext::render`]. Nothing outlives the call.

use tracing::debug;

use super::buffer::{AudioBuffer, cents_to_ratio, read_interpolated};
use super::panner::{pan_mono, pan_stereo};

/// How a scheduled buffer is played back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playback {
    /// Linear gain.
    pub gain: f64,
    /// Detune in cents; changes both pitch and speed.
    pub detune_cents: f64,
    /// Playback-rate multiplier.
    pub rate: f64,
    /// Stereo pan position in [-1, 1]; `None` up-mixes without a panner.
    pub pan: Option<f64>,
}

impl Default for Playback {
    fn default() -> Self {
        Playback {
            gain: 1.0,
            detune_cents: 0.0,
            rate: 1.0,
            pan: None,
        }
    }
}

impl Playback {
    pub fn gain(gain: f64) -> Self {
        Playback {
            gain,
            ..Self::default()
        }
    }

    pub fn with_detune(mut self, cents: f64) -> Self {
        self.detune_cents = cents;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_pan(mut self, pan: f64) -> Self {
        self.pan = Some(pan);
        self
    }

    /// Effective speed including detune.
    pub fn speed(&self) -> f64 {
        self.rate * cents_to_ratio(self.detune_cents)
    }
}

/// A disposable non-realtime render target.
#[derive(Debug, Clone)]
pub struct OfflineContext {
    sample_rate: u32,
    channels: Vec<Vec<f64>>,
}

impl OfflineContext {
    /// Create a context with `frames` frames of silence.
    pub fn new(num_channels: usize, frames: usize, sample_rate: u32) -> Self {
        OfflineContext {
            sample_rate,
            channels: vec![vec![0.0; frames]; num_channels],
        }
    }

    /// Stereo context sized to `seconds`.
    pub fn stereo(seconds: f64, sample_rate: u32) -> Self {
        let frames = (seconds.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(2, frames, sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Schedule `source` to start at `time` seconds. Returns false when
    /// the event falls outside the render window and was dropped.
    pub fn schedule(&mut self, source: &AudioBuffer, time: f64, playback: Playback) -> bool {
        if !time.is_finite() || time < 0.0 {
            debug!(time, "dropping event scheduled before the render window");
            return false;
        }
        let ctx_sr = self.sample_rate as f64;
        let start = (time * ctx_sr).ceil() as usize;
        let frames = self.frames();
        if start >= frames || source.is_empty() || source.sample_rate == 0 {
            return start < frames;
        }

        let speed = playback.speed();
        if speed <= 0.0 || !speed.is_finite() {
            return false;
        }
        // Source frames advanced per output frame.
        let step = speed * source.sample_rate as f64 / ctx_sr;
        let src_len = source.len() as f64;
        let gain = playback.gain;
        let n_out = self.channels.len();
        let stereo_pan = playback.pan.filter(|_| n_out == 2);

        let start_frame = time * ctx_sr;
        for frame in start..frames {
            let pos = (frame as f64 - start_frame) * step;
            if pos >= src_len {
                break;
            }

            match stereo_pan {
                Some(pan) => {
                    let (l, r) = if source.num_channels() == 1 {
                        pan_mono(read_interpolated(source.channel(0), pos) as f64, pan)
                    } else {
                        pan_stereo(
                            read_interpolated(source.channel(0), pos) as f64,
                            read_interpolated(source.channel(1), pos) as f64,
                            pan,
                        )
                    };
                    self.channels[0][frame] += l * gain;
                    self.channels[1][frame] += r * gain;
                }
                None => {
                    for (c, out) in self.channels.iter_mut().enumerate() {
                        if let Some(data) = source.source_channel(c) {
                            out[frame] += read_interpolated(data, pos) as f64 * gain;
                        }
                    }
                }
            }
        }
        true
    }

    /// Sum a buffer at the same rate from frame zero, scaled by `gain`.
    pub fn mix_in(&mut self, source: &AudioBuffer, gain: f64) {
        for (c, out) in self.channels.iter_mut().enumerate() {
            if let Some(data) = source.source_channel(c) {
                for (o, &s) in out.iter_mut().zip(data.iter()) {
                    *o += s as f64 * gain;
                }
            }
        }
    }

    /// Finish the render.
    pub fn render(self) -> AudioBuffer {
        let channels = self
            .channels
            .into_iter()
            .map(|c| c.into_iter().map(|s| s as f32).collect())
            .collect();
        AudioBuffer::from_channels(channels, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(sample_rate: u32) -> AudioBuffer {
        let mut data = vec![0.0; 10];
        data[0] = 1.0;
        AudioBuffer::mono(data, sample_rate)
    }

    #[test]
    fn places_sample_at_time() {
        let mut ctx = OfflineContext::stereo(1.0, 1000);
        assert!(ctx.schedule(&click(1000), 0.25, Playback::gain(0.5)));
        let out = ctx.render();
        assert_eq!(out.len(), 1000);
        assert_eq!(out.channel(0)[250], 0.5);
        assert_eq!(out.channel(1)[250], 0.5);
        assert_eq!(out.channel(0)[249], 0.0);
    }

    #[test]
    fn negative_time_is_dropped() {
        let mut ctx = OfflineContext::stereo(1.0, 1000);
        assert!(!ctx.schedule(&click(1000), -0.1, Playback::default()));
        assert_eq!(ctx.render().peak(), 0.0);
    }

    #[test]
    fn tail_past_end_is_truncated() {
        let mut ctx = OfflineContext::stereo(0.01, 1000);
        ctx.schedule(&AudioBuffer::mono(vec![1.0; 100], 1000), 0.005, Playback::default());
        let out = ctx.render();
        assert_eq!(out.len(), 10);
        assert_eq!(out.channel(0)[9], 1.0);
    }

    #[test]
    fn octave_up_halves_duration() {
        let mut ctx = OfflineContext::stereo(1.0, 1000);
        ctx.schedule(
            &AudioBuffer::mono(vec![1.0; 100], 1000),
            0.0,
            Playback::default().with_detune(1200.0),
        );
        let out = ctx.render();
        let active = out.channel(0).iter().filter(|&&s| s != 0.0).count();
        assert_eq!(active, 50);
    }

    #[test]
    fn source_rate_is_converted() {
        let mut ctx = OfflineContext::stereo(1.0, 1000);
        ctx.schedule(&AudioBuffer::mono(vec![1.0; 100], 500), 0.0, Playback::default());
        let out = ctx.render();
        let active = out.channel(0).iter().filter(|&&s| s != 0.0).count();
        assert!((199..=200).contains(&active), "got {active}");
    }

    #[test]
    fn hard_pan_left() {
        let mut ctx = OfflineContext::stereo(0.1, 1000);
        ctx.schedule(&click(1000), 0.0, Playback::default().with_pan(-1.0));
        let out = ctx.render();
        assert!((out.channel(0)[0] - 1.0).abs() < 1e-6);
        assert!(out.channel(1)[0].abs() < 1e-6);
    }
}
