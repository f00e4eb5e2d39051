//! Multi-channel floating-point audio buffers.
//!
//! This is the in-memory waveform every stage consumes and produces:
//! planar `f32` channels of equal length at a fixed sample rate.

/// Convert a detune in cents to a playback-rate multiplier.
pub fn cents_to_ratio(cents: f64) -> f64 {
    (2.0_f64).powf(cents / 1200.0)
}

/// A planar multi-channel audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Create a silent buffer.
    pub fn silent(num_channels: usize, frames: usize, sample_rate: u32) -> Self {
        AudioBuffer {
            sample_rate,
            channels: vec![vec![0.0; frames]; num_channels],
        }
    }

    /// Create from planar channel data. Channels longer than the shortest
    /// one are truncated so every channel has the same length.
    pub fn from_channels(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in &mut channels {
            channel.truncate(frames);
        }
        AudioBuffer {
            sample_rate,
            channels,
        }
    }

    /// Create a single-channel buffer.
    pub fn mono(data: Vec<f32>, sample_rate: u32) -> Self {
        AudioBuffer {
            sample_rate,
            channels: vec![data],
        }
    }

    /// Create a stereo buffer with the same signal on both channels.
    pub fn dual_mono(data: Vec<f32>, sample_rate: u32) -> Self {
        AudioBuffer {
            sample_rate,
            channels: vec![data.clone(), data],
        }
    }

    /// Create from interleaved samples.
    pub fn from_interleaved(samples: &[f32], num_channels: usize, sample_rate: u32) -> Self {
        if num_channels == 0 {
            return AudioBuffer::silent(0, 0, sample_rate);
        }
        let frames = samples.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
        AudioBuffer {
            sample_rate,
            channels,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel).
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Channel used when up-mixing this buffer into `target` channels:
    /// mono feeds every output, otherwise channels map one to one.
    pub fn source_channel(&self, target: usize) -> Option<&[f32]> {
        match self.channels.len() {
            0 => None,
            1 => Some(&self.channels[0]),
            n if target < n => Some(&self.channels[target]),
            _ => None,
        }
    }

    /// Root-mean-square energy of the first channel.
    pub fn rms(&self) -> f64 {
        let Some(data) = self.channels.first() else {
            return 0.0;
        };
        if data.is_empty() {
            return 0.0;
        }
        let sum: f64 = data.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / data.len() as f64).sqrt()
    }

    /// Largest absolute sample over all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0_f32, |m, &s| m.max(s.abs()))
    }

    /// Scale every sample in place.
    pub fn apply_gain(&mut self, gain: f32) {
        for channel in &mut self.channels {
            for s in channel.iter_mut() {
                *s *= gain;
            }
        }
    }

    /// Interleave channels frame by frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.len();
        let n = self.channels.len();
        let mut out = Vec::with_capacity(frames * n);
        for i in 0..frames {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }

    /// Read a sample with linear interpolation at a fractional position.
    pub fn read_interpolated(&self, channel: usize, position: f64) -> f32 {
        read_interpolated(&self.channels[channel], position)
    }
}

/// Linear interpolation into a slice; zero outside the data.
pub fn read_interpolated(data: &[f32], position: f64) -> f32 {
    if data.is_empty() || position < 0.0 {
        return 0.0;
    }

    let idx = position as usize;
    if idx >= data.len() - 1 {
        return if idx < data.len() { data[idx] } else { 0.0 };
    }

    let frac = (position - idx as f64) as f32;
    data[idx] * (1.0 - frac) + data[idx + 1] * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octave_is_double_rate() {
        assert!((cents_to_ratio(1200.0) - 2.0).abs() < 1e-12);
        assert!((cents_to_ratio(-1200.0) - 0.5).abs() < 1e-12);
        assert!((cents_to_ratio(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn silent_buffer_shape() {
        let buf = AudioBuffer::silent(2, 441, 44100);
        assert_eq!(buf.num_channels(), 2);
        assert_eq!(buf.len(), 441);
        assert!((buf.duration_seconds() - 0.01).abs() < 1e-12);
        assert_eq!(buf.rms(), 0.0);
    }

    #[test]
    fn from_channels_truncates_to_shortest() {
        let buf = AudioBuffer::from_channels(vec![vec![1.0; 10], vec![1.0; 7]], 8000);
        assert_eq!(buf.len(), 7);
        assert_eq!(buf.channel(0).len(), 7);
    }

    #[test]
    fn interleave_round_trip() {
        let buf = AudioBuffer::from_channels(vec![vec![0.1, 0.2], vec![-0.1, -0.2]], 8000);
        let inter = buf.interleaved();
        assert_eq!(inter, vec![0.1, -0.1, 0.2, -0.2]);
        assert_eq!(AudioBuffer::from_interleaved(&inter, 2, 8000), buf);
    }

    #[test]
    fn rms_of_constant_signal() {
        let buf = AudioBuffer::mono(vec![0.5; 100], 8000);
        assert!((buf.rms() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn interpolation_midpoint() {
        let data = [0.0, 1.0];
        assert!((read_interpolated(&data, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(read_interpolated(&data, 5.0), 0.0);
        assert_eq!(read_interpolated(&data, -1.0), 0.0);
    }

    #[test]
    fn mono_upmixes_to_every_channel() {
        let buf = AudioBuffer::mono(vec![0.3; 4], 8000);
        assert!(buf.source_channel(0).is_some());
        assert!(buf.source_channel(1).is_some());
        let stereo = AudioBuffer::dual_mono(vec![0.3; 4], 8000);
        assert!(stereo.source_channel(2).is_none());
    }
}
