//! Waveform codec.
//!
//! Stage outputs are exchanged as 16-bit PCM RIFF/WAVE blobs; speech
//! arrives as base64 raw PCM16 mono at 24 kHz.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::dsp::buffer::AudioBuffer;
use crate::error::{EngineError, EngineResult};

/// Sample rate of the remote speech generator's PCM stream.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Clip to [-1, 1] and scale by 32767 (positive) or 32768 (negative),
/// truncating toward zero.
pub fn float_to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Reconstruct a float from a container sample. Values sit at the centre
/// of their quantization step, so re-encoding yields the same integer.
pub fn pcm16_to_float(sample: i16) -> f32 {
    match sample {
        0 => 0.0,
        s if s > 0 => (s as f32 + 0.5) / 32767.0,
        s => (s as f32 - 0.5) / 32768.0,
    }
}

/// Encode a buffer as a 16-bit interleaved PCM WAV file.
pub fn encode_wav(buffer: &AudioBuffer) -> EngineResult<Vec<u8>> {
    let spec = WavSpec {
        channels: buffer.num_channels().max(1) as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + buffer.len() * spec.channels as usize * 2));
    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for s in buffer.interleaved() {
        writer.write_sample(float_to_pcm16(s))?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

/// Decode a WAV container into a planar float buffer.
pub fn decode_wav(bytes: &[u8]) -> EngineResult<AudioBuffer> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(EngineError::codec("wav declares zero channels"));
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(pcm16_to_float))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits) if (8..=32).contains(&bits) => {
            let scale = (1_i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(EngineError::codec(format!(
                "unsupported wav sample format {format:?} at {bits} bits"
            )));
        }
    };

    Ok(AudioBuffer::from_interleaved(&interleaved, channels, spec.sample_rate))
}

/// Decode raw little-endian signed 16-bit PCM. Each sample is divided by
/// 32768, so negative codes re-encode exactly while positive codes come
/// back one step lower (16384 becomes 16383). After that first encode the
/// container round trip is stable.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: usize) -> EngineResult<AudioBuffer> {
    if bytes.len() % 2 != 0 {
        return Err(EngineError::codec(format!(
            "pcm16 stream has odd byte length {}",
            bytes.len()
        )));
    }
    if channels == 0 {
        return Err(EngineError::codec("pcm16 stream needs at least one channel"));
    }
    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();
    Ok(AudioBuffer::from_interleaved(&samples, channels, sample_rate))
}

/// Decode a base64 speech payload (mono PCM16 at 24 kHz).
pub fn decode_speech_base64(payload: &str) -> EngineResult<AudioBuffer> {
    let bytes = STANDARD.decode(payload.trim())?;
    decode_pcm16(&bytes, SPEECH_SAMPLE_RATE, 1)
}
