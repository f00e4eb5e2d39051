//! Mutation engine: command-driven transforms on a finished mix.
//!
//! A command token resolves to [`MutationParams`]; the chain is always
//!
//! ```text
//! source (rate, detune) ─ [clone army] ─ [staff] ─ [reverb] ─ [crush] ─ stutter gain ─ out
//! ```
//!
//! and the output keeps the input's channel count, length and sample rate.

use std::fmt;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dsp::automation::Automation;
use crate::dsp::buffer::AudioBuffer;
use crate::dsp::compressor::{Compressor, DynamicsParams};
use crate::dsp::context::{OfflineContext, Playback};
use crate::dsp::convolver::{Convolver, decaying_noise_impulse};
use crate::dsp::filter::{BiquadFilter, FilterType};
use crate::dsp::shaper::Waveshaper;
use crate::error::EngineResult;

/// Length of one stutter slice in seconds.
pub const SLICE_SECONDS: f64 = 0.25;

/// Impulse length for the forced reverb.
const MAX_REVERB_SECONDS: f64 = 10.0;

/// The closed command vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationCommand {
    Silence,
    PitchDown,
    ReverbMax,
    SpeedUp,
    SlowDown,
    Crush,
    CloneArmy,
    StaffMaximize,
    StaffMinimize,
    HumanizeMax,
    SwingMax,
}

/// What a command token stands for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandSpec {
    pub effect: MutationCommand,
    pub intensity: f64,
    /// Nominal duration in seconds; 99 means "whole track".
    pub duration: f64,
}

impl MutationCommand {
    pub const ALL: [MutationCommand; 11] = [
        MutationCommand::Silence,
        MutationCommand::PitchDown,
        MutationCommand::ReverbMax,
        MutationCommand::SpeedUp,
        MutationCommand::SlowDown,
        MutationCommand::Crush,
        MutationCommand::CloneArmy,
        MutationCommand::StaffMaximize,
        MutationCommand::StaffMinimize,
        MutationCommand::HumanizeMax,
        MutationCommand::SwingMax,
    ];

    /// Terminal token, e.g. `CMD: SCREW`.
    pub fn token(self) -> &'static str {
        match self {
            MutationCommand::Silence => "CMD: NULLIFY",
            MutationCommand::PitchDown => "CMD: SCREW",
            MutationCommand::ReverbMax => "CMD: ETHEREAL",
            MutationCommand::SpeedUp => "CMD: HYPER",
            MutationCommand::SlowDown => "CMD: DILATE",
            MutationCommand::Crush => "CMD: BITROT",
            MutationCommand::CloneArmy => "CMD: WUKONG_CLONE",
            MutationCommand::StaffMaximize => "CMD: WUKONG_STAFF_MAX",
            MutationCommand::StaffMinimize => "CMD: WUKONG_STAFF_MIN",
            MutationCommand::HumanizeMax => "CMD: SPARK",
            MutationCommand::SwingMax => "CMD: ZONE",
        }
    }

    pub fn effect_name(self) -> &'static str {
        match self {
            MutationCommand::Silence => "silence",
            MutationCommand::PitchDown => "pitch_down",
            MutationCommand::ReverbMax => "reverb_max",
            MutationCommand::SpeedUp => "speed_up",
            MutationCommand::SlowDown => "slow_down",
            MutationCommand::Crush => "crush",
            MutationCommand::CloneArmy => "clone_army",
            MutationCommand::StaffMaximize => "staff_maximize",
            MutationCommand::StaffMinimize => "staff_minimize",
            MutationCommand::HumanizeMax => "humanize_max",
            MutationCommand::SwingMax => "swing_max",
        }
    }

    pub fn spec(self) -> CommandSpec {
        let (intensity, duration) = match self {
            MutationCommand::Silence => (1.0, 2.0),
            MutationCommand::PitchDown => (1200.0, 4.0),
            MutationCommand::SpeedUp => (1.5, 99.0),
            MutationCommand::SlowDown => (0.5, 99.0),
            MutationCommand::Crush => (0.8, 99.0),
            _ => (1.0, 99.0),
        };
        CommandSpec {
            effect: self,
            intensity,
            duration,
        }
    }

    /// Resolve a token (`CMD: HYPER`, `HYPER`) or an effect name
    /// (`speed_up`). Case and surrounding whitespace are ignored.
    pub fn parse(token: &str) -> Option<Self> {
        let t = token.trim();
        let bare = t
            .get(..4)
            .filter(|p| p.eq_ignore_ascii_case("cmd:"))
            .map_or(t, |_| t[4..].trim());
        Self::ALL.into_iter().find(|c| {
            c.token()[5..].eq_ignore_ascii_case(bare) || c.effect_name().eq_ignore_ascii_case(bare)
        })
    }
}

impl fmt::Display for MutationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Spectral reshape variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staff {
    /// Low-shelf boost into hard compression.
    Maximize,
    /// High-pass and faster playback.
    Minimize,
}

/// Fully resolved transform parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutationParams {
    pub playback_rate: f64,
    pub pitch_shift_cents: f64,
    pub reverb: bool,
    pub crush: bool,
    pub clone_army: bool,
    pub staff: Option<Staff>,
    /// Stutter probability driver in [0, 1].
    pub entropy: f64,
}

impl MutationParams {
    /// Identity transform with the given entropy.
    pub fn identity(entropy: f64) -> Self {
        MutationParams {
            playback_rate: 1.0,
            pitch_shift_cents: 0.0,
            reverb: false,
            crush: false,
            clone_army: false,
            staff: None,
            entropy,
        }
    }

    pub fn resolve(entropy: f64, command: Option<MutationCommand>) -> Self {
        let mut p = Self::identity(entropy);
        let Some(command) = command else {
            return p;
        };
        match command {
            MutationCommand::SlowDown => p.playback_rate = 0.5,
            MutationCommand::SpeedUp => p.playback_rate = 1.5,
            MutationCommand::PitchDown => p.pitch_shift_cents = -1200.0,
            MutationCommand::ReverbMax => p.reverb = true,
            MutationCommand::Crush => p.crush = true,
            MutationCommand::CloneArmy => p.clone_army = true,
            MutationCommand::StaffMaximize => p.staff = Some(Staff::Maximize),
            MutationCommand::StaffMinimize => {
                p.staff = Some(Staff::Minimize);
                p.playback_rate *= 1.25;
            }
            MutationCommand::HumanizeMax => p.entropy = 0.8,
            MutationCommand::Silence | MutationCommand::SwingMax => {}
        }
        p
    }

    /// True when only the stutter stage can change the signal.
    pub fn is_identity_transform(&self) -> bool {
        let identity = Self::identity(self.entropy);
        *self == identity
    }
}

/// Apply `command` and entropy-driven stutter to `source`.
///
/// Unknown tokens resolve to no command. `entropy` is clamped into [0, 1],
/// NaN reads as 0.
pub fn mutate(
    source: &AudioBuffer,
    entropy: f64,
    command: Option<&str>,
    config: &EngineConfig,
) -> EngineResult<AudioBuffer> {
    let entropy = if (0.0..=1.0).contains(&entropy) {
        entropy
    } else {
        let clamped = if entropy.is_nan() { 0.0 } else { entropy.clamp(0.0, 1.0) };
        warn!(requested = entropy, used = clamped, "entropy out of range, clamping");
        clamped
    };
    let resolved = command.and_then(|token| {
        let parsed = MutationCommand::parse(token);
        if parsed.is_none() {
            warn!(token, "unknown mutation command, ignoring");
        }
        parsed
    });
    let params = MutationParams::resolve(entropy, resolved);
    info!(command = ?resolved, entropy = params.entropy, "mutating mix");
    Ok(apply(source, &params, config))
}

/// Run the mutation chain with explicit parameters.
pub fn apply(source: &AudioBuffer, params: &MutationParams, config: &EngineConfig) -> AudioBuffer {
    let channels = source.num_channels();
    let frames = source.len();
    let sample_rate = source.sample_rate;
    if channels == 0 || frames == 0 {
        return source.clone();
    }
    let sr = sample_rate as f64;

    let mut ctx = OfflineContext::new(channels, frames, sample_rate);
    ctx.schedule(
        source,
        0.0,
        Playback::default()
            .with_rate(params.playback_rate)
            .with_detune(params.pitch_shift_cents),
    );
    if params.clone_army {
        const CLONE_BUS: f64 = 0.6;
        let pitch = params.pitch_shift_cents;
        ctx.schedule(
            source,
            0.0,
            Playback::gain(CLONE_BUS).with_detune(pitch + 300.0).with_pan(-1.0),
        );
        ctx.schedule(
            source,
            0.0,
            Playback::gain(CLONE_BUS).with_detune(pitch + 700.0).with_pan(1.0),
        );
        ctx.schedule(source, 0.0, Playback::gain(CLONE_BUS * 0.8).with_detune(pitch - 1200.0));
    }
    let mut out = ctx.render();

    match params.staff {
        Some(Staff::Maximize) => {
            for c in 0..channels {
                BiquadFilter::shelf(FilterType::Lowshelf, sr, 100.0, 15.0).process_slice(out.channel_mut(c));
            }
            let heavy = DynamicsParams {
                threshold_db: -30.0,
                ratio: 20.0,
                ..DynamicsParams::default()
            };
            Compressor::with(sr, heavy).process_buffer(&mut out);
        }
        Some(Staff::Minimize) => {
            for c in 0..channels {
                BiquadFilter::with_params(FilterType::Highpass, sr, 1000.0, 1.0).process_slice(out.channel_mut(c));
            }
        }
        None => {}
    }

    if params.reverb {
        let mut rng = config.rng("mutation/reverb");
        let stereo = decaying_noise_impulse(MAX_REVERB_SECONDS, sample_rate, &mut rng);
        let impulse = AudioBuffer::dual_mono(stereo.channel(0).to_vec(), sample_rate);
        out = Convolver::new(&impulse).process(&out, channels);
    }

    if params.crush {
        let shaper = Waveshaper::distortion(400.0);
        for c in 0..channels {
            shaper.process_slice(out.channel_mut(c));
        }
    }

    if params.entropy > 0.0 {
        let mut rng = config.rng("mutation/stutter");
        let gain = stutter_envelope(out.duration_seconds(), params.entropy, &mut rng);
        let curve = gain.render(frames, sr);
        for c in 0..channels {
            for (s, g) in out.channel_mut(c).iter_mut().zip(&curve) {
                *s *= *g as f32;
            }
        }
    }
    out
}

/// Gain automation for the stutter stage.
///
/// Each 0.25 s slice is gated shut for 90% of its length with probability
/// `entropy * 0.3`, and independently chopped (0, 1, 0, 1 within 150 ms)
/// with probability `entropy * 0.1`. Later events win at equal times.
pub fn stutter_envelope<R: Rng + ?Sized>(duration: f64, entropy: f64, rng: &mut R) -> Automation {
    let mut gain = Automation::new(1.0);
    let slices = (duration / SLICE_SECONDS).floor().max(0.0) as usize;
    let (mut gated, mut chopped) = (0, 0);
    for i in 0..slices {
        let t = i as f64 * SLICE_SECONDS;
        if rng.gen_bool((entropy * 0.3).clamp(0.0, 1.0)) {
            gain.set_value_at_time(0.0, t)
                .set_value_at_time(1.0, t + SLICE_SECONDS * 0.9);
            gated += 1;
        }
        if rng.gen_bool((entropy * 0.1).clamp(0.0, 1.0)) {
            gain.set_value_at_time(0.0, t)
                .linear_ramp_to_value_at_time(1.0, t + 0.05)
                .linear_ramp_to_value_at_time(0.0, t + 0.10)
                .linear_ramp_to_value_at_time(1.0, t + 0.15);
            chopped += 1;
        }
    }
    debug!(slices, gated, chopped, "stutter envelope built");
    gain
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    const SR: u32 = 8000;

    fn tone(seconds: f64) -> AudioBuffer {
        let n = (seconds * SR as f64) as usize;
        let data: Vec<f32> = (0..n)
            .map(|i| 0.3 * (i as f32 * 60.0 * std::f32::consts::TAU / SR as f32).sin())
            .collect();
        AudioBuffer::dual_mono(data, SR)
    }

    #[test]
    fn tokens_resolve() {
        assert_eq!(MutationCommand::parse("CMD: SCREW"), Some(MutationCommand::PitchDown));
        assert_eq!(MutationCommand::parse("cmd:hyper"), Some(MutationCommand::SpeedUp));
        assert_eq!(MutationCommand::parse("WUKONG_STAFF_MAX"), Some(MutationCommand::StaffMaximize));
        assert_eq!(MutationCommand::parse("clone_army"), Some(MutationCommand::CloneArmy));
        assert_eq!(MutationCommand::parse("CMD: DANCE"), None);
        assert_eq!(MutationCommand::parse(""), None);
    }

    #[test]
    fn command_table() {
        let screw = MutationCommand::PitchDown.spec();
        assert_eq!((screw.intensity, screw.duration), (1200.0, 4.0));
        assert_eq!(MutationCommand::Silence.spec().duration, 2.0);
        assert_eq!(MutationCommand::Crush.spec().intensity, 0.8);
        for c in MutationCommand::ALL {
            assert_eq!(MutationCommand::parse(c.token()), Some(c));
            assert_eq!(MutationCommand::parse(c.effect_name()), Some(c));
        }
    }

    #[test]
    fn params_per_command() {
        let min = MutationParams::resolve(0.0, Some(MutationCommand::StaffMinimize));
        assert_eq!(min.playback_rate, 1.25);
        assert_eq!(min.staff, Some(Staff::Minimize));
        assert_eq!(MutationParams::resolve(0.1, Some(MutationCommand::HumanizeMax)).entropy, 0.8);
        assert_eq!(
            MutationParams::resolve(0.0, Some(MutationCommand::PitchDown)).pitch_shift_cents,
            -1200.0
        );
        assert!(MutationParams::resolve(0.3, None).is_identity_transform());
        assert!(MutationParams::resolve(0.3, Some(MutationCommand::Silence)).is_identity_transform());
        assert!(!MutationParams::resolve(0.3, Some(MutationCommand::Crush)).is_identity_transform());
    }

    #[test]
    fn duration_is_preserved() {
        let config = EngineConfig::seeded(9);
        let input = tone(1.3);
        for token in [None, Some("CMD: HYPER"), Some("CMD: DILATE"), Some("CMD: WUKONG_CLONE"), Some("nonsense")] {
            for entropy in [0.0, 0.5, 1.0] {
                let out = mutate(&input, entropy, token, &config).unwrap();
                assert_eq!(out.len(), input.len());
                assert_eq!(out.num_channels(), 2);
                assert_eq!(out.sample_rate, SR);
            }
        }
    }

    #[test]
    fn identity_without_entropy_or_command() {
        let config = EngineConfig::seeded(9);
        let input = tone(0.5);
        let out = mutate(&input, 0.0, Some("CMD: UNKNOWN"), &config).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn staff_max_is_boosted_and_compressed() {
        let config = EngineConfig::seeded(1);
        let input = tone(1.0);
        let out = mutate(&input, 0.0, Some("CMD: WUKONG_STAFF_MAX"), &config).unwrap();
        assert_eq!(out.len(), input.len());
        // 60 Hz sits under the +15 dB shelf, then -30 dB at 20:1 clamps it
        let settled = &out.channel(0)[SR as usize / 2..];
        let settled_peak = settled.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(settled_peak < 0.3);
        assert!(settled_peak > 0.01);
        // no stutter gating: no silent quarter-second slice
        let quarter = SR as usize / 4;
        for slice in out.channel(0)[quarter..].chunks(quarter) {
            assert!(slice.iter().any(|s| s.abs() > 1e-3));
        }
    }

    #[test]
    fn speed_up_leaves_silent_tail() {
        let config = EngineConfig::seeded(1);
        let input = tone(1.0);
        let out = mutate(&input, 0.0, Some("CMD: HYPER"), &config).unwrap();
        let tail = &out.channel(0)[(0.7 * SR as f64) as usize..];
        assert!(tail.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn reverb_and_crush_change_the_signal() {
        let config = EngineConfig::seeded(1);
        let input = tone(0.5);
        assert_ne!(mutate(&input, 0.0, Some("CMD: ETHEREAL"), &config).unwrap(), input);
        let crushed = mutate(&input, 0.0, Some("CMD: BITROT"), &config).unwrap();
        assert!(crushed.rms() > input.rms());
    }

    #[test]
    fn full_entropy_gates_some_slices() {
        let mut rng = Pcg64::seed_from_u64(5);
        let env = stutter_envelope(10.0, 1.0, &mut rng);
        assert!(!env.events().is_empty());
        let silent = (0..40)
            .filter(|i| env.value_at(*i as f64 * SLICE_SECONDS + 0.01) == 0.0)
            .count();
        assert!(silent > 0);
    }

    #[test]
    fn zero_entropy_never_stutters() {
        let mut rng = Pcg64::seed_from_u64(5);
        assert!(stutter_envelope(60.0, 0.0, &mut rng).is_constant());
    }

    #[test]
    fn out_of_range_entropy_is_clamped() {
        let config = EngineConfig::seeded(1);
        let input = tone(2.0);
        let hot = mutate(&input, 1.2, None, &config).unwrap();
        assert_eq!(hot.len(), input.len());
        assert_eq!(hot, mutate(&input, 1.0, None, &config).unwrap());
        assert_eq!(mutate(&input, f64::NAN, None, &config).unwrap(), input);
        assert_eq!(mutate(&input, -0.5, None, &config).unwrap(), input);
    }
}
