//! Mixing console: instrumental plus vocal takes into a mastered stereo mix.
//!
//! Topology, fixed for every mixdown:
//!
//! ```text
//! instrumental ── beat gain ───────────────────────────────┐
//! take ─ detune ─ [shaper] ─┬─ vocal bus ─ glue comp ─ vocal gain ─┤
//!                           └─ void send ─ reverb level ─ convolver ─┤
//!                                                                    master
//! master ─ low shelf ─ high shelf ─ limiter ─ makeup ─ out
//! ```

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::dsp::buffer::AudioBuffer;
use crate::dsp::compressor::{Compressor, DynamicsParams};
use crate::dsp::context::{OfflineContext, Playback};
use crate::dsp::convolver::{Convolver, decaying_noise_impulse};
use crate::dsp::filter::{BiquadFilter, FilterType};
use crate::dsp::shaper::Waveshaper;
use crate::plan::ArrangementPlan;
use crate::settings::{MixerSettings, VocalFxSettings};
use crate::vocals::VocalTakes;

/// Fixed loudness push after the limiter.
pub const MASTER_MAKEUP_GAIN: f32 = 1.2;

/// Master EQ and limiter settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterChain {
    pub low_shelf_hz: f64,
    pub low_shelf_db: f64,
    pub high_shelf_hz: f64,
    pub high_shelf_db: f64,
    pub limiter_threshold_db: f64,
    pub limiter_ratio: f64,
    pub limiter_attack: f64,
    pub limiter_release: f64,
}

impl Default for MasterChain {
    fn default() -> Self {
        MasterChain {
            low_shelf_hz: 80.0,
            low_shelf_db: 2.0,
            high_shelf_hz: 12_000.0,
            high_shelf_db: 3.0,
            limiter_threshold_db: -10.0,
            limiter_ratio: 20.0,
            limiter_attack: 0.001,
            limiter_release: 0.1,
        }
    }
}

impl MasterChain {
    /// Run the chain over `mix` in place.
    pub fn process(&self, mix: &mut AudioBuffer) {
        let sr = mix.sample_rate as f64;
        for c in 0..mix.num_channels() {
            let mut low = BiquadFilter::shelf(FilterType::Lowshelf, sr, self.low_shelf_hz, self.low_shelf_db);
            let mut high = BiquadFilter::shelf(FilterType::Highshelf, sr, self.high_shelf_hz, self.high_shelf_db);
            let data = mix.channel_mut(c);
            low.process_slice(data);
            high.process_slice(data);
        }

        let mut limiter = Compressor::with(
            sr,
            DynamicsParams {
                threshold_db: self.limiter_threshold_db,
                knee_db: 0.0,
                ratio: self.limiter_ratio,
                attack: self.limiter_attack,
                release: self.limiter_release,
            },
        );
        limiter.process_buffer(mix);
        mix.apply_gain(MASTER_MAKEUP_GAIN);
    }
}

/// Builds and renders the mixdown graph.
#[derive(Debug, Clone)]
pub struct MixingConsole<'a> {
    config: &'a EngineConfig,
    master: MasterChain,
}

impl<'a> MixingConsole<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        MixingConsole {
            config,
            master: MasterChain::default(),
        }
    }

    /// Mix `instrumental` with the vocal `takes` placed at their sections'
    /// start times. The result is stereo at the instrumental's sample rate
    /// and exactly as long as the instrumental.
    pub fn mixdown(
        &self,
        instrumental: &AudioBuffer,
        takes: &VocalTakes,
        plan: &ArrangementPlan,
        settings: &MixerSettings,
        fx: &VocalFxSettings,
    ) -> AudioBuffer {
        let fx = fx.clamped();
        let sample_rate = instrumental.sample_rate;
        let frames = instrumental.len();

        let mut master = OfflineContext::new(2, frames, sample_rate);
        master.mix_in(instrumental, settings.beat_volume);

        let mut dry = OfflineContext::new(2, frames, sample_rate);
        let mut send = OfflineContext::new(2, frames, sample_rate);
        let shaper = (fx.distortion > 0.0).then(|| Waveshaper::distortion(fx.distortion * 400.0));
        let wet = fx.void_depth > 0.0 && settings.reverb_level > 0.0;

        let mut placed = 0usize;
        for (index, take) in takes.iter() {
            let Some(section) = plan.sections.get(index) else {
                debug!(index, "vocal take has no matching section, skipping");
                continue;
            };
            let Some(start) = section.start_time else {
                debug!(section = %section.name, "section has no start time, skipping take");
                continue;
            };

            let voiced = voice_take(take, fx.throat_shift_cents, sample_rate, shaper.as_ref());
            dry.schedule(&voiced, start, Playback::default());
            if wet {
                send.schedule(&voiced, start, Playback::gain(fx.void_depth));
            }
            placed += 1;
        }

        if placed > 0 {
            let mut vocals = dry.render();
            Compressor::new(sample_rate as f64).process_buffer(&mut vocals);
            master.mix_in(&vocals, settings.vocal_volume);

            if wet {
                let mut rng = self.config.rng("console/reverb");
                let impulse = decaying_noise_impulse(settings.soul_resonance.reverb_seconds(), sample_rate, &mut rng);
                let reverb = Convolver::new(&impulse).process(&send.render(), 2);
                master.mix_in(&reverb, settings.reverb_level);
            }
        }

        let mut mix = master.render();
        self.master.process(&mut mix);
        info!(
            takes = placed,
            seconds = mix.duration_seconds(),
            peak = mix.peak(),
            "mixdown rendered"
        );
        mix
    }
}

/// Resample `take` to `sample_rate` with `detune` applied, then shape it.
fn voice_take(take: &AudioBuffer, detune: f64, sample_rate: u32, shaper: Option<&Waveshaper>) -> AudioBuffer {
    let playback = Playback::default().with_detune(detune);
    let step = playback.speed() * take.sample_rate as f64 / sample_rate as f64;
    let frames = (take.len() as f64 / step).ceil() as usize;

    let mut ctx = OfflineContext::new(2, frames, sample_rate);
    ctx.schedule(take, 0.0, playback);
    let mut voiced = ctx.render();
    if let Some(shaper) = shaper {
        for c in 0..voiced.num_channels() {
            shaper.process_slice(voiced.channel_mut(c));
        }
    }
    voiced
}
