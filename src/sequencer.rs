//! Sequencer: arrangement plan to instrumental.
//!
//! Sequencing happens in two passes. [`Sequencer::score`] walks the plan
//! bar by bar and sixteenth by sixteenth and emits a flat list of timed
//! [`Hit`]s; [`Sequencer::sequence`] then places every hit into a single
//! offline render sized to the plan's duration.

use rand::Rng;
use rand_pcg::Pcg64;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::dsp::buffer::AudioBuffer;
use crate::dsp::context::{OfflineContext, Playback};
use crate::error::{EngineError, EngineResult};
use crate::plan::{
    ArrangementPlan, BassPattern, DrumPattern, HarmonyPattern, PatternDescriptor, STEPS_PER_BAR,
};
use crate::synth::{InstrumentId, SampleLibrary};

/// Drum intensity used when a descriptor carries none.
pub const DEFAULT_DRUM_INTENSITY: f64 = 0.8;

/// Fraction of a sixteenth that a full swing pushes each off-beat.
const SWING_FACTOR: f64 = 0.33;

/// Late snare offset applied on the backbeat at high spark levels.
const SNARE_DRAG_SECONDS: f64 = 0.015;

const BASS_GAIN: f64 = 0.7;
const RISER_GAIN: f64 = 0.4;

/// A set of sixteenth-note steps within one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepGrid(u16);

impl StepGrid {
    pub const EMPTY: StepGrid = StepGrid(0);
    pub const ALL: StepGrid = StepGrid(u16::MAX);
    pub const EIGHTHS: StepGrid = StepGrid::from_steps(&[0, 2, 4, 6, 8, 10, 12, 14]);

    pub const fn from_steps(steps: &[u8]) -> Self {
        let mut bits = 0u16;
        let mut i = 0;
        while i < steps.len() {
            bits |= 1 << (steps[i] & 0x0f);
            i += 1;
        }
        StepGrid(bits)
    }

    pub fn contains(self, step: usize) -> bool {
        step < STEPS_PER_BAR && self.0 & (1 << step) != 0
    }

    /// Steps in ascending order.
    pub fn steps(self) -> impl Iterator<Item = usize> {
        (0..STEPS_PER_BAR).filter(move |&s| self.contains(s))
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Hit grids for every drum voice in one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrumGrid {
    pub kick: StepGrid,
    pub snare: StepGrid,
    pub hat: StepGrid,
    pub open_hat: StepGrid,
    pub ride: StepGrid,
    pub rim: StepGrid,
    pub clap: StepGrid,
}

impl DrumGrid {
    /// Voices with their sample and level relative to section intensity.
    pub fn lanes(&self) -> [(InstrumentId, StepGrid, f64); 7] {
        [
            (InstrumentId::Kick, self.kick, 1.0),
            (InstrumentId::Snare, self.snare, 1.0),
            (InstrumentId::ClosedHat, self.hat, 0.6),
            (InstrumentId::OpenHat, self.open_hat, 0.7),
            (InstrumentId::Ride, self.ride, 0.5),
            (InstrumentId::Rim, self.rim, 0.7),
            (InstrumentId::Clap, self.clap, 1.0),
        ]
    }
}

const FUNKY_GHOSTS: StepGrid = StepGrid::from_steps(&[5, 7, 13]);

/// Resolve a groove into hit grids for bar `bar` of its section. `roll`
/// selects the trap hi-hat roll variation.
pub fn drum_grid(pattern: DrumPattern, bar: u32, roll: bool) -> DrumGrid {
    let g = StepGrid::from_steps;
    match pattern {
        DrumPattern::FunkyDrummer => DrumGrid {
            kick: g(&[0, 6, 8, 14]),
            snare: g(&[4, 5, 7, 12, 13]),
            hat: StepGrid::ALL,
            open_hat: g(&[2, 10]),
            ..DrumGrid::default()
        },
        DrumPattern::Impeach => DrumGrid {
            kick: g(&[0, 8, 10]),
            snare: g(&[4, 12]),
            hat: g(&[0, 2, 4, 6, 8, 12, 14]),
            open_hat: g(&[10]),
            ..DrumGrid::default()
        },
        DrumPattern::Levee => DrumGrid {
            kick: g(&[0, 8, 10]),
            snare: g(&[4, 12]),
            hat: StepGrid::ALL,
            ..DrumGrid::default()
        },
        DrumPattern::Amen => DrumGrid {
            kick: g(&[0, 6]),
            // the chop on every fourth bar
            snare: if bar % 4 == 3 {
                g(&[4, 7, 10, 12, 14])
            } else {
                g(&[4, 12])
            },
            ride: StepGrid::EIGHTHS,
            ..DrumGrid::default()
        },
        DrumPattern::Afrobeat => DrumGrid {
            kick: g(&[0, 4, 8, 12]),
            rim: g(&[3, 6, 9, 12]),
            hat: StepGrid::EIGHTHS,
            ..DrumGrid::default()
        },
        DrumPattern::Trap => DrumGrid {
            kick: g(&[0, 10]),
            snare: g(&[8]),
            hat: if roll {
                g(&[0, 1, 2, 3, 4, 5, 6, 7])
            } else {
                StepGrid::ALL
            },
            ..DrumGrid::default()
        },
        DrumPattern::Drill => DrumGrid {
            kick: g(&[0, 7, 10]),
            snare: g(&[8, 11]),
            hat: g(&[0, 3, 6, 9, 12]),
            ..DrumGrid::default()
        },
        DrumPattern::House => DrumGrid {
            kick: g(&[0, 4, 8, 12]),
            clap: g(&[4, 12]),
            hat: g(&[0, 4, 8, 12]),
            open_hat: g(&[2, 6, 10, 14]),
            ..DrumGrid::default()
        },
        DrumPattern::Reggaeton => DrumGrid {
            kick: g(&[0, 4, 8, 12]),
            snare: g(&[3, 6, 11, 14]),
            ..DrumGrid::default()
        },
        DrumPattern::Basic => DrumGrid {
            kick: g(&[0, 8]),
            snare: g(&[4, 12]),
            hat: StepGrid::EIGHTHS,
            ..DrumGrid::default()
        },
    }
}

/// Bass steps with their detune in cents, in step order.
pub fn bass_line(pattern: BassPattern, drill_slide: bool) -> Vec<(usize, f64)> {
    let grid = match pattern {
        BassPattern::Driving => StepGrid::EIGHTHS,
        BassPattern::Riff => StepGrid::from_steps(&[0, 3, 8, 11, 14]),
        BassPattern::Root | BassPattern::Sub => StepGrid::from_steps(&[0, 8]),
    };
    let grid = if drill_slide {
        StepGrid(grid.0 | 1 << 7)
    } else {
        grid
    };

    grid.steps()
        .map(|step| {
            let detune = match (pattern, step) {
                (_, 7) if drill_slide => 1200.0,
                (BassPattern::Riff, 3 | 14) => 300.0,
                (BassPattern::Riff, 11) => -200.0,
                _ => 0.0,
            };
            (step, detune)
        })
        .collect()
}

/// One scheduled sample trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Absolute start time in seconds.
    pub time: f64,
    pub instrument: InstrumentId,
    pub gain: f64,
    /// Detune in cents.
    pub detune: f64,
}

/// The flat timeline produced for one plan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Score {
    pub hits: Vec<Hit>,
    /// Render length in seconds.
    pub duration: f64,
}

impl Score {
    pub fn hits_for(&self, instrument: InstrumentId) -> impl Iterator<Item = &Hit> {
        self.hits.iter().filter(move |h| h.instrument == instrument)
    }
}

/// Performance options not carried by the plan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SequenceOptions {
    /// Humanization amount in [0, 1].
    pub spark_level: f64,
}

impl SequenceOptions {
    pub fn with_spark(spark_level: f64) -> Self {
        SequenceOptions {
            spark_level: if spark_level.is_finite() {
                spark_level.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }
}

/// Random performance decisions. When humanization is off every draw
/// returns its neutral value.
struct Feel {
    rng: Option<Pcg64>,
    spark: f64,
}

impl Feel {
    fn timing_jitter(&mut self) -> f64 {
        let spread = 0.010 + self.spark * 0.05;
        match self.rng.as_mut() {
            Some(rng) => rng.gen_range(-spread..=spread),
            None => 0.0,
        }
    }

    fn velocity_jitter(&mut self) -> f64 {
        match self.rng.as_mut() {
            Some(rng) => rng.gen_range(-0.1..=0.1),
            None => 0.0,
        }
    }

    fn chance(&mut self, probability: f64) -> bool {
        match self.rng.as_mut() {
            Some(rng) => rng.gen_bool(probability.clamp(0.0, 1.0)),
            None => false,
        }
    }
}

/// Places a sample library onto an arrangement.
#[derive(Debug, Clone, Copy)]
pub struct Sequencer<'a> {
    library: &'a SampleLibrary,
    config: &'a EngineConfig,
    options: SequenceOptions,
}

impl<'a> Sequencer<'a> {
    pub fn new(library: &'a SampleLibrary, config: &'a EngineConfig) -> Self {
        Sequencer {
            library,
            config,
            options: SequenceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SequenceOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the hit list for `plan`.
    pub fn score(&self, plan: &ArrangementPlan) -> EngineResult<Score> {
        plan.validate()?;

        let spark = SequenceOptions::with_spark(self.options.spark_level).spark_level;
        let mut feel = Feel {
            rng: self.config.humanize.then(|| self.config.rng("sequencer")),
            spark,
        };
        let bar_seconds = plan.seconds_per_bar();
        let sixteenth = plan.seconds_per_sixteenth();
        let swing_delay = unit(plan.swing) * sixteenth * SWING_FACTOR;
        let step_time = |bar_time: f64, step: usize| {
            let swing = if step % 2 == 1 { swing_delay } else { 0.0 };
            bar_time + step as f64 * sixteenth + swing
        };
        let drill_slide = plan.style_tag().eq_ignore_ascii_case("drill");

        let mut hits = Vec::new();
        for (section, section_start) in plan.sections.iter().zip(plan.section_starts()) {
            if section.is_chorus() {
                let time = section_start - bar_seconds;
                if time >= 0.0 {
                    hits.push(Hit {
                        time,
                        instrument: InstrumentId::Riser,
                        gain: RISER_GAIN,
                        detune: 0.0,
                    });
                }
            }

            let parts = &section.instruments;
            for bar in 0..section.bar_count {
                let bar_time = section_start + bar as f64 * bar_seconds;

                if let Some(drums) = &parts.drums {
                    drum_bar(&mut hits, &mut feel, drums, bar, |s| step_time(bar_time, s));
                }

                if let Some(bass) = &parts.bass {
                    for (step, detune) in bass_line(bass.kind, drill_slide) {
                        hits.push(Hit {
                            time: step_time(bar_time, step),
                            instrument: InstrumentId::Bass,
                            gain: BASS_GAIN,
                            detune,
                        });
                    }
                }

                if let Some(harmony) = &parts.harmony {
                    keys_bar(&mut hits, &mut feel, harmony.kind, |s| step_time(bar_time, s));
                }
            }
            debug!(section = %section.name, bars = section.bar_count, "section sequenced");
        }

        Ok(Score {
            hits,
            duration: plan.duration_seconds(),
        })
    }

    /// Render `plan` into a stereo buffer spanning its full duration.
    pub fn sequence(&self, plan: &ArrangementPlan) -> EngineResult<AudioBuffer> {
        if self.library.is_empty() {
            return Err(EngineError::MissingSampleLibrary);
        }
        let score = self.score(plan)?;
        info!(
            hits = score.hits.len(),
            duration = score.duration,
            style = self.library.style(),
            "rendering instrumental"
        );

        let mut ctx = OfflineContext::stereo(score.duration, self.config.sample_rate);
        let mut dropped = 0usize;
        for hit in &score.hits {
            let Some(sample) = self.library.buffer(hit.instrument) else {
                continue;
            };
            let playback = Playback::gain(hit.gain).with_detune(hit.detune);
            if !ctx.schedule(sample, hit.time, playback) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(dropped, "hits fell outside the render window");
        }
        Ok(ctx.render())
    }
}

fn drum_bar(
    hits: &mut Vec<Hit>,
    feel: &mut Feel,
    drums: &PatternDescriptor<DrumPattern>,
    bar: u32,
    step_time: impl Fn(usize) -> f64,
) {
    let intensity = drums.intensity_or(DEFAULT_DRUM_INTENSITY);
    let roll = drums.kind == DrumPattern::Trap && feel.chance(0.5);
    let grid = drum_grid(drums.kind, bar, roll);
    let drag = feel.spark > 0.5;

    for step in 0..STEPS_PER_BAR {
        for (instrument, lane, level) in grid.lanes() {
            if !lane.contains(step) {
                continue;
            }
            let mut volume = intensity * level;
            let mut offset = 0.0;
            if instrument == InstrumentId::Snare {
                if drums.kind == DrumPattern::FunkyDrummer && FUNKY_GHOSTS.contains(step) {
                    volume = intensity * 0.3;
                }
                if drag && (step == 4 || step == 12) {
                    offset = SNARE_DRAG_SECONDS;
                }
            }
            hits.push(Hit {
                // jitter may not pull the opening downbeat before the render window
                time: (step_time(step) + feel.timing_jitter() + offset).max(0.0),
                instrument,
                gain: (volume + feel.velocity_jitter()).max(0.0),
                detune: 0.0,
            });
        }
    }
}

fn keys_bar(hits: &mut Vec<Hit>, feel: &mut Feel, pattern: HarmonyPattern, step_time: impl Fn(usize) -> f64) {
    let mut keys = |time: f64, gain: f64, detune: f64| {
        hits.push(Hit {
            time,
            instrument: InstrumentId::Keys,
            gain,
            detune,
        })
    };

    match pattern {
        HarmonyPattern::Pad => {
            let t = step_time(0);
            keys(t, 0.4, 0.0);
            keys(t, 0.3, 300.0);
            keys(t, 0.3, 700.0);
            if feel.spark > 0.3 {
                keys(t, 0.2, 1000.0);
            }
            if feel.spark > 0.7 {
                keys(t, 0.1, 1400.0);
            }
        }
        HarmonyPattern::Stabs => {
            for step in [4, 12] {
                let t = step_time(step);
                keys(t, 0.5, 0.0);
                keys(t, 0.4, 300.0);
                keys(t, 0.4, 700.0);
            }
        }
        HarmonyPattern::Arpeggio => {
            const INTERVALS: [f64; 4] = [0.0, 300.0, 700.0, 1200.0];
            for (idx, step) in StepGrid::EIGHTHS.steps().enumerate() {
                let t = step_time(step);
                if feel.spark > 0.6 && feel.chance(0.2) {
                    keys(t - 0.05, 0.2, 200.0);
                }
                keys(t, 0.4, INTERVALS[idx % INTERVALS.len()]);
            }
        }
        HarmonyPattern::Tacet => {}
    }
}

fn unit(v: f64) -> f64 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}
