//! Arrangement plan data model.
//!
//! The plan is produced by an external generator (or the deterministic
//! fallback) as JSON. Pattern names are free text on the wire and are
//! normalized into closed enums here, at the parsing boundary; anything
//! unrecognized becomes the enum's default variant.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{EngineError, EngineResult};

/// Sixteenth-note steps per bar.
pub const STEPS_PER_BAR: usize = 16;

/// Beats per bar (4/4 time).
pub const BEATS_PER_BAR: f64 = 4.0;

/// Minimum song length the plan generator is asked to produce, in seconds.
pub const MIN_DURATION_SECONDS: f64 = 137.0;

/// Longest plan accepted for rendering, in seconds.
pub const MAX_DURATION_SECONDS: f64 = 1200.0;

/// Drum grooves known to the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DrumPattern {
    FunkyDrummer,
    Impeach,
    Levee,
    Amen,
    Afrobeat,
    Trap,
    Drill,
    House,
    Reggaeton,
    /// Plain backbeat used for anything unrecognized.
    #[default]
    Basic,
}

impl DrumPattern {
    pub const ALL: [DrumPattern; 9] = [
        DrumPattern::FunkyDrummer,
        DrumPattern::Impeach,
        DrumPattern::Levee,
        DrumPattern::Amen,
        DrumPattern::Afrobeat,
        DrumPattern::Trap,
        DrumPattern::Drill,
        DrumPattern::House,
        DrumPattern::Reggaeton,
    ];

    /// Resolve a free-text groove name by case-insensitive substring match.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        let table = [
            ("funky", DrumPattern::FunkyDrummer),
            ("impeach", DrumPattern::Impeach),
            ("levee", DrumPattern::Levee),
            ("amen", DrumPattern::Amen),
            ("afrobeat", DrumPattern::Afrobeat),
            ("trap", DrumPattern::Trap),
            ("drill", DrumPattern::Drill),
            ("house", DrumPattern::House),
            ("reggaeton", DrumPattern::Reggaeton),
        ];
        table
            .iter()
            .find(|(needle, _)| lower.contains(needle))
            .map_or(DrumPattern::Basic, |&(_, pattern)| pattern)
    }

    pub fn name(self) -> &'static str {
        match self {
            DrumPattern::FunkyDrummer => "Funky Drummer",
            DrumPattern::Impeach => "Impeach",
            DrumPattern::Levee => "Levee",
            DrumPattern::Amen => "Amen",
            DrumPattern::Afrobeat => "Afrobeat",
            DrumPattern::Trap => "Trap",
            DrumPattern::Drill => "Drill",
            DrumPattern::House => "House",
            DrumPattern::Reggaeton => "Reggaeton",
            DrumPattern::Basic => "basic",
        }
    }
}

impl From<String> for DrumPattern {
    fn from(name: String) -> Self {
        DrumPattern::from_name(&name)
    }
}

impl From<DrumPattern> for String {
    fn from(pattern: DrumPattern) -> Self {
        pattern.name().to_string()
    }
}

/// Bass line rhythms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BassPattern {
    /// Downbeat and half-bar hits.
    #[default]
    Root,
    /// Sustained sub; same grid as `Root`.
    Sub,
    /// Every eighth note.
    Driving,
    /// Root grid plus pitched pickups.
    Riff,
}

impl BassPattern {
    pub const ALL: [BassPattern; 4] = [
        BassPattern::Root,
        BassPattern::Riff,
        BassPattern::Driving,
        BassPattern::Sub,
    ];

    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("driving") {
            BassPattern::Driving
        } else if lower.contains("riff") {
            BassPattern::Riff
        } else if lower.contains("sub") {
            BassPattern::Sub
        } else {
            BassPattern::Root
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BassPattern::Root => "root",
            BassPattern::Sub => "sub",
            BassPattern::Driving => "driving",
            BassPattern::Riff => "riff",
        }
    }
}

impl From<String> for BassPattern {
    fn from(name: String) -> Self {
        BassPattern::from_name(&name)
    }
}

impl From<BassPattern> for String {
    fn from(pattern: BassPattern) -> Self {
        pattern.name().to_string()
    }
}

/// Keys/harmony patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HarmonyPattern {
    Pad,
    Stabs,
    Arpeggio,
    /// Unrecognized pattern: the keys stay silent.
    #[default]
    Tacet,
}

impl HarmonyPattern {
    pub const ALL: [HarmonyPattern; 3] = [
        HarmonyPattern::Pad,
        HarmonyPattern::Stabs,
        HarmonyPattern::Arpeggio,
    ];

    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("pad") {
            HarmonyPattern::Pad
        } else if lower.contains("stab") {
            HarmonyPattern::Stabs
        } else if lower.contains("arp") {
            HarmonyPattern::Arpeggio
        } else {
            HarmonyPattern::Tacet
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HarmonyPattern::Pad => "pad",
            HarmonyPattern::Stabs => "stabs",
            HarmonyPattern::Arpeggio => "arpeggio",
            HarmonyPattern::Tacet => "tacet",
        }
    }
}

impl From<String> for HarmonyPattern {
    fn from(name: String) -> Self {
        HarmonyPattern::from_name(&name)
    }
}

impl From<HarmonyPattern> for String {
    fn from(pattern: HarmonyPattern) -> Self {
        pattern.name().to_string()
    }
}

/// A pattern choice for one instrument slot.
///
/// On the wire the kind is `pattern` (or `type` for the fx slot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternDescriptor<K> {
    #[serde(rename = "pattern", alias = "type", default)]
    pub kind: K,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
}

impl<K> PatternDescriptor<K> {
    pub fn new(kind: K) -> Self {
        PatternDescriptor {
            kind,
            intensity: None,
            player: None,
            instrument: None,
        }
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = Some(intensity);
        self
    }

    /// Intensity clamped to [0, 1]; missing or zero means `default`.
    pub fn intensity_or(&self, default: f64) -> f64 {
        match self.intensity {
            Some(v) if v.is_finite() && v != 0.0 => v.clamp(0.0, 1.0),
            _ => default,
        }
    }
}

/// Which pattern each instrument family plays in a section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstrumentAssignments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drums: Option<PatternDescriptor<DrumPattern>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bass: Option<PatternDescriptor<BassPattern>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harmony: Option<PatternDescriptor<HarmonyPattern>>,
    /// Parsed and kept, but not sequenced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead: Option<PatternDescriptor<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fx: Option<PatternDescriptor<String>>,
}

/// One arrangement section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub name: String,
    #[serde(alias = "bars", deserialize_with = "deserialize_bar_count")]
    pub bar_count: u32,
    #[serde(default)]
    pub energy_level: f64,
    /// Lyrics assigned to the section, if any header matched.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "lyricsText")]
    pub text: Option<String>,
    /// Computed start in seconds; never taken from the generator.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "startTimeSeconds"
    )]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub instruments: InstrumentAssignments,
}

impl Section {
    pub fn new(name: impl Into<String>, bar_count: u32, energy_level: f64) -> Self {
        Section {
            name: name.into(),
            bar_count,
            energy_level,
            text: None,
            start_time: None,
            instruments: InstrumentAssignments::default(),
        }
    }

    /// Sections whose name mentions a chorus get a riser lead-in.
    pub fn is_chorus(&self) -> bool {
        self.name.to_lowercase().contains("chorus")
    }

    /// True when the section has lyrics worth voicing.
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Bar counts arrive as JSON numbers; accept `8.0` as well as `8`.
fn deserialize_bar_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
        return Err(serde::de::Error::custom(format!(
            "bar count {value} is not a usable number of bars"
        )));
    }
    Ok(value.round() as u32)
}

fn default_key() -> String {
    "C".to_string()
}

/// Tempo, key, feel and section list for one song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangementPlan {
    #[serde(alias = "tempoBPM", alias = "tempoBpm")]
    pub bpm: f64,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default, alias = "swingAmount")]
    pub swing: f64,
    #[serde(default)]
    pub overall_vibe: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "styleTag")]
    pub style: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
    /// Computed total in seconds.
    #[serde(default)]
    pub total_duration: f64,
}

impl ArrangementPlan {
    /// Parse a plan from generator JSON.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Fixed two-section plan used whenever the generator fails.
    pub fn fallback(style: &str) -> Self {
        let mut intro = Section::new("Intro", 4, 0.3);
        intro.instruments.harmony = Some(PatternDescriptor {
            player: Some("Silas".to_string()),
            instrument: Some("keys".to_string()),
            ..PatternDescriptor::new(HarmonyPattern::Pad)
        });

        let mut verse = Section::new("Verse 1", 16, 0.5);
        verse.instruments.drums = Some(PatternDescriptor {
            player: Some("Rook".to_string()),
            ..PatternDescriptor::new(DrumPattern::Basic).with_intensity(0.5)
        });
        verse.instruments.bass = Some(PatternDescriptor {
            player: Some("Kael".to_string()),
            instrument: Some("sub".to_string()),
            ..PatternDescriptor::new(BassPattern::Root)
        });

        let mut plan = ArrangementPlan {
            bpm: 120.0,
            key: "C".to_string(),
            swing: 0.0,
            overall_vibe: style.to_string(),
            style: Some(style.to_string()),
            sections: vec![intro, verse],
            total_duration: 0.0,
        };
        plan.compute_timeline();
        plan
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn seconds_per_bar(&self) -> f64 {
        self.seconds_per_beat() * BEATS_PER_BAR
    }

    pub fn seconds_per_sixteenth(&self) -> f64 {
        self.seconds_per_beat() / 4.0
    }

    pub fn total_bars(&self) -> u64 {
        self.sections.iter().map(|s| s.bar_count as u64).sum()
    }

    /// Song length derived from tempo and bar counts.
    pub fn duration_seconds(&self) -> f64 {
        self.total_bars() as f64 * self.seconds_per_bar()
    }

    /// Start time of every section, by one forward pass.
    pub fn section_starts(&self) -> Vec<f64> {
        let seconds_per_bar = self.seconds_per_bar();
        let mut running = 0.0;
        self.sections
            .iter()
            .map(|s| {
                let start = running;
                running += s.bar_count as f64 * seconds_per_bar;
                start
            })
            .collect()
    }

    /// Overwrite every section's start time and the total duration.
    pub fn compute_timeline(&mut self) {
        let starts = self.section_starts();
        for (section, start) in self.sections.iter_mut().zip(starts) {
            section.start_time = Some(start);
        }
        self.total_duration = self.duration_seconds();
    }

    /// `TotalBars * 4 * 60 / BPM > 137`.
    pub fn meets_minimum_duration(&self) -> bool {
        self.duration_seconds() > MIN_DURATION_SECONDS
    }

    /// Style tag, empty when unset.
    pub fn style_tag(&self) -> &str {
        self.style.as_deref().unwrap_or("")
    }

    /// Check that the plan can be rendered.
    pub fn validate(&self) -> EngineResult<()> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(EngineError::invalid_plan(format!(
                "tempo must be a positive number, got {}",
                self.bpm
            )));
        }
        if self.sections.is_empty() {
            return Err(EngineError::invalid_plan("plan has no sections"));
        }
        if let Some(section) = self.sections.iter().find(|s| s.bar_count == 0) {
            return Err(EngineError::invalid_plan(format!(
                "section '{}' has no bars",
                section.name
            )));
        }
        let duration = self.duration_seconds();
        if duration > MAX_DURATION_SECONDS {
            return Err(EngineError::invalid_plan(format!(
                "plan lasts {duration:.0} s, more than the {MAX_DURATION_SECONDS} s limit"
            )));
        }
        Ok(())
    }

    /// Clamp unit-range fields into [0, 1].
    pub fn normalize(&mut self) {
        self.swing = unit(self.swing);
        for section in &mut self.sections {
            section.energy_level = unit(section.energy_level);
        }
    }
}

fn unit(v: f64) -> f64 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}
