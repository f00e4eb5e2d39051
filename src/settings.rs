//! Mixer and vocal effect settings, plus the vocal preset library.

use serde::{Deserialize, Serialize};

/// Loudness target tag carried with the mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteringProfile {
    Neutral,
    #[default]
    Radio,
    Streaming,
    Club,
}

/// Emotional colour of the mix; selects the reverb tail length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoulResonance {
    Sad,
    #[default]
    Triumphant,
    Aggressive,
}

impl SoulResonance {
    /// Length of the synthetic reverb impulse in seconds.
    pub fn reverb_seconds(self) -> f64 {
        match self {
            SoulResonance::Sad => 3.0,
            SoulResonance::Triumphant | SoulResonance::Aggressive => 1.5,
        }
    }
}

/// Bus levels and global character for one mixdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MixerSettings {
    pub beat_volume: f64,
    pub vocal_volume: f64,
    pub backing_volume: f64,
    pub adlib_volume: f64,
    /// Return level of the reverb bus.
    pub reverb_level: f64,
    #[serde(alias = "compression")]
    pub compression_amount: f64,
    pub mastering_profile: MasteringProfile,
    pub soul_resonance: SoulResonance,
    /// Humanization amount in [0, 1].
    pub spark_level: f64,
}

impl Default for MixerSettings {
    fn default() -> Self {
        MixerSettings {
            beat_volume: 0.8,
            vocal_volume: 1.0,
            backing_volume: 0.5,
            adlib_volume: 0.4,
            reverb_level: 0.3,
            compression_amount: 0.6,
            mastering_profile: MasteringProfile::Radio,
            soul_resonance: SoulResonance::Triumphant,
            spark_level: 0.2,
        }
    }
}

impl MixerSettings {
    pub fn spark(&self) -> f64 {
        if self.spark_level.is_finite() {
            self.spark_level.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Per-mix vocal processing applied uniformly to every take.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VocalFxSettings {
    /// Robotic tuning amount in [0, 1].
    pub cybernetics: f64,
    /// Pitch/formant shift in cents, [-1200, 1200].
    #[serde(alias = "throat")]
    pub throat_shift_cents: f64,
    /// Reverb send level in [0, 1].
    pub void_depth: f64,
    /// Waveshaper drive in [0, 1].
    pub distortion: f64,
}

impl Default for VocalFxSettings {
    fn default() -> Self {
        VocalFxSettings {
            cybernetics: 0.0,
            throat_shift_cents: 0.0,
            void_depth: 0.2,
            distortion: 0.0,
        }
    }
}

impl VocalFxSettings {
    pub const fn new(cybernetics: f64, throat_shift_cents: f64, void_depth: f64, distortion: f64) -> Self {
        VocalFxSettings {
            cybernetics,
            throat_shift_cents,
            void_depth,
            distortion,
        }
    }

    /// Copy with every field forced into its documented range.
    pub fn clamped(self) -> Self {
        let unit = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        VocalFxSettings {
            cybernetics: unit(self.cybernetics),
            throat_shift_cents: if self.throat_shift_cents.is_finite() {
                self.throat_shift_cents.clamp(-1200.0, 1200.0)
            } else {
                0.0
            },
            void_depth: unit(self.void_depth),
            distortion: unit(self.distortion),
        }
    }
}

/// A named vocal effect preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VocalPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub settings: VocalFxSettings,
}

pub const VOCAL_PRESETS: [VocalPreset; 6] = [
    VocalPreset {
        id: "dry_clean",
        name: "Studio Reference",
        description: "Clean, untreated signal. High fidelity.",
        settings: VocalFxSettings::new(0.0, 0.0, 0.1, 0.0),
    },
    VocalPreset {
        id: "t_pain",
        name: "The Auto-Bot",
        description: "Hard tuning. 100% Cybernetics.",
        settings: VocalFxSettings::new(1.0, 0.0, 0.2, 0.0),
    },
    VocalPreset {
        id: "demon_time",
        name: "Demon Time",
        description: "Pitch down, distorted. Drill/Trap aesthetic.",
        settings: VocalFxSettings::new(0.4, -300.0, 0.4, 0.3),
    },
    VocalPreset {
        id: "chipmunk",
        name: "Hyper-Pop Up",
        description: "Pitch up, fast, glossy.",
        settings: VocalFxSettings::new(0.8, 400.0, 0.2, 0.0),
    },
    VocalPreset {
        id: "ethereal",
        name: "Cathedral Ghost",
        description: "Massive reverb, washed out.",
        settings: VocalFxSettings::new(0.2, 0.0, 0.9, 0.0),
    },
    VocalPreset {
        id: "phone",
        name: "Old Telephone",
        description: "Bandpassed, distorted, lo-fi.",
        settings: VocalFxSettings::new(0.0, 0.0, 0.0, 0.6),
    },
];

/// Look up a preset by id.
pub fn vocal_preset(id: &str) -> Option<&'static VocalPreset> {
    VOCAL_PRESETS.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mixer_defaults() {
        let m = MixerSettings::default();
        assert_eq!(m.beat_volume, 0.8);
        assert_eq!(m.vocal_volume, 1.0);
        assert_eq!(m.reverb_level, 0.3);
        assert_eq!(m.mastering_profile, MasteringProfile::Radio);
        assert_eq!(m.soul_resonance, SoulResonance::Triumphant);
        assert_eq!(m.spark_level, 0.2);
    }

    #[test]
    fn partial_mixer_json() {
        let m: MixerSettings =
            serde_json::from_str(r#"{"beatVolume": 0.5, "soulResonance": "sad", "compression": 0.9}"#)
                .unwrap();
        assert_eq!(m.beat_volume, 0.5);
        assert_eq!(m.compression_amount, 0.9);
        assert_eq!(m.soul_resonance.reverb_seconds(), 3.0);
        assert_eq!(m.vocal_volume, 1.0);
    }

    #[test]
    fn vocal_fx_accepts_throat_alias() {
        let fx: VocalFxSettings = serde_json::from_str(r#"{"throat": -300}"#).unwrap();
        assert_eq!(fx.throat_shift_cents, -300.0);
        assert_eq!(fx.void_depth, 0.2);
    }

    #[test]
    fn clamping() {
        let fx = VocalFxSettings::new(2.0, 5000.0, -1.0, f64::NAN).clamped();
        assert_eq!(fx, VocalFxSettings::new(1.0, 1200.0, 0.0, 0.0));
    }

    #[test]
    fn preset_lookup() {
        let demon = vocal_preset("demon_time").unwrap();
        assert_eq!(demon.settings.throat_shift_cents, -300.0);
        assert_eq!(demon.settings.distortion, 0.3);
        assert!(vocal_preset("nope").is_none());
        assert_eq!(VOCAL_PRESETS.len(), 6);
    }
}
