//! Vocal booth: speech takes per section.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::codec::decode_speech_base64;
use crate::dsp::buffer::AudioBuffer;
use crate::error::{EngineResult, GeneratorError};
use crate::plan::ArrangementPlan;

/// Performer persona selecting the generator voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceId {
    Warmablon,
    TheArchitect,
    Other(String),
}

impl VoiceId {
    pub fn from_id(id: &str) -> Self {
        match id {
            "WARMABLON" => VoiceId::Warmablon,
            "THE_ARCHITECT" => VoiceId::TheArchitect,
            other => VoiceId::Other(other.to_string()),
        }
    }

    /// Prebuilt speaker name requested from the generator.
    pub fn speaker(&self) -> &'static str {
        match self {
            VoiceId::Warmablon => "Charon",
            VoiceId::TheArchitect => "Fenrir",
            VoiceId::Other(_) => "Kore",
        }
    }
}

/// One speech synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    pub speaker: &'static str,
}

/// An external text-to-speech service. Returns base64-encoded mono PCM16
/// at 24 kHz.
pub trait SpeechGenerator {
    fn speak(&self, request: &SpeechRequest) -> Result<String, GeneratorError>;
}

impl<F> SpeechGenerator for F
where
    F: Fn(&SpeechRequest) -> Result<String, GeneratorError>,
{
    fn speak(&self, request: &SpeechRequest) -> Result<String, GeneratorError> {
        self(request)
    }
}

/// Vocal takes keyed by section index. Recording a section again replaces
/// its take.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VocalTakes {
    takes: BTreeMap<usize, AudioBuffer>,
}

impl VocalTakes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode base64 speech payloads keyed by section index.
    pub fn from_base64(payloads: &BTreeMap<usize, String>) -> EngineResult<Self> {
        let mut takes = VocalTakes::new();
        for (&index, payload) in payloads {
            takes.insert(index, decode_speech_base64(payload)?);
        }
        Ok(takes)
    }

    /// Store a take, returning the one it replaced.
    pub fn insert(&mut self, section: usize, take: AudioBuffer) -> Option<AudioBuffer> {
        self.takes.insert(section, take)
    }

    pub fn get(&self, section: usize) -> Option<&AudioBuffer> {
        self.takes.get(&section)
    }

    pub fn remove(&mut self, section: usize) -> Option<AudioBuffer> {
        self.takes.remove(&section)
    }

    pub fn len(&self) -> usize {
        self.takes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.takes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &AudioBuffer)> {
        self.takes.iter().map(|(&i, b)| (i, b))
    }
}

/// Voice `text` and decode the result. Any failure means "no take".
pub fn synthesize_speech<G: SpeechGenerator + ?Sized>(
    generator: &G,
    text: &str,
    voice: &VoiceId,
) -> Option<AudioBuffer> {
    let request = SpeechRequest {
        text: text.to_string(),
        speaker: voice.speaker(),
    };
    let payload = match generator.speak(&request) {
        Ok(p) if !p.trim().is_empty() => p,
        Ok(_) => {
            warn!(error = %GeneratorError::EmptyResponse, "speech generation failed");
            return None;
        }
        Err(err) => {
            warn!(error = %err, "speech generation failed");
            return None;
        }
    };
    match decode_speech_base64(&payload) {
        Ok(buffer) => Some(buffer),
        Err(err) => {
            warn!(error = %err, "speech payload could not be decoded");
            None
        }
    }
}

/// Record the vocal for section `index` of `plan` into `takes`.
///
/// Sections without text are skipped. Returns true when a new take was
/// stored.
pub fn record_section<G: SpeechGenerator + ?Sized>(
    generator: &G,
    plan: &ArrangementPlan,
    index: usize,
    voice: &VoiceId,
    takes: &mut VocalTakes,
) -> bool {
    let Some(section) = plan.sections.get(index) else {
        debug!(index, "no such section to record");
        return false;
    };
    let Some(text) = section.text.as_deref().filter(|_| section.has_text()) else {
        debug!(section = %section.name, "section has no lyrics, nothing to record");
        return false;
    };

    match synthesize_speech(generator, text, voice) {
        Some(take) => {
            info!(section = %section.name, index, seconds = take.duration_seconds(), "vocal take recorded");
            takes.insert(index, take);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Section;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;

    fn pcm_payload(samples: &[i16]) -> String {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        STANDARD.encode(bytes)
    }

    fn plan() -> ArrangementPlan {
        let mut plan = ArrangementPlan::fallback("Rap");
        plan.sections[1].text = Some("line one".into());
        plan
    }

    #[test]
    fn voice_mapping() {
        assert_eq!(VoiceId::from_id("WARMABLON").speaker(), "Charon");
        assert_eq!(VoiceId::from_id("THE_ARCHITECT").speaker(), "Fenrir");
        assert_eq!(VoiceId::from_id("anyone").speaker(), "Kore");
    }

    #[test]
    fn records_and_replaces_takes() {
        let plan = plan();
        let mut takes = VocalTakes::new();
        let first = |_: &SpeechRequest| -> Result<String, GeneratorError> { Ok(pcm_payload(&[16384; 4])) };
        assert!(record_section(&first, &plan, 1, &VoiceId::Warmablon, &mut takes));
        assert_eq!(takes.get(1).unwrap().len(), 4);

        let second = |r: &SpeechRequest| -> Result<String, GeneratorError> {
            assert_eq!(r.speaker, "Charon");
            assert_eq!(r.text, "line one");
            Ok(pcm_payload(&[100; 8]))
        };
        assert!(record_section(&second, &plan, 1, &VoiceId::Warmablon, &mut takes));
        assert_eq!(takes.len(), 1);
        assert_eq!(takes.get(1).unwrap().len(), 8);
        assert_eq!(takes.get(1).unwrap().sample_rate, 24_000);
    }

    #[test]
    fn skips_sections_without_text() {
        let mut plan = plan();
        plan.sections.push(Section::new("Outro", 4, 0.2));
        plan.sections[2].text = Some("   ".into());
        let mut takes = VocalTakes::new();
        let generator = |_: &SpeechRequest| -> Result<String, GeneratorError> { panic!("should not be called") };
        assert!(!record_section(&generator, &plan, 0, &VoiceId::TheArchitect, &mut takes));
        assert!(!record_section(&generator, &plan, 2, &VoiceId::TheArchitect, &mut takes));
        assert!(!record_section(&generator, &plan, 9, &VoiceId::TheArchitect, &mut takes));
        assert!(takes.is_empty());
    }

    #[test]
    fn generator_failure_means_no_take() {
        let plan = plan();
        let mut takes = VocalTakes::new();
        let down = |_: &SpeechRequest| -> Result<String, GeneratorError> {
            Err(GeneratorError::Unavailable("offline".into()))
        };
        let garbage = |_: &SpeechRequest| -> Result<String, GeneratorError> { Ok("@@@".into()) };
        let empty = |_: &SpeechRequest| -> Result<String, GeneratorError> { Ok(String::new()) };
        assert!(!record_section(&down, &plan, 1, &VoiceId::Warmablon, &mut takes));
        assert!(!record_section(&garbage, &plan, 1, &VoiceId::Warmablon, &mut takes));
        assert!(!record_section(&empty, &plan, 1, &VoiceId::Warmablon, &mut takes));
        assert!(takes.is_empty());
    }

    #[test]
    fn takes_from_base64_map() {
        let mut payloads = BTreeMap::new();
        payloads.insert(3, pcm_payload(&[0, 1, 2]));
        let takes = VocalTakes::from_base64(&payloads).unwrap();
        assert_eq!(takes.iter().map(|(i, _)| i).collect::<Vec<_>>(), vec![3]);

        payloads.insert(4, "***".into());
        assert!(VocalTakes::from_base64(&payloads).is_err());
    }
}
