//! Arrangement planner.
//!
//! Structural decisions are delegated to an external [`PlanGenerator`].
//! Whatever it returns is parsed, validated and repaired here; any failure
//! falls back to [`ArrangementPlan::fallback`] so callers always get a
//! renderable plan.

use std::fmt::Write as _;

use tracing::{debug, info, warn};

use crate::error::GeneratorError;
use crate::plan::{ArrangementPlan, BassPattern, DrumPattern, HarmonyPattern, MIN_DURATION_SECONDS, Section};

/// Longest lyrics excerpt forwarded to the generator, in characters.
pub const MAX_LYRICS_EXCERPT: usize = 1000;

/// What the plan generator is asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub lyrics_excerpt: String,
    pub style: String,
    pub bpm_override: Option<f64>,
    pub key_override: Option<String>,
}

impl PlanRequest {
    pub fn new(lyrics: &str, style: &str, bpm_override: Option<f64>, key_override: Option<&str>) -> Self {
        PlanRequest {
            lyrics_excerpt: lyrics.chars().take(MAX_LYRICS_EXCERPT).collect(),
            style: style.to_string(),
            bpm_override: bpm_override.filter(|b| b.is_finite() && *b > 0.0),
            key_override: key_override
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
        }
    }

    /// Render the request as generator instructions.
    pub fn prompt(&self) -> String {
        let mut p = String::new();
        let _ = writeln!(p, "Analyze these lyrics and the requested style ('{}').", self.style);
        let _ = writeln!(p, "Return a JSON object describing the arrangement plan.");
        let _ = writeln!(
            p,
            "CRITICAL CONSTRAINT: the song must last at least {MIN_DURATION_SECONDS} seconds."
        );
        match self.bpm_override {
            Some(bpm) => {
                let _ = writeln!(p, "OVERRIDE: the bpm must be exactly {bpm}.");
            }
            None => {
                let _ = writeln!(p, "Choose a bpm that fits the style (e.g. Drill ~140, R&B ~90).");
            }
        }
        if let Some(key) = &self.key_override {
            let _ = writeln!(p, "OVERRIDE: the key must be {key}.");
        }
        let _ = writeln!(
            p,
            "Choose bar counts and bpm so that (TotalBars * 4 * 60 / BPM) > {MIN_DURATION_SECONDS}."
        );
        let _ = writeln!(
            p,
            "If necessary add 'Instrumental Break', 'Extended Outro' or 'Solo' sections to meet this time."
        );
        let _ = writeln!(p);
        let _ = writeln!(p, "Lyrics:");
        let _ = writeln!(p, "{}", self.lyrics_excerpt);
        let _ = writeln!(p);
        let _ = writeln!(p, "The plan must include:");
        let _ = writeln!(p, "- bpm (number)");
        let _ = writeln!(p, "- swing (0.0 to 1.0)");
        let _ = writeln!(p, "- key (string)");
        let _ = writeln!(p, "- sections: array of objects with name, barCount (integer), energyLevel (0.0 to 1.0)");
        let _ = writeln!(p, "  and instruments with a pattern for drums, bass and harmony.");
        let _ = writeln!(p, "  - drums pattern options: {}", quoted(DrumPattern::ALL.iter().map(|d| d.name())));
        let _ = writeln!(p, "  - bass pattern options: {}", quoted(BassPattern::ALL.iter().map(|b| b.name())));
        let _ = writeln!(
            p,
            "  - harmony pattern options: {}",
            quoted(HarmonyPattern::ALL.iter().map(|h| h.name()))
        );
        let _ = writeln!(p, "Vary the instrument patterns to create tension and release.");
        p
    }
}

fn quoted<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.map(|n| format!("'{n}'")).collect::<Vec<_>>().join(", ")
}

/// An external structure generator returning plan JSON.
pub trait PlanGenerator {
    fn generate(&self, request: &PlanRequest) -> Result<String, GeneratorError>;
}

impl<F> PlanGenerator for F
where
    F: Fn(&PlanRequest) -> Result<String, GeneratorError>,
{
    fn generate(&self, request: &PlanRequest) -> Result<String, GeneratorError> {
        self(request)
    }
}

/// Produces arrangement plans, absorbing every generator failure.
#[derive(Debug, Clone)]
pub struct Planner<G> {
    generator: G,
}

impl<G: PlanGenerator> Planner<G> {
    pub fn new(generator: G) -> Self {
        Planner { generator }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Plan a song for `lyrics` in `style`. Never fails.
    pub fn plan(
        &self,
        lyrics: &str,
        style: &str,
        bpm_override: Option<f64>,
        key_override: Option<&str>,
    ) -> ArrangementPlan {
        let request = PlanRequest::new(lyrics, style, bpm_override, key_override);
        let mut plan = match self.request_plan(&request) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %err, style, "plan generation failed, using fallback arrangement");
                ArrangementPlan::fallback(style)
            }
        };

        if plan.style.as_deref().is_none_or(|s| s.trim().is_empty()) {
            plan.style = Some(style.to_string());
        }
        map_lyrics_to_sections(lyrics, &mut plan.sections);
        plan.compute_timeline();

        if !plan.meets_minimum_duration() {
            warn!(
                duration = plan.total_duration,
                minimum = MIN_DURATION_SECONDS,
                "plan is shorter than the requested minimum"
            );
        }
        info!(
            bpm = plan.bpm,
            key = %plan.key,
            sections = plan.sections.len(),
            duration = plan.total_duration,
            "arrangement planned"
        );
        plan
    }

    fn request_plan(&self, request: &PlanRequest) -> Result<ArrangementPlan, GeneratorError> {
        let raw = self.generator.generate(request)?;
        if raw.trim().is_empty() {
            return Err(GeneratorError::EmptyResponse);
        }
        let mut plan =
            ArrangementPlan::from_json(&raw).map_err(|e| GeneratorError::Malformed(e.to_string()))?;

        if let Some(bpm) = request.bpm_override {
            plan.bpm = bpm;
        }
        if let Some(key) = &request.key_override {
            plan.key = key.clone();
        }
        plan.validate()
            .map_err(|e| GeneratorError::Malformed(e.to_string()))?;
        plan.normalize();
        Ok(plan)
    }
}

/// Assign lyric lines to sections by bracketed header.
///
/// For each section, the first line containing `[` and the section name
/// (case-insensitive) starts its text; every following non-blank line up
/// to the next line containing `[` is collected. Sections without a
/// matching header keep their current text.
pub fn map_lyrics_to_sections(lyrics: &str, sections: &mut [Section]) {
    let lines: Vec<&str> = lyrics.lines().collect();
    for section in sections.iter_mut() {
        let needle = section.name.to_lowercase();
        let Some(header) = lines
            .iter()
            .position(|l| l.contains('[') && l.to_lowercase().contains(&needle))
        else {
            debug!(section = %section.name, "no lyric header for section");
            continue;
        };

        let text: Vec<&str> = lines[header + 1..]
            .iter()
            .take_while(|l| !l.contains('['))
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        section.text = Some(text.join("\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LYRICS: &str = "[Intro]\nyeah\n\n[Verse 1]\nline one\n  line two  \n[Chorus]\nhook\n";

    #[test]
    fn lyric_mapping_by_header() {
        let mut sections = vec![
            Section::new("Intro", 4, 0.2),
            Section::new("verse 1", 8, 0.5),
            Section::new("Bridge", 4, 0.5),
        ];
        map_lyrics_to_sections(LYRICS, &mut sections);
        assert_eq!(sections[0].text.as_deref(), Some("yeah"));
        assert_eq!(sections[1].text.as_deref(), Some("line one\nline two"));
        assert_eq!(sections[2].text, None);
    }

    #[test]
    fn unbracketed_mentions_do_not_match() {
        let mut sections = vec![Section::new("Chorus", 4, 0.2)];
        map_lyrics_to_sections("chorus of birds\nsinging", &mut sections);
        assert!(sections[0].text.is_none());
    }

    #[test]
    fn request_truncates_lyrics() {
        let long = "é".repeat(1500);
        let request = PlanRequest::new(&long, "Rap", None, None);
        assert_eq!(request.lyrics_excerpt.chars().count(), MAX_LYRICS_EXCERPT);
    }

    #[test]
    fn prompt_carries_constraints() {
        let request = PlanRequest::new("hello", "Drill", Some(142.0), Some("F#m"));
        let prompt = request.prompt();
        assert!(prompt.contains("(TotalBars * 4 * 60 / BPM) > 137"));
        assert!(prompt.contains("exactly 142"));
        assert!(prompt.contains("F#m"));
        assert!(prompt.contains("'Funky Drummer'"));
        assert!(prompt.contains("'arpeggio'"));
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let request = PlanRequest::new("", "Rap", Some(-5.0), Some("  "));
        assert_eq!(request.bpm_override, None);
        assert_eq!(request.key_override, None);
        assert!(request.prompt().contains("fits the style"));
    }

    #[test]
    fn generator_failure_falls_back() {
        let planner = Planner::new(|_: &PlanRequest| -> Result<String, GeneratorError> {
            Err(GeneratorError::Timeout)
        });
        let plan = planner.plan(LYRICS, "Rap", None, None);
        assert_eq!(plan.bpm, 120.0);
        assert_eq!(plan.total_duration, 40.0);
        assert_eq!(plan.sections[1].text.as_deref(), Some("line one\nline two"));
    }
}
