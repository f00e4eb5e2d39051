use std::cell::RefCell;

use pretty_assertions::assert_eq;
use stemforge_core::GeneratorError;
use stemforge_core::plan::{BassPattern, DrumPattern, HarmonyPattern};
use stemforge_core::planner::{PlanGenerator, PlanRequest, Planner};

const LYRICS: &str = "\
[Intro]
static on the wire

[Verse 1]
first line
second line

[Chorus]
hook line
";

const GENERATED: &str = r#"{
    "bpm": 140,
    "key": "F#m",
    "swing": 0.25,
    "overallVibe": "cold",
    "sections": [
        {"name": "Intro", "barCount": 8, "energyLevel": 0.2,
         "instruments": {"harmony": {"pattern": "pad"}}},
        {"name": "Verse 1", "barCount": 32, "energyLevel": 0.6,
         "instruments": {"drums": {"pattern": "Drill", "intensity": 0.7},
                         "bass": {"pattern": "riff"}}},
        {"name": "Chorus", "barCount": 24, "energyLevel": 0.9, "startTime": 12345,
         "instruments": {"drums": {"pattern": "Amen"},
                         "harmony": {"pattern": "stabs"}}},
        {"name": "Extended Outro", "barCount": 20, "energyLevel": 0.3,
         "instruments": {"harmony": {"pattern": "arpeggio"}}}
    ]
}"#;

/// Records every request and answers with a canned response.
struct Recording {
    response: Result<String, GeneratorError>,
    seen: RefCell<Vec<PlanRequest>>,
}

impl Recording {
    fn answering(response: Result<&str, GeneratorError>) -> Self {
        Recording {
            response: response.map(str::to_string),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl PlanGenerator for Recording {
    fn generate(&self, request: &PlanRequest) -> Result<String, GeneratorError> {
        self.seen.borrow_mut().push(request.clone());
        self.response.clone()
    }
}

#[test]
fn generated_plan_is_mapped_and_timed() {
    let planner = Planner::new(Recording::answering(Ok(GENERATED)));
    let plan = planner.plan(LYRICS, "Drill", None, None);

    assert_eq!(plan.bpm, 140.0);
    assert_eq!(plan.key, "F#m");
    assert_eq!(plan.style.as_deref(), Some("Drill"));

    let spb = 60.0 / 140.0 * 4.0;
    let starts: Vec<f64> = plan.sections.iter().map(|s| s.start_time.unwrap()).collect();
    let expected = [0.0, 8.0 * spb, 40.0 * spb, 64.0 * spb];
    for (got, want) in starts.iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "{got} vs {want}");
    }
    assert!((plan.total_duration - 84.0 * spb).abs() < 1e-9);
    assert!(plan.meets_minimum_duration());

    assert_eq!(plan.sections[0].text.as_deref(), Some("static on the wire"));
    assert_eq!(plan.sections[1].text.as_deref(), Some("first line\nsecond line"));
    assert_eq!(plan.sections[2].text.as_deref(), Some("hook line"));
    assert_eq!(plan.sections[3].text, None);

    let verse = &plan.sections[1].instruments;
    assert_eq!(verse.drums.as_ref().unwrap().kind, DrumPattern::Drill);
    assert_eq!(verse.bass.as_ref().unwrap().kind, BassPattern::Riff);
    assert_eq!(
        plan.sections[3].instruments.harmony.as_ref().unwrap().kind,
        HarmonyPattern::Arpeggio
    );
}

#[test]
fn overrides_are_forwarded_and_enforced() {
    let generator = Recording::answering(Ok(GENERATED));
    let planner = Planner::new(generator);
    let plan = planner.plan(LYRICS, "Drill", Some(150.0), Some("Am"));
    assert_eq!(plan.bpm, 150.0);
    assert_eq!(plan.key, "Am");
}

#[test]
fn request_carries_excerpt_and_style() {
    let long_lyrics = format!("{LYRICS}{}", "la ".repeat(1000));
    let planner = Planner::new(Recording::answering(Ok(GENERATED)));
    planner.plan(&long_lyrics, "Afrobeat", Some(100.0), None);

    let seen = planner.generator().seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].style, "Afrobeat");
    assert_eq!(seen[0].lyrics_excerpt.chars().count(), 1000);
    assert_eq!(seen[0].bpm_override, Some(100.0));
    assert!(seen[0].prompt().contains("> 137"));
}

#[test]
fn every_failure_mode_falls_back() {
    let failures: Vec<Result<&str, GeneratorError>> = vec![
        Err(GeneratorError::Timeout),
        Err(GeneratorError::Unavailable("503".into())),
        Ok(""),
        Ok("{ not json"),
        Ok(r#"{"bpm": 0, "sections": [{"name": "A", "barCount": 4}]}"#),
        Ok(r#"{"bpm": 120, "sections": []}"#),
        Ok(r#"{"bpm": 120, "sections": [{"name": "A", "barCount": -3}]}"#),
    ];
    for failure in failures {
        let plan = Planner::new(Recording::answering(failure.clone())).plan(LYRICS, "Rap", None, None);
        assert_eq!(plan.bpm, 120.0, "{failure:?}");
        assert_eq!(plan.key, "C");
        assert_eq!(plan.swing, 0.0);
        assert_eq!(plan.sections.len(), 2);
        assert_eq!(plan.total_duration, 40.0);
        assert_eq!(plan.sections[1].start_time, Some(8.0));
    }
}

#[test]
fn short_plans_are_kept() {
    let short = r#"{"bpm": 120, "sections": [{"name": "Verse", "barCount": 4, "energyLevel": 2.0}]}"#;
    let plan = Planner::new(Recording::answering(Ok(short))).plan("", "House", None, None);
    assert_eq!(plan.sections.len(), 1);
    assert_eq!(plan.total_duration, 8.0);
    assert!(!plan.meets_minimum_duration());
    // out-of-range energy is clamped
    assert_eq!(plan.sections[0].energy_level, 1.0);
}

#[test]
fn runaway_lengths_fall_back() {
    let huge = r#"{"bpm": 120, "sections": [
        {"name": "Verse", "barCount": 4294967295, "energyLevel": 0.5}
    ]}"#;
    let plan = Planner::new(Recording::answering(Ok(huge))).plan(LYRICS, "Drill", None, None);
    assert_eq!(plan.sections.len(), 2);
    assert_eq!(plan.total_duration, 40.0);

    // a bpm override can also stretch a reasonable reply past the limit
    let long = r#"{"bpm": 120, "sections": [{"name": "Verse", "barCount": 600}]}"#;
    let plan = Planner::new(Recording::answering(Ok(long))).plan(LYRICS, "Drill", Some(30.0), None);
    assert_eq!(plan.bpm, 120.0);
    assert_eq!(plan.total_duration, 40.0);
}
