//! Procedural beat production engine.
//!
//! A render runs in stages, each exchanging plain data or WAV blobs:
//! [`planner`] turns lyrics into an [`ArrangementPlan`], [`synth`] builds a
//! [`SampleLibrary`] for a style, [`sequencer`] places it on the plan,
//! [`console`] mixes vocal takes over the instrumental and masters the
//! result, and [`mutation`] reworks a finished mix. [`Studio`] chains the
//! stages natively; the `#[wasm_bindgen]` functions below expose the same
//! operations to a browser host.

pub mod codec;
pub mod config;
pub mod console;
pub mod dsp;
pub mod error;
pub mod mutation;
pub mod plan;
pub mod planner;
pub mod sequencer;
pub mod session;
pub mod settings;
pub mod synth;
pub mod vocals;

use std::collections::BTreeMap;
use std::fmt::Display;

use tracing::warn;
use wasm_bindgen::prelude::*;

pub use crate::config::EngineConfig;
pub use crate::error::{EngineError, EngineResult, GeneratorError};
pub use crate::plan::ArrangementPlan;
pub use crate::session::Studio;
pub use crate::settings::{MixerSettings, VocalFxSettings};
pub use crate::synth::SampleLibrary;
pub use crate::vocals::VocalTakes;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn js_err(e: impl Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn config_with_seed(seed: Option<u64>) -> EngineConfig {
    EngineConfig {
        seed,
        ..EngineConfig::default()
    }
}

/// WASM-exposed: return the stemforge-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: finish a plan from raw generator output. Runs the same
/// validation, fallback, lyric mapping and timeline pass as the native
/// planner and returns the plan as a JS object.
#[wasm_bindgen]
pub fn finalize_plan(
    generator_output: Option<String>,
    lyrics: &str,
    style: &str,
    bpm_override: Option<f64>,
    key_override: Option<String>,
) -> Result<JsValue, JsValue> {
    let generator = |_: &planner::PlanRequest| -> Result<String, GeneratorError> {
        generator_output.clone().ok_or(GeneratorError::EmptyResponse)
    };
    let plan = planner::Planner::new(generator).plan(lyrics, style, bpm_override, key_override.as_deref());
    serde_wasm_bindgen::to_value(&plan).map_err(js_err)
}

/// WASM-exposed: the prompt the host should send to its plan generator.
#[wasm_bindgen]
pub fn plan_prompt(lyrics: &str, style: &str, bpm_override: Option<f64>, key_override: Option<String>) -> String {
    planner::PlanRequest::new(lyrics, style, bpm_override, key_override.as_deref()).prompt()
}

/// WASM-exposed: synthesize the instruments for `style` and sequence
/// `plan_json` into a WAV byte array.
#[wasm_bindgen]
pub fn render_instrumental_wav(
    plan_json: &str,
    style: &str,
    spark_level: f64,
    seed: Option<u64>,
) -> Result<Vec<u8>, JsValue> {
    let mut plan = ArrangementPlan::from_json(plan_json).map_err(js_err)?;
    plan.compute_timeline();
    let mut studio = Studio::new(config_with_seed(seed));
    studio.load_style(style);
    studio.compose_wav(&plan, spark_level).map_err(js_err)
}

/// WASM-exposed: mix an instrumental WAV with base64 vocal takes keyed by
/// section index (`{"0": "...", "2": "..."}`).
#[wasm_bindgen]
pub fn mixdown_wav(
    instrumental_wav: &[u8],
    vocal_takes_b64: JsValue,
    plan_json: &str,
    mixer_json: &str,
    vocal_fx_json: &str,
) -> Result<Vec<u8>, JsValue> {
    let raw: BTreeMap<String, String> = if vocal_takes_b64.is_undefined() || vocal_takes_b64.is_null() {
        BTreeMap::new()
    } else {
        serde_wasm_bindgen::from_value(vocal_takes_b64).map_err(js_err)?
    };
    let payloads: BTreeMap<usize, String> = raw
        .into_iter()
        .filter_map(|(key, payload)| match key.trim().parse::<usize>() {
            Ok(index) => Some((index, payload)),
            Err(_) => {
                warn!(key = %key, "vocal take key is not a section index, skipping");
                None
            }
        })
        .collect();
    let takes = VocalTakes::from_base64(&payloads).map_err(js_err)?;

    let mut plan = ArrangementPlan::from_json(plan_json).map_err(js_err)?;
    plan.compute_timeline();
    let settings: MixerSettings = parse_or_default(mixer_json).map_err(js_err)?;
    let fx: VocalFxSettings = parse_or_default(vocal_fx_json).map_err(js_err)?;

    Studio::new(EngineConfig::default())
        .mixdown_wav(instrumental_wav, &takes, &plan, &settings, &fx)
        .map_err(js_err)
}

/// WASM-exposed: apply a mutation command and entropy stutter to a WAV.
#[wasm_bindgen]
pub fn mutate_wav(mix_wav: &[u8], entropy: f64, command: Option<String>) -> Result<Vec<u8>, JsValue> {
    Studio::new(EngineConfig::default())
        .mutate_wav(mix_wav, entropy, command.as_deref())
        .map_err(js_err)
}

/// WASM-exposed: convert a base64 speech payload into a WAV byte array.
#[wasm_bindgen]
pub fn decode_speech_to_wav(base64: &str) -> Result<Vec<u8>, JsValue> {
    let speech = codec::decode_speech_base64(base64).map_err(js_err)?;
    codec::encode_wav(&speech).map_err(js_err)
}

/// WASM-exposed: the built-in vocal effect presets.
#[wasm_bindgen]
pub fn vocal_presets() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&settings::VOCAL_PRESETS[..]).map_err(js_err)
}

/// Parse settings JSON; blank input means defaults.
fn parse_or_default<T>(json: &str) -> EngineResult<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    if json.trim().is_empty() {
        Ok(T::default())
    } else {
        Ok(serde_json::from_str(json)?)
    }
}
