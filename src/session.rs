//! Studio session: the one piece of state that outlives a render.
//!
//! A [`Studio`] owns the current [`SampleLibrary`]. Loading a style
//! replaces the library explicitly; every other operation borrows it for
//! the length of one render and exchanges WAV blobs with the caller.

use tracing::info;

use crate::codec::{decode_wav, encode_wav};
use crate::config::EngineConfig;
use crate::console::MixingConsole;
use crate::dsp::buffer::AudioBuffer;
use crate::error::{EngineError, EngineResult};
use crate::mutation;
use crate::plan::ArrangementPlan;
use crate::sequencer::{SequenceOptions, Sequencer};
use crate::settings::{MixerSettings, VocalFxSettings};
use crate::synth::SampleLibrary;
use crate::vocals::VocalTakes;

#[derive(Debug, Clone, Default)]
pub struct Studio {
    config: EngineConfig,
    library: Option<SampleLibrary>,
}

impl Studio {
    pub fn new(config: EngineConfig) -> Self {
        Studio {
            config,
            library: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn library(&self) -> Option<&SampleLibrary> {
        self.library.as_ref()
    }

    /// Synthesize the instrument set for `style`, replacing any previous one.
    pub fn load_style(&mut self, style: &str) -> &SampleLibrary {
        if let Some(previous) = &self.library {
            info!(previous = previous.style(), next = style, "replacing sample library");
        }
        self.library.insert(SampleLibrary::synthesize(style, &self.config))
    }

    /// Install an already built library.
    pub fn set_library(&mut self, library: SampleLibrary) {
        self.library = Some(library);
    }

    /// Sequence `plan` with the loaded library.
    pub fn compose(&self, plan: &ArrangementPlan, spark_level: f64) -> EngineResult<AudioBuffer> {
        let library = self.library.as_ref().ok_or(EngineError::MissingSampleLibrary)?;
        Sequencer::new(library, &self.config)
            .with_options(SequenceOptions::with_spark(spark_level))
            .sequence(plan)
    }

    /// [`Studio::compose`], encoded as WAV.
    pub fn compose_wav(&self, plan: &ArrangementPlan, spark_level: f64) -> EngineResult<Vec<u8>> {
        encode_wav(&self.compose(plan, spark_level)?)
    }

    /// Mix an instrumental WAV with vocal takes into a mastered WAV.
    pub fn mixdown_wav(
        &self,
        instrumental_wav: &[u8],
        takes: &VocalTakes,
        plan: &ArrangementPlan,
        settings: &MixerSettings,
        fx: &VocalFxSettings,
    ) -> EngineResult<Vec<u8>> {
        let instrumental = decode_wav(instrumental_wav)?;
        let mix = MixingConsole::new(&self.config).mixdown(&instrumental, takes, plan, settings, fx);
        encode_wav(&mix)
    }

    /// Mutate a finished WAV.
    pub fn mutate_wav(&self, mix_wav: &[u8], entropy: f64, command: Option<&str>) -> EngineResult<Vec<u8>> {
        let mix = decode_wav(mix_wav)?;
        let mutated = mutation::mutate(&mix, entropy, command, &self.config)?;
        encode_wav(&mutated)
    }
}
