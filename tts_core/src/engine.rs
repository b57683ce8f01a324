//! Seam between the job pipeline and the voice model.
//!
//! The model is a black box: the pipeline only loads it, asks it for samples
//! one chunk at a time, and unloads it.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Generation settings handed to the engine for every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisSettings {
    pub language: String,
    /// Emotion intensity, 0.0 - 2.0.
    pub exaggeration: f32,
    /// Text fidelity (CFG weight), 0.0 - 1.0.
    pub cfg_weight: f32,
    pub seed: u64,
}

/// A loaded inference engine.
///
/// `synthesize` is blocking and may take a long time; callers run it on the
/// blocking pool.
pub trait SpeechEngine: Send + Sync {
    fn sample_rate(&self) -> u32;

    fn synthesize(
        &self,
        text: &str,
        reference_audio: Option<&Path>,
        settings: &SynthesisSettings,
    ) -> anyhow::Result<Vec<f32>>;

    /// Release accelerator memory held outside of `Drop`.
    fn unload(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Builds a fresh engine instance. Called on every `unloaded -> loading` transition.
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> anyhow::Result<Arc<dyn SpeechEngine>>;
}
