use std::{fs, path::{Path, PathBuf}, sync::{Arc, Mutex, MutexGuard}};

use anyhow::Context;
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};
use tracing::{debug, info, warn};

use crate::engine::{EngineLoader, SpeechEngine, SynthesisSettings};

/// Loads a Piper ONNX voice from its `*.onnx.json` config.
#[derive(Debug, Clone)]
pub struct PiperLoader {
    config_path: PathBuf,
}

impl PiperLoader {
    pub fn new<P: Into<PathBuf>>(config_path: P) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Read sample rate from model config JSON
    fn read_sample_rate(cfg_path: &Path) -> anyhow::Result<u32> {
        let text = fs::read_to_string(cfg_path)
            .with_context(|| format!("Failed to read config file: {}", cfg_path.display()))?;
        let json: serde_json::Value =
            serde_json::from_str(&text).with_context(|| "Config file is not valid JSON")?;

        let sample_rate = json
            .get("audio")
            .and_then(|a| a.get("sample_rate"))
            .and_then(|sr| sr.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;

        Ok(sample_rate as u32)
    }
}

impl EngineLoader for PiperLoader {
    fn load(&self) -> anyhow::Result<Arc<dyn SpeechEngine>> {
        let sample_rate = Self::read_sample_rate(&self.config_path)?;
        let model = piper_rs::from_config_path(&self.config_path)
            .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
        let synth = PiperSpeechSynthesizer::new(model)?;
        info!(
            "Piper voice loaded from {} ({} Hz)",
            self.config_path.display(),
            sample_rate
        );
        Ok(Arc::new(PiperEngine {
            synth: Mutex::new(synth),
            sample_rate,
        }))
    }
}

/// Piper has no voice cloning or CFG; those settings are ignored.
pub struct PiperEngine {
    synth: Mutex<PiperSpeechSynthesizer>,
    sample_rate: u32,
}

impl SpeechEngine for PiperEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(
        &self,
        text: &str,
        reference_audio: Option<&Path>,
        settings: &SynthesisSettings,
    ) -> anyhow::Result<Vec<f32>> {
        if reference_audio.is_some() {
            debug!("Piper ignores reference audio; using the configured voice");
        }
        debug!(language = %settings.language, seed = settings.seed, "piper synth");

        let synth = lock_recovering(&self.synth);

        let iter: PiperSpeechStreamParallel = synth
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))?;

        let mut samples: Vec<f32> = Vec::new();
        for part in iter {
            samples.extend(
                part.map_err(|e| anyhow::anyhow!("chunk error: {e}"))?
                    .into_vec(),
            );
        }
        Ok(samples)
    }
}

/// Take the lock even if a previous synthesis panicked while holding it.
fn lock_recovering<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!("Synthesizer lock was poisoned by a panicked synthesis; recovering");
        lock.clear_poison();
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_sample_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.onnx.json");
        fs::write(&path, r#"{"audio": {"sample_rate": 22050}}"#).unwrap();
        assert_eq!(PiperLoader::read_sample_rate(&path).unwrap(), 22_050);

        fs::write(&path, r#"{"audio": {}}"#).unwrap();
        assert!(PiperLoader::read_sample_rate(&path).is_err());
    }

    #[test]
    fn test_load_fails_without_config() {
        let loader = PiperLoader::new("/nonexistent/voice.onnx.json");
        let err = loader.load().err().unwrap();
        assert!(format!("{err:#}").contains("Failed to read config file"));
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let lock = Arc::new(Mutex::new(7u32));
        let poisoner = Arc::clone(&lock);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("synthesis blew up");
        })
        .join();
        assert!(lock.is_poisoned());

        assert_eq!(*lock_recovering(&*lock), 7);
        assert!(!lock.is_poisoned());
    }
}
