// Configuration for the server, read from the environment (and .env)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tts_core::audio::AudioConfig;
use tts_core::scheduler::{PipelineConfig, DEFAULT_MAX_CHUNK_CHARS};
use tts_core::validation::MAX_TEXT_LENGTH;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Seconds of inactivity before the model is unloaded; 0 disables.
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
    pub outputs_dir: PathBuf,
    pub model_config: PathBuf,
    pub pipeline: PipelineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7860,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            idle_timeout_secs: 600,
            reap_interval_secs: 60,
            outputs_dir: PathBuf::from("outputs"),
            model_config: PathBuf::from("models/model.onnx.json"),
            pipeline: PipelineConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = AudioConfig::default();
        let audio = AudioConfig {
            highpass_hz: env_or("HIGHPASS_FREQ", defaults.highpass_hz),
            lowpass_hz: env_or("LOWPASS_FREQ", defaults.lowpass_hz),
            noise_gate_db: env_or("NOISE_GATE_THRESHOLD", defaults.noise_gate_db),
            normalize: env_flag("NORMALIZE_AUDIO", defaults.normalize),
            silence_ms: env_or("SILENCE_BETWEEN_CHUNKS_MS", defaults.silence_ms),
            fade_ms: env_or("FADE_MS", defaults.fade_ms),
        };

        let pipeline = PipelineConfig {
            max_chunk_chars: env_or("MAX_CHUNK_CHARS", DEFAULT_MAX_CHUNK_CHARS),
            max_text_chars: env_or("MAX_TEXT_CHARS", MAX_TEXT_LENGTH),
            audio,
        };

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        Self {
            port: env_or("PORT", 7860),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", 60),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 60),
            cors_allowed_origins,
            idle_timeout_secs: env_or("IDLE_TIMEOUT", 600),
            reap_interval_secs: env_or("MODEL_REAP_INTERVAL_SECS", 60),
            outputs_dir: env_or("OUTPUTS_DIR", PathBuf::from("outputs")),
            model_config: env_or("TTS_MODEL_CONFIG", PathBuf::from("models/model.onnx.json")),
            pipeline,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }

    /// Milliseconds between rate-limit tokens.
    pub fn rate_limit_replenish_ms(&self) -> u64 {
        (60_000 / u64::from(self.rate_limit_per_minute.max(1))).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 7860);
        assert_eq!(config.idle_timeout(), Duration::from_secs(600));
        assert_eq!(config.pipeline.max_chunk_chars, 200);
        assert_eq!(config.pipeline.max_text_chars, 50_000);
        assert_eq!(config.pipeline.audio.silence_ms, 150);
    }

    #[test]
    fn test_env_helpers_fall_back_on_garbage() {
        std::env::set_var("SERVER_CONFIG_TEST_NUMBER", "not-a-number");
        assert_eq!(env_or("SERVER_CONFIG_TEST_NUMBER", 42u32), 42);
        std::env::set_var("SERVER_CONFIG_TEST_NUMBER", " 17 ");
        assert_eq!(env_or("SERVER_CONFIG_TEST_NUMBER", 42u32), 17);

        std::env::set_var("SERVER_CONFIG_TEST_FLAG", "False");
        assert!(!env_flag("SERVER_CONFIG_TEST_FLAG", true));
        std::env::set_var("SERVER_CONFIG_TEST_FLAG", "1");
        assert!(env_flag("SERVER_CONFIG_TEST_FLAG", false));
        assert!(env_flag("SERVER_CONFIG_TEST_UNSET_FLAG", true));
    }

    #[test]
    fn test_reap_interval_never_zero() {
        let config = ServerConfig {
            reap_interval_secs: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.reap_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_rate_limit_replenish_interval() {
        let per_minute = |rate| ServerConfig {
            rate_limit_per_minute: rate,
            ..ServerConfig::default()
        };
        assert_eq!(per_minute(60).rate_limit_replenish_ms(), 1_000);
        assert_eq!(per_minute(120).rate_limit_replenish_ms(), 500);
        assert_eq!(per_minute(30).rate_limit_replenish_ms(), 2_000);
        assert_eq!(per_minute(0).rate_limit_replenish_ms(), 60_000);
        assert_eq!(per_minute(1_000_000).rate_limit_replenish_ms(), 1);
    }
}
