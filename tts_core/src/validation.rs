use crate::error::{Result, TtsError};
use crate::presets::{self, Preset};

/// Default maximum text length for a single job, in characters.
pub const MAX_TEXT_LENGTH: usize = 50_000;

const EXAGGERATION_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;
const CFG_WEIGHT_RANGE: std::ops::RangeInclusive<f32> = 0.0..=1.0;

/// Validate the text of a job request. Length is counted in characters.
pub fn validate_text(text: &str, max_chars: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(TtsError::Validation("Text cannot be empty".to_string()));
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(TtsError::Validation(format!(
            "Text too long ({len} characters, max {max_chars})"
        )));
    }
    Ok(())
}

/// Validate a language code against the supported list.
pub fn validate_language(code: &str) -> Result<()> {
    if presets::language(code).is_none() {
        let supported: Vec<&str> = presets::LANGUAGES.iter().map(|l| l.code).collect();
        return Err(TtsError::Validation(format!(
            "Unsupported language: {code}. Supported: {}",
            supported.join(", ")
        )));
    }
    Ok(())
}

/// Look up a preset by key, rejecting unknown keys.
pub fn validate_preset(key: &str) -> Result<&'static Preset> {
    presets::preset_by_key(key)
        .ok_or_else(|| TtsError::Validation(format!("Unknown preset: {key}")))
}

/// Validate generation settings that were given explicitly.
pub fn validate_settings(exaggeration: Option<f32>, cfg_weight: Option<f32>) -> Result<()> {
    if let Some(value) = exaggeration {
        if !EXAGGERATION_RANGE.contains(&value) {
            return Err(TtsError::Validation(format!(
                "exaggeration must be between 0.0 and 2.0, got {value}"
            )));
        }
    }
    if let Some(value) = cfg_weight {
        if !CFG_WEIGHT_RANGE.contains(&value) {
            return Err(TtsError::Validation(format!(
                "cfg_weight must be between 0.0 and 1.0, got {value}"
            )));
        }
    }
    Ok(())
}
