//! Supported languages and named voice presets.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

pub const LANGUAGES: &[Language] = &[
    Language { code: "tr", name: "Turkish" },
    Language { code: "en", name: "English" },
    Language { code: "de", name: "German" },
    Language { code: "fr", name: "French" },
    Language { code: "es", name: "Spanish" },
    Language { code: "it", name: "Italian" },
    Language { code: "pt", name: "Portuguese" },
    Language { code: "ru", name: "Russian" },
    Language { code: "zh", name: "Chinese" },
    Language { code: "ja", name: "Japanese" },
    Language { code: "ko", name: "Korean" },
    Language { code: "ar", name: "Arabic" },
];

pub const DEFAULT_LANGUAGE: &str = "tr";

/// A named exaggeration / CFG weight pair.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Preset {
    pub key: &'static str,
    pub group: &'static str,
    pub description: &'static str,
    pub exaggeration: f32,
    pub cfg_weight: f32,
}

const fn preset(
    key: &'static str,
    group: &'static str,
    description: &'static str,
    exaggeration: f32,
    cfg_weight: f32,
) -> Preset {
    Preset {
        key,
        group,
        description,
        exaggeration,
        cfg_weight,
    }
}

pub const PRESETS: &[Preset] = &[
    preset("default", "basic", "Balanced, neutral voice", 0.5, 0.5),
    preset("casual", "basic", "Friendly, natural conversation", 0.6, 0.6),
    preset("news_anchor", "professional", "Formal, clear and articulate", 0.3, 0.8),
    preset("commercial", "professional", "Energetic, punchy and attention-grabbing", 0.9, 0.7),
    preset("formal", "professional", "Serious, professional tone", 0.2, 0.9),
    preset("podcast", "professional", "Warm and relaxed narration", 0.4, 0.6),
    preset("storyteller", "story", "Lively, engaging storytelling", 0.8, 0.5),
    preset("kids_story", "story", "Playful, energetic children's story", 1.0, 0.5),
    preset("poetry", "story", "Emotional, flowing recitation", 0.7, 0.4),
    preset("dramatic", "story", "Intense emotional delivery", 1.2, 0.4),
    preset("excited", "emotional", "Enthusiastic and thrilled", 1.3, 0.5),
    preset("scared", "emotional", "Nervous and fearful", 1.1, 0.3),
    preset("sad", "emotional", "Melancholic and sorrowful", 0.4, 0.3),
    preset("romantic", "emotional", "Soft and tender", 0.6, 0.4),
    preset("angry", "emotional", "Harsh and furious", 1.4, 0.6),
    preset("robot", "special", "Mechanical, monotone voice", 0.1, 0.9),
    preset("asmr", "special", "Soft, calm whisper", 0.2, 0.3),
    preset("energetic", "special", "Maximum energy and excitement", 1.5, 0.5),
];

pub fn language(code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.code == code)
}

pub fn preset_by_key(key: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(language("tr").map(|l| l.name), Some("Turkish"));
        assert!(language("xx").is_none());
        let anchor = preset_by_key("news_anchor").unwrap();
        assert_eq!((anchor.exaggeration, anchor.cfg_weight), (0.3, 0.8));
        assert!(preset_by_key("whisper").is_none());
    }

    #[test]
    fn test_presets_within_engine_ranges() {
        for p in PRESETS {
            assert!((0.0..=2.0).contains(&p.exaggeration), "{}", p.key);
            assert!((0.0..=1.0).contains(&p.cfg_weight), "{}", p.key);
        }
    }
}
