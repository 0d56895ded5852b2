//! Emotion presets
//!
//! Each emotion maps to a preset speaking rate. The voice family does not
//! support pitch, so rate is the only knob.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Emotion {
    #[default]
    Calm,
    Happy,
    Serious,
    Encouraging,
}

impl Emotion {
    /// Parse an emotion tag. Unknown tags map to `Calm`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "calm" => Emotion::Calm,
            "happy" => Emotion::Happy,
            "serious" => Emotion::Serious,
            "encouraging" => Emotion::Encouraging,
            other => {
                log::debug!("Unknown emotion tag '{}', using calm", other);
                Emotion::Calm
            }
        }
    }

    pub fn speaking_rate(&self) -> f32 {
        match self {
            Emotion::Calm => 0.85,
            Emotion::Happy => 1.0,
            Emotion::Serious => 0.8,
            Emotion::Encouraging => 0.95,
        }
    }

    pub fn identifier(&self) -> &'static str {
        match self {
            Emotion::Calm => "calm",
            Emotion::Happy => "happy",
            Emotion::Serious => "serious",
            Emotion::Encouraging => "encouraging",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_rates() {
        assert_eq!(Emotion::Calm.speaking_rate(), 0.85);
        assert_eq!(Emotion::Happy.speaking_rate(), 1.0);
        assert_eq!(Emotion::Serious.speaking_rate(), 0.8);
        assert_eq!(Emotion::Encouraging.speaking_rate(), 0.95);
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(Emotion::from_tag("happy"), Emotion::Happy);
        assert_eq!(Emotion::from_tag(" SERIOUS "), Emotion::Serious);
        assert_eq!(Emotion::from_tag("encouraging"), Emotion::Encouraging);
    }

    #[test]
    fn test_unknown_tag_defaults_to_calm() {
        assert_eq!(Emotion::from_tag("furious"), Emotion::Calm);
        assert_eq!(Emotion::from_tag(""), Emotion::Calm);
    }
}
