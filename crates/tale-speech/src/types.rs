use serde::{Deserialize, Serialize};

/// Lowest speaking rate accepted by the synthesis service
pub const MIN_SPEAKING_RATE: f32 = 0.25;
/// Highest speaking rate accepted by the synthesis service
pub const MAX_SPEAKING_RATE: f32 = 4.0;

/// Gender tag attached to a voice profile
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named combination of language, speaker identity and gender offered by the service
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// BCP-47 language tag, e.g. `da-DK`
    pub language_tag: String,
    /// Service-side voice name, e.g. `da-DK-Wavenet-A`
    pub voice_id: String,
    pub gender: Gender,
}

impl VoiceProfile {
    pub fn new(language_tag: impl Into<String>, voice_id: impl Into<String>, gender: Gender) -> Self {
        Self {
            language_tag: language_tag.into(),
            voice_id: voice_id.into(),
            gender,
        }
    }
}

impl std::fmt::Display for VoiceProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.voice_id, self.language_tag, self.gender)
    }
}

/// Encoding requested from the synthesis service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    #[default]
    Mp3,
    OggOpus,
    Linear16,
}

impl AudioEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "MP3",
            AudioEncoding::OggOpus => "OGG_OPUS",
            AudioEncoding::Linear16 => "LINEAR16",
        }
    }
}

/// A single synthesis call. Built per `speak` and never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: VoiceProfile,
    pub speaking_rate: f32,
    pub audio_encoding: AudioEncoding,
}

impl SynthesisRequest {
    /// Build a request, clamping the rate into the range the service accepts
    pub fn new(
        text: impl Into<String>,
        voice: VoiceProfile,
        speaking_rate: f32,
        audio_encoding: AudioEncoding,
    ) -> Self {
        Self {
            text: text.into(),
            voice,
            speaking_rate: clamp_speaking_rate(speaking_rate),
            audio_encoding,
        }
    }
}

/// Clamp a speaking rate into `[MIN_SPEAKING_RATE, MAX_SPEAKING_RATE]`.
/// Non-finite rates fall back to 1.0.
pub fn clamp_speaking_rate(rate: f32) -> f32 {
    if !rate.is_finite() {
        log::debug!("Non-finite speaking rate {}, using 1.0", rate);
        return 1.0;
    }
    let clamped = rate.clamp(MIN_SPEAKING_RATE, MAX_SPEAKING_RATE);
    if clamped != rate {
        log::debug!("Speaking rate {} clamped to {}", rate, clamped);
    }
    clamped
}

/// Encoded audio returned by a synthesis call or served from the cache
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub payload: Vec<u8>,
    pub encoding: AudioEncoding,
}

impl SynthesizedAudio {
    pub fn new(payload: Vec<u8>, encoding: AudioEncoding) -> Self {
        Self { payload, encoding }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Per-call overrides for `speak`. Unset fields use the manager defaults.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpeakOptions {
    pub voice: Option<VoiceProfile>,
    pub speaking_rate: Option<f32>,
}

impl SpeakOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voice(mut self, voice: VoiceProfile) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn with_speaking_rate(mut self, rate: f32) -> Self {
        self.speaking_rate = Some(rate);
        self
    }
}

/// How a `speak` call finished
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Remote audio played to its natural end
    Completed,
    /// Preempted by a newer call or by `stop()`
    Interrupted,
    /// Handed to the local synthesizer instead of the remote service
    LocalFallback,
}

/// State of the single playback session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Playing,
    Paused,
}
