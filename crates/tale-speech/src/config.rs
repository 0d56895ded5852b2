//! Configuration for the speech manager

use crate::error::{SpeechError, SpeechResult};
use crate::types::{AudioEncoding, VoiceProfile};
use crate::voices::danish_catalog;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

static ENV_TALE_TTS_API_KEY: &str = "TALE_TTS_API_KEY";
static ENV_GOOGLE_TTS_API_KEY: &str = "GOOGLE_TTS_API_KEY";
static ENV_TALE_TTS_ENDPOINT: &str = "TALE_TTS_ENDPOINT";

/// Values shipped in sample configs that must never be sent to the service
const PLACEHOLDER_KEYS: &[&str] = &[
    "YOUR_API_KEY",
    "YOUR_GOOGLE_CLOUD_API_KEY",
    "YOUR_GOOGLE_API_KEY",
    "API_KEY_HERE",
    "CHANGEME",
];

pub const DEFAULT_ENDPOINT: &str = "https://texttospeech.googleapis.com/v1";

/// Speech manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// API key for the synthesis service
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the synthesis service
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Catalog index of the default voice
    #[serde(default)]
    pub default_voice_index: usize,

    /// Default speaking rate (0.25 - 4.0, default: 0.9)
    #[serde(default = "default_speaking_rate")]
    pub speaking_rate: f32,

    #[serde(default)]
    pub audio_encoding: AudioEncoding,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Key prefix for every cache entry owned by the manager
    #[serde(default = "default_cache_namespace")]
    pub cache_namespace: String,

    #[serde(default = "default_retention_days")]
    pub cache_retention_days: u64,

    /// Entries evicted when a cache write runs out of room
    #[serde(default = "default_eviction_batch_size")]
    pub eviction_batch_size: usize,

    /// Degrade to the local synthesizer instead of failing
    #[serde(default)]
    pub use_local_fallback: bool,

    /// Volume handed to the local synthesizer (0.0 - 2.0)
    #[serde(default = "default_local_volume")]
    pub local_volume: f32,

    /// Optional client-side timeout for synthesis calls
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Directory for the persistent audio cache
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "danish_catalog")]
    pub voices: Vec<VoiceProfile>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_speaking_rate() -> f32 {
    0.9
}

fn default_true() -> bool {
    true
}

fn default_cache_namespace() -> String {
    "tts_cache_".to_string()
}

fn default_retention_days() -> u64 {
    7
}

fn default_eviction_batch_size() -> usize {
    10
}

fn default_local_volume() -> f32 {
    1.0
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_endpoint(),
            default_voice_index: 0,
            speaking_rate: default_speaking_rate(),
            audio_encoding: AudioEncoding::default(),
            cache_enabled: true,
            cache_namespace: default_cache_namespace(),
            cache_retention_days: default_retention_days(),
            eviction_batch_size: default_eviction_batch_size(),
            use_local_fallback: false,
            local_volume: default_local_volume(),
            request_timeout_secs: None,
            cache_dir: None,
            voices: danish_catalog(),
        }
    }
}

impl SpeechConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SpeechResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SpeechResult<Self> {
        let config: SpeechConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides for the API key and endpoint
    pub fn with_env_overrides(mut self) -> Self {
        let key = env::var(ENV_TALE_TTS_API_KEY).or_else(|_| env::var(ENV_GOOGLE_TTS_API_KEY));
        if let Ok(key) = key {
            self.api_key = Some(key);
        }
        if let Ok(endpoint) = env::var(ENV_TALE_TTS_ENDPOINT) {
            self.endpoint = endpoint;
        }
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_local_fallback(mut self, enabled: bool) -> Self {
        self.use_local_fallback = enabled;
        self
    }

    pub fn with_speaking_rate(mut self, rate: f32) -> Self {
        self.speaking_rate = rate;
        self
    }

    pub fn with_voices(mut self, voices: Vec<VoiceProfile>) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// True when an API key is set and is not a known placeholder
    pub fn has_valid_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(is_usable_api_key)
    }

    /// Reject configurations the manager cannot run with
    pub fn validate(&self) -> SpeechResult<()> {
        if self.voices.is_empty() {
            return Err(SpeechError::Configuration(
                "voice catalog must contain at least one voice".to_string(),
            ));
        }
        if self.default_voice_index >= self.voices.len() {
            return Err(SpeechError::Configuration(format!(
                "default_voice_index {} is out of range for {} voices",
                self.default_voice_index,
                self.voices.len()
            )));
        }
        if self.eviction_batch_size == 0 {
            return Err(SpeechError::Configuration(
                "eviction_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// An API key is usable when it is non-blank and not a sample placeholder
pub fn is_usable_api_key(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty()
        && !PLACEHOLDER_KEYS
            .iter()
            .any(|placeholder| key.eq_ignore_ascii_case(placeholder))
}
