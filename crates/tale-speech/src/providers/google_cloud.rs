//! Google Cloud Text-to-Speech provider
//!
//! Talks to the REST API v1 with API-key authentication:
//! `POST {base}/text:synthesize?key=KEY`. The request never carries a pitch
//! parameter because the Danish voice family rejects it.

use crate::config::{DEFAULT_ENDPOINT, SpeechConfig, is_usable_api_key};
use crate::error::{SpeechError, SpeechResult};
use crate::provider::SynthesisProvider;
use crate::types::{SynthesisRequest, SynthesizedAudio};
use crate::voices::DANISH;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct SynthesizeBody<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    #[serde(rename = "audioConfig")]
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct VoiceSelection<'a> {
    #[serde(rename = "languageCode")]
    language_code: &'a str,
    name: &'a str,
    #[serde(rename = "ssmlGender")]
    ssml_gender: &'static str,
}

#[derive(Serialize)]
struct AudioConfig {
    #[serde(rename = "audioEncoding")]
    audio_encoding: &'static str,
    #[serde(rename = "speakingRate")]
    speaking_rate: f32,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Client for the Google Cloud Text-to-Speech API
pub struct GoogleCloudTts {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GoogleCloudTts {
    pub fn builder() -> GoogleCloudTtsBuilder {
        GoogleCloudTtsBuilder::new()
    }

    /// Build a client from the manager configuration
    pub fn from_config(config: &SpeechConfig) -> SpeechResult<Self> {
        let mut builder = GoogleCloudTtsBuilder::new().base_url(&config.endpoint);
        if let Some(key) = &config.api_key {
            builder = builder.api_key(key);
        }
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout_seconds(secs);
        }
        builder.build()
    }

    /// Returns the API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check_status(response: reqwest::Response) -> SpeechResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.error.message)
            .unwrap_or(body);
        Err(SpeechError::Service {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SynthesisProvider for GoogleCloudTts {
    async fn synthesize(&self, request: &SynthesisRequest) -> SpeechResult<SynthesizedAudio> {
        if !self.is_configured() {
            return Err(SpeechError::Configuration(
                "Missing Google Cloud TTS API key".to_string(),
            ));
        }

        let body = SynthesizeBody {
            input: SynthesisInput {
                text: &request.text,
            },
            voice: VoiceSelection {
                language_code: &request.voice.language_tag,
                name: &request.voice.voice_id,
                ssml_gender: request.voice.gender.as_str(),
            },
            audio_config: AudioConfig {
                audio_encoding: request.audio_encoding.as_str(),
                speaking_rate: request.speaking_rate,
            },
        };

        let response = self
            .client
            .post(self.url("text:synthesize"))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let raw = response.bytes().await?;
        let parsed: SynthesizeResponse = serde_json::from_slice(&raw)
            .map_err(|e| SpeechError::Decode(format!("malformed synthesis response: {}", e)))?;
        let payload = STANDARD
            .decode(parsed.audio_content.as_bytes())
            .map_err(|e| SpeechError::Decode(e.to_string()))?;

        let audio = SynthesizedAudio::new(payload, request.audio_encoding);
        if audio.is_empty() {
            return Err(SpeechError::Decode(
                "service returned empty audio content".to_string(),
            ));
        }
        log::debug!("Synthesized {} bytes of {:?}", audio.len(), audio.encoding);
        Ok(audio)
    }

    fn is_configured(&self) -> bool {
        is_usable_api_key(&self.api_key)
    }

    async fn health_check(&self) -> SpeechResult<()> {
        if !self.is_configured() {
            return Err(SpeechError::Configuration(
                "Missing Google Cloud TTS API key".to_string(),
            ));
        }
        let response = self
            .client
            .get(self.url("voices"))
            .query(&[("languageCode", DANISH), ("key", self.api_key.as_str())])
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "google-cloud-tts"
    }
}

/// Builder for `GoogleCloudTts`
#[derive(Default)]
pub struct GoogleCloudTtsBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

impl GoogleCloudTtsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = Some(secs);
        self
    }

    /// Build the client. A missing key is allowed; the manager checks
    /// `is_configured` before issuing calls.
    pub fn build(self) -> SpeechResult<GoogleCloudTts> {
        let mut client = Client::builder();
        if let Some(secs) = self.timeout_seconds {
            client = client.timeout(Duration::from_secs(secs));
        }
        let client = client.build()?;

        Ok(GoogleCloudTts {
            api_key: self.api_key.unwrap_or_default(),
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            client,
        })
    }
}
