//! # Tale Speech
//!
//! Speech playback manager for Danish text-to-speech.
//!
//! The manager wraps a remote synthesis service, caches the synthesized audio,
//! and plays it through a single exclusive playback session. When the service
//! is unreachable or no credential is configured it can degrade to an
//! on-device synthesizer.
//!
//! ## Features
//!
//! - **Synthesis**: Google Cloud Text-to-Speech over REST with API-key auth
//! - **Caching**: content-addressed audio cache with retention and batch eviction
//! - **Playback**: one session at a time; a new `speak` preempts the previous one
//! - **Local fallback**: espeak-ng when the remote path fails
//! - **Sequences and emotions**: ordered utterances with a pause between them,
//!   and emotion tags mapped to speaking rates
//!
//! ## Architecture
//!
//! Every external capability sits behind a trait so it can be swapped in tests:
//! - `SynthesisProvider`: remote synthesis (`providers::GoogleCloudTts`)
//! - `AudioOutput`: audio device (`playback::RodioOutput` with the `playback` feature)
//! - `LocalSynthesizer`: on-device speech (`local::EspeakSynthesizer`)
//! - `KeyValueStore`: cache storage (`cache::MemoryStore`, `cache::FileStore`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use tale_speech::{SpeakOptions, SpeechConfig, SpeechManager};
//!
//! async fn greet() -> tale_speech::SpeechResult<()> {
//!     let config = SpeechConfig::default().with_env_overrides();
//!     let manager = SpeechManager::builder(config).build()?;
//!     manager.speak("Hej med dig", SpeakOptions::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod emotion;
pub mod error;
pub mod local;
pub mod manager;
pub mod playback;
pub mod provider;
pub mod providers;
pub mod types;
pub mod voices;

pub use cache::{AudioCache, FileStore, KeyValueStore, MemoryStore, StoredEntry};
pub use config::SpeechConfig;
pub use emotion::Emotion;
pub use error::{SpeechError, SpeechResult, StoreError, StoreResult};
pub use local::{EspeakSynthesizer, LocalSynthesizer, LocalUtterance};
pub use manager::{SpeechManager, SpeechManagerBuilder};
pub use playback::{AudioOutput, Playback, PlaybackControl};
pub use provider::SynthesisProvider;
pub use providers::GoogleCloudTts;
pub use types::{
    AudioEncoding, Gender, PlaybackOutcome, SessionState, SpeakOptions, SynthesisRequest,
    SynthesizedAudio, VoiceProfile,
};
pub use voices::{DANISH, danish_catalog};

#[cfg(feature = "playback")]
pub use playback::RodioOutput;
