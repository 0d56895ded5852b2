//! Speech playback manager
//!
//! `SpeechManager` is the single owner of the playback session and the cache
//! namespace. Construct it once with `SpeechManagerBuilder` and share it by
//! reference or `Arc`.
//!
//! Every `speak` call takes a ticket. A newer `speak` or a `stop` bumps the
//! ticket, so older in-flight calls notice they were preempted. A call preempted
//! while its synthesis request is in flight still caches the response but does
//! not play it. Local fallback utterances occupy the same session slot as
//! remote playback.

use crate::cache::{AudioCache, FileStore, KeyValueStore, MemoryStore};
use crate::config::SpeechConfig;
use crate::emotion::Emotion;
use crate::error::{SpeechError, SpeechResult};
use crate::local::{LocalSynthesizer, LocalUtterance};
use crate::playback::{AudioOutput, PlaybackControl};
use crate::provider::SynthesisProvider;
use crate::providers::GoogleCloudTts;
use crate::types::{
    PlaybackOutcome, SessionState, SpeakOptions, SynthesisRequest, SynthesizedAudio, VoiceProfile,
};
use chrono::TimeDelta;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};

enum SessionHandle {
    Remote(Box<dyn PlaybackControl>),
    Local(Arc<dyn LocalSynthesizer>),
}

struct ActiveSession {
    ticket: u64,
    handle: SessionHandle,
    cancel: oneshot::Sender<()>,
}

impl ActiveSession {
    fn pause(&self) -> bool {
        match &self.handle {
            SessionHandle::Remote(control) => {
                control.pause();
                true
            }
            SessionHandle::Local(local) => {
                local.pause();
                local.is_paused()
            }
        }
    }

    fn resume(&self) {
        match &self.handle {
            SessionHandle::Remote(control) => control.resume(),
            SessionHandle::Local(local) => local.resume(),
        }
    }
}

#[derive(Default)]
struct SessionSlot {
    state: SessionState,
    active: Option<ActiveSession>,
}

impl SessionSlot {
    fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.cancel.send(());
            match active.handle {
                SessionHandle::Remote(control) => control.stop(),
                SessionHandle::Local(local) => local.cancel(),
            }
        }
        self.state = SessionState::Idle;
    }
}

/// Speech playback manager
pub struct SpeechManager {
    config: SpeechConfig,
    provider: Arc<dyn SynthesisProvider>,
    output: Arc<dyn AudioOutput>,
    local: Option<Arc<dyn LocalSynthesizer>>,
    cache: Option<AudioCache>,
    current_voice: Mutex<usize>,
    session: Mutex<SessionSlot>,
    ticket: AtomicU64,
}

impl SpeechManager {
    pub fn builder(config: SpeechConfig) -> SpeechManagerBuilder {
        SpeechManagerBuilder::new(config)
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// Speak `text`, returning once playback ends or is interrupted.
    ///
    /// Cached audio is reused when available. Without a valid credential the
    /// call fails with `SpeechError::Configuration` unless local fallback is
    /// enabled.
    pub async fn speak(
        &self,
        text: &str,
        options: SpeakOptions,
    ) -> SpeechResult<PlaybackOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeechError::InvalidRequest(
                "text must not be empty".to_string(),
            ));
        }

        let ticket = self.ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let request = self.resolve_request(text, options).await;

        if !self.provider.is_configured() {
            if self.fallback_enabled() {
                log::warn!(
                    "No valid API key for {}, using local synthesizer",
                    self.provider.provider_name()
                );
                return self.speak_locally(&request, ticket).await;
            }
            log::warn!(
                "No valid API key for {}; set api_key in the config or TALE_TTS_API_KEY",
                self.provider.provider_name()
            );
            return Err(SpeechError::Configuration(
                "no valid speech service API key configured".to_string(),
            ));
        }

        let audio = match self.fetch_audio(&request).await {
            Ok(audio) => audio,
            Err(e) if self.fallback_enabled() => {
                log::warn!("Synthesis failed ({}), using local synthesizer", e);
                return self.speak_locally(&request, ticket).await;
            }
            Err(e) => return Err(e),
        };

        self.play(audio, ticket).await
    }

    /// Speak with the preset speaking rate of an emotion tag. Unknown tags use calm.
    pub async fn speak_with_emotion(
        &self,
        text: &str,
        tag: &str,
    ) -> SpeechResult<PlaybackOutcome> {
        let emotion = Emotion::from_tag(tag);
        let options = SpeakOptions::new().with_speaking_rate(emotion.speaking_rate());
        self.speak(text, options).await
    }

    /// Speak each text in order, waiting `delay` between items.
    ///
    /// The first error aborts the rest of the sequence. A `stop()` or a newer
    /// `speak` ends the sequence with `Interrupted`.
    pub async fn speak_sequence<S: AsRef<str>>(
        &self,
        texts: &[S],
        delay: Duration,
    ) -> SpeechResult<PlaybackOutcome> {
        for (index, text) in texts.iter().enumerate() {
            let outcome = self.speak(text.as_ref(), SpeakOptions::default()).await?;
            if outcome == PlaybackOutcome::Interrupted {
                log::debug!("Sequence interrupted at item {}", index);
                return Ok(PlaybackOutcome::Interrupted);
            }

            if index + 1 < texts.len() {
                let ticket = self.ticket.load(Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                if self.ticket.load(Ordering::SeqCst) != ticket {
                    log::debug!("Sequence interrupted after item {}", index);
                    return Ok(PlaybackOutcome::Interrupted);
                }
            }
        }
        Ok(PlaybackOutcome::Completed)
    }

    /// Suspend remote playback, or the local synthesizer if that is speaking.
    ///
    /// A local synthesizer that cannot pause keeps the session `Playing`.
    pub async fn pause(&self) {
        let mut slot = self.session.lock().await;
        if slot.state != SessionState::Playing {
            return;
        }
        if slot.active.as_ref().is_some_and(ActiveSession::pause) {
            slot.state = SessionState::Paused;
        }
    }

    /// Resume whatever `pause` suspended
    pub async fn resume(&self) {
        let mut slot = self.session.lock().await;
        if slot.state != SessionState::Paused {
            return;
        }
        if let Some(active) = &slot.active {
            active.resume();
            slot.state = SessionState::Playing;
        }
    }

    /// Tear down any playback, remote or local. Idempotent.
    pub async fn stop(&self) {
        self.ticket.fetch_add(1, Ordering::SeqCst);
        self.session.lock().await.teardown();
        if let Some(local) = &self.local {
            local.cancel();
        }
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state
    }

    pub async fn is_playing(&self) -> bool {
        self.state().await == SessionState::Playing
    }

    /// The voice catalog
    pub fn voices(&self) -> &[VoiceProfile] {
        &self.config.voices
    }

    pub async fn current_voice(&self) -> VoiceProfile {
        let index = *self.current_voice.lock().await;
        self.config.voices[index].clone()
    }

    /// Select the default voice by catalog index.
    ///
    /// An out-of-range index leaves the voice unchanged and returns `false`.
    pub async fn set_voice(&self, index: usize) -> bool {
        if index >= self.config.voices.len() {
            log::warn!(
                "Voice index {} out of range ({} voices), keeping current voice",
                index,
                self.config.voices.len()
            );
            return false;
        }
        *self.current_voice.lock().await = index;
        log::debug!("Default voice set to {}", self.config.voices[index]);
        true
    }

    /// Alias of `set_voice`
    pub async fn select_voice(&self, index: usize) -> bool {
        self.set_voice(index).await
    }

    /// Check that the synthesis service is reachable with the configured key
    pub async fn test_connection(&self) -> bool {
        if !self.provider.is_configured() {
            log::warn!(
                "Connection test skipped: no valid API key for {}",
                self.provider.provider_name()
            );
            return false;
        }
        match self.provider.health_check().await {
            Ok(()) => {
                log::info!("Connection to {} OK", self.provider.provider_name());
                true
            }
            Err(e) => {
                log::warn!(
                    "Connection to {} failed: {}",
                    self.provider.provider_name(),
                    e
                );
                false
            }
        }
    }

    /// Remove every cached entry. Returns the number removed.
    pub async fn clear_cache(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.clear_all().await,
            None => 0,
        }
    }

    /// Remove up to `batch` of the oldest cached entries
    pub async fn evict_oldest(&self, batch: usize) -> usize {
        match &self.cache {
            Some(cache) => cache.evict_oldest(batch).await,
            None => 0,
        }
    }

    fn fallback_enabled(&self) -> bool {
        self.config.use_local_fallback && self.local.is_some()
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.ticket.load(Ordering::SeqCst) == ticket
    }

    async fn resolve_request(&self, text: &str, options: SpeakOptions) -> SynthesisRequest {
        let voice = match options.voice {
            Some(voice) => voice,
            None => self.current_voice().await,
        };
        let rate = options.speaking_rate.unwrap_or(self.config.speaking_rate);
        SynthesisRequest::new(text, voice, rate, self.config.audio_encoding)
    }

    async fn fetch_audio(&self, request: &SynthesisRequest) -> SpeechResult<SynthesizedAudio> {
        let Some(cache) = &self.cache else {
            return self.provider.synthesize(request).await;
        };

        let key = cache.key_for(request);
        if let Some(payload) = cache.get(&key).await {
            return Ok(SynthesizedAudio::new(payload, request.audio_encoding));
        }

        let audio = self.provider.synthesize(request).await?;
        cache.put(&key, &audio).await;
        Ok(audio)
    }

    async fn play(&self, audio: SynthesizedAudio, ticket: u64) -> SpeechResult<PlaybackOutcome> {
        {
            let mut slot = self.session.lock().await;
            if !self.is_current(ticket) {
                log::debug!("Speak call preempted before playback; audio not played");
                return Ok(PlaybackOutcome::Interrupted);
            }
            slot.teardown();
            slot.state = SessionState::Starting;
        }

        // The output may block while opening the device; state() and stop()
        // must not wait on it.
        let started = self.output.start(&audio).await;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let finished = {
            let mut slot = self.session.lock().await;
            let playback = match started {
                Ok(playback) => playback,
                Err(e) => {
                    if self.is_current(ticket) {
                        slot.state = SessionState::Idle;
                    }
                    return Err(e);
                }
            };
            if !self.is_current(ticket) {
                log::debug!("Speak call preempted while the output was starting");
                playback.control.stop();
                return Ok(PlaybackOutcome::Interrupted);
            }
            slot.active = Some(ActiveSession {
                ticket,
                handle: SessionHandle::Remote(playback.control),
                cancel: cancel_tx,
            });
            slot.state = SessionState::Playing;
            playback.finished
        };

        let result = tokio::select! {
            biased;
            _ = cancel_rx => Ok(PlaybackOutcome::Interrupted),
            done = finished => match done {
                Ok(Ok(())) => Ok(PlaybackOutcome::Completed),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(SpeechError::Playback(
                    "audio output dropped the playback before it finished".to_string(),
                )),
            },
        };

        self.finish_session(ticket, result.is_err()).await;
        result
    }

    async fn speak_locally(
        &self,
        request: &SynthesisRequest,
        ticket: u64,
    ) -> SpeechResult<PlaybackOutcome> {
        let Some(local) = &self.local else {
            return Err(SpeechError::Configuration(
                "local fallback requested without a local synthesizer".to_string(),
            ));
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        {
            let mut slot = self.session.lock().await;
            if !self.is_current(ticket) {
                return Ok(PlaybackOutcome::Interrupted);
            }
            slot.teardown();
            slot.active = Some(ActiveSession {
                ticket,
                handle: SessionHandle::Local(local.clone()),
                cancel: cancel_tx,
            });
            slot.state = SessionState::Playing;
        }

        let utterance = LocalUtterance {
            text: request.text.clone(),
            language_tag: request.voice.language_tag.clone(),
            rate: request.speaking_rate,
            volume: self.config.local_volume,
        };

        // Dropping the utterance future on cancel also stops a synthesizer
        // that has not registered its own cancellation yet.
        let outcome = tokio::select! {
            biased;
            _ = cancel_rx => PlaybackOutcome::Interrupted,
            spoken = local.speak(utterance) => {
                if let Err(e) = spoken {
                    log::warn!("Local synthesizer failed: {}", e);
                }
                if self.is_current(ticket) {
                    PlaybackOutcome::LocalFallback
                } else {
                    PlaybackOutcome::Interrupted
                }
            }
        };

        self.finish_session(ticket, false).await;
        Ok(outcome)
    }

    /// Clear the slot if it still holds the session for `ticket`
    async fn finish_session(&self, ticket: u64, failed: bool) {
        let mut slot = self.session.lock().await;
        if slot.active.as_ref().is_some_and(|a| a.ticket == ticket) {
            if failed {
                slot.teardown();
            } else {
                slot.active = None;
                slot.state = SessionState::Idle;
            }
        }
    }
}

/// Builder for `SpeechManager`
pub struct SpeechManagerBuilder {
    config: SpeechConfig,
    provider: Option<Arc<dyn SynthesisProvider>>,
    output: Option<Arc<dyn AudioOutput>>,
    local: Option<Arc<dyn LocalSynthesizer>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl SpeechManagerBuilder {
    pub fn new(config: SpeechConfig) -> Self {
        Self {
            config,
            provider: None,
            output: None,
            local: None,
            store: None,
        }
    }

    /// Synthesis provider (default: Google Cloud TTS built from the config)
    pub fn provider(mut self, provider: Arc<dyn SynthesisProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Audio output (default with the `playback` feature: the system output device)
    pub fn audio_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn local_synthesizer(mut self, local: Arc<dyn LocalSynthesizer>) -> Self {
        self.local = Some(local);
        self
    }

    /// Cache storage (default: files under `cache_dir`, else in-memory)
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> SpeechResult<SpeechManager> {
        self.config.validate()?;

        let provider: Arc<dyn SynthesisProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(GoogleCloudTts::from_config(&self.config)?),
        };
        let output: Arc<dyn AudioOutput> = match self.output {
            Some(output) => output,
            None => default_output()?,
        };

        if self.config.use_local_fallback && self.local.is_none() {
            log::warn!("Local fallback is enabled but no local synthesizer was provided");
        }

        let cache = if self.config.cache_enabled {
            let store: Arc<dyn KeyValueStore> = match (self.store, &self.config.cache_dir) {
                (Some(store), _) => store,
                (None, Some(dir)) => match FileStore::open(dir) {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        log::warn!(
                            "Cannot open cache directory {}: {}, caching in memory",
                            dir.display(),
                            e
                        );
                        Arc::new(MemoryStore::new())
                    }
                },
                (None, None) => Arc::new(MemoryStore::new()),
            };
            let retention = i64::try_from(self.config.cache_retention_days)
                .ok()
                .and_then(TimeDelta::try_days)
                .unwrap_or(TimeDelta::MAX);
            Some(
                AudioCache::new(store, self.config.cache_namespace.clone())
                    .with_retention(retention)
                    .with_eviction_batch(self.config.eviction_batch_size),
            )
        } else {
            None
        };

        Ok(SpeechManager {
            current_voice: Mutex::new(self.config.default_voice_index),
            config: self.config,
            provider,
            output,
            local: self.local,
            cache,
            session: Mutex::new(SessionSlot::default()),
            ticket: AtomicU64::new(0),
        })
    }
}

#[cfg(feature = "playback")]
fn default_output() -> SpeechResult<Arc<dyn AudioOutput>> {
    Ok(Arc::new(crate::playback::RodioOutput::new()))
}

#[cfg(not(feature = "playback"))]
fn default_output() -> SpeechResult<Arc<dyn AudioOutput>> {
    Err(SpeechError::Configuration(
        "no audio output provided; enable the `playback` feature or call audio_output()"
            .to_string(),
    ))
}
