#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tale_speech::{
    AudioOutput, LocalSynthesizer, LocalUtterance, Playback, PlaybackControl, SpeechConfig,
    SpeechError, SpeechManager, SpeechResult, SynthesisProvider, SynthesisRequest,
    SynthesizedAudio,
};
use tokio::sync::{Notify, oneshot};

pub fn config() -> SpeechConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    SpeechConfig::default().with_api_key("test-key")
}

pub fn manager(
    config: SpeechConfig,
    provider: &Arc<FakeProvider>,
    output: &Arc<FakeOutput>,
) -> SpeechManager {
    SpeechManager::builder(config)
        .provider(provider.clone())
        .audio_output(output.clone())
        .build()
        .unwrap()
}

pub fn manager_with_local(
    config: SpeechConfig,
    provider: &Arc<FakeProvider>,
    output: &Arc<FakeOutput>,
    local: &Arc<FakeLocal>,
) -> SpeechManager {
    SpeechManager::builder(config)
        .provider(provider.clone())
        .audio_output(output.clone())
        .local_synthesizer(local.clone())
        .build()
        .unwrap()
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

pub fn audio_for(text: &str) -> Vec<u8> {
    format!("audio:{text}").into_bytes()
}

/// Synthesis provider that returns `audio:<text>` and records every request
pub struct FakeProvider {
    configured: bool,
    fail_status: Option<u16>,
    fail_text: Option<String>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<SynthesisRequest>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            configured: true,
            fail_status: None,
            fail_text: None,
            gate: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::new()
        }
    }

    /// Fails only requests for `text`
    pub fn failing_on(text: &str, status: u16) -> Self {
        Self {
            fail_status: Some(status),
            fail_text: Some(text.to_string()),
            ..Self::new()
        }
    }

    /// Each call waits for a `notify_one` on `gate` before answering
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SynthesisProvider for FakeProvider {
    async fn synthesize(&self, request: &SynthesisRequest) -> SpeechResult<SynthesizedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let fails = self
            .fail_text
            .as_ref()
            .is_none_or(|text| *text == request.text);
        if let Some(status) = self.fail_status.filter(|_| fails) {
            return Err(SpeechError::Service {
                status,
                message: "synthesis unavailable".to_string(),
            });
        }
        Ok(SynthesizedAudio::new(
            audio_for(&request.text),
            request.audio_encoding,
        ))
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn provider_name(&self) -> &str {
        "fake"
    }
}

struct FakeSession {
    done: Mutex<Option<oneshot::Sender<SpeechResult<()>>>>,
    ended: AtomicBool,
    paused: AtomicBool,
}

impl FakeSession {
    fn end(&self, state: &OutputState, result: SpeechResult<()>) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        state.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(done) = self.done.lock().unwrap().take() {
            let _ = done.send(result);
        }
    }
}

#[derive(Default)]
struct OutputState {
    starts: AtomicUsize,
    stops: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    played: Mutex<Vec<Vec<u8>>>,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
}

struct FakeControl {
    session: Arc<FakeSession>,
    state: Arc<OutputState>,
}

impl PlaybackControl for FakeControl {
    fn pause(&self) {
        self.session.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.session.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        self.session.end(&self.state, Ok(()));
    }

    fn is_paused(&self) -> bool {
        self.session.paused.load(Ordering::SeqCst)
    }
}

/// Audio output that records payloads. Playback either ends at once or is
/// held until the test finishes it.
pub struct FakeOutput {
    hold: bool,
    fail_start: bool,
    start_gate: Option<Arc<Notify>>,
    start_requests: AtomicUsize,
    state: Arc<OutputState>,
}

impl FakeOutput {
    pub fn immediate() -> Self {
        Self {
            hold: false,
            fail_start: false,
            start_gate: None,
            start_requests: AtomicUsize::new(0),
            state: Arc::new(OutputState::default()),
        }
    }

    pub fn held() -> Self {
        Self {
            hold: true,
            ..Self::immediate()
        }
    }

    pub fn refusing() -> Self {
        Self {
            fail_start: true,
            ..Self::immediate()
        }
    }

    /// Held playback whose start waits for a `notify_one` on `gate`
    pub fn slow_start(gate: Arc<Notify>) -> Self {
        Self {
            start_gate: Some(gate),
            ..Self::held()
        }
    }

    /// Calls to `start`, including ones still waiting on the gate
    pub fn start_requests(&self) -> usize {
        self.start_requests.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub fn played(&self) -> Vec<Vec<u8>> {
        self.state.played.lock().unwrap().clone()
    }

    pub fn is_paused(&self) -> bool {
        self.state
            .sessions
            .lock()
            .unwrap()
            .last()
            .is_some_and(|s| s.paused.load(Ordering::SeqCst))
    }

    /// Let every held playback end naturally
    pub fn finish_all(&self) {
        for session in self.state.sessions.lock().unwrap().iter() {
            session.end(&self.state, Ok(()));
        }
    }

    /// Fail every held playback mid-stream
    pub fn fail_all(&self) {
        for session in self.state.sessions.lock().unwrap().iter() {
            session.end(
                &self.state,
                Err(SpeechError::Playback("device disconnected".to_string())),
            );
        }
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    async fn start(&self, audio: &SynthesizedAudio) -> SpeechResult<Playback> {
        self.start_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.start_gate {
            gate.notified().await;
        }
        if self.fail_start {
            return Err(SpeechError::Playback("device busy".to_string()));
        }

        self.state.starts.fetch_add(1, Ordering::SeqCst);
        self.state.played.lock().unwrap().push(audio.payload.clone());

        let (done_tx, done_rx) = oneshot::channel();
        let session = Arc::new(FakeSession {
            done: Mutex::new(Some(done_tx)),
            ended: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        });
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
        self.state.sessions.lock().unwrap().push(session.clone());

        if !self.hold {
            session.end(&self.state, Ok(()));
        }

        Ok(Playback::new(
            Box::new(FakeControl {
                session,
                state: self.state.clone(),
            }),
            done_rx,
        ))
    }
}

/// Local synthesizer that records utterances. It either finishes at once or
/// holds each utterance until `finish` is called. Cancelling does not end a
/// held utterance; only dropping the call does.
#[derive(Default)]
pub struct FakeLocal {
    hold: bool,
    pausable: bool,
    release: Notify,
    spoken: Mutex<Vec<LocalUtterance>>,
    speaking: AtomicBool,
    paused: AtomicBool,
    cancels: AtomicUsize,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
}

impl FakeLocal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds utterances and supports pause/resume
    pub fn held() -> Self {
        Self {
            hold: true,
            pausable: true,
            ..Self::default()
        }
    }

    /// Holds utterances but, like espeak, cannot pause
    pub fn held_unpausable() -> Self {
        Self {
            hold: true,
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<LocalUtterance> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    /// Let the held utterance end naturally
    pub fn finish(&self) {
        self.release.notify_one();
    }
}

struct SpeakingGuard<'a>(&'a FakeLocal);

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        self.0.speaking.store(false, Ordering::SeqCst);
        self.0.paused.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalSynthesizer for FakeLocal {
    async fn speak(&self, utterance: LocalUtterance) -> SpeechResult<()> {
        self.spoken.lock().unwrap().push(utterance);
        self.speaking.store(true, Ordering::SeqCst);
        let _guard = SpeakingGuard(self);
        if self.hold {
            self.release.notified().await;
        }
        Ok(())
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        if self.pausable && self.is_speaking() {
            self.paused.store(true, Ordering::SeqCst);
        }
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}
