//! Local on-device synthesis used as the fallback path.
//!
//! `EspeakSynthesizer` drives the `espeak-ng` binary (or legacy `espeak`).
//! Env override: `ESPEAK_BIN`.

use crate::error::{SpeechError, SpeechResult};
use async_trait::async_trait;
use std::path::{MAIN_SEPARATOR, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;

/// What the local synthesizer is asked to say
#[derive(Clone, Debug, PartialEq)]
pub struct LocalUtterance {
    pub text: String,
    pub language_tag: String,
    pub rate: f32,
    pub volume: f32,
}

/// On-device speech synthesizer
#[async_trait]
pub trait LocalSynthesizer: Send + Sync {
    /// Speak an utterance. Resolves when it finishes or is cancelled.
    async fn speak(&self, utterance: LocalUtterance) -> SpeechResult<()>;

    fn pause(&self);

    fn resume(&self);

    /// Stop the current utterance, if any
    fn cancel(&self);

    fn is_speaking(&self) -> bool;

    fn is_paused(&self) -> bool;
}

/// Local synthesizer backed by espeak-ng
pub struct EspeakSynthesizer {
    binary: PathBuf,
    current: Mutex<Option<(u64, oneshot::Sender<()>)>>,
    next_id: AtomicU64,
}

impl EspeakSynthesizer {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Locate espeak-ng via `ESPEAK_BIN` or `PATH`
    pub fn detect() -> Option<Self> {
        let binary = std::env::var("ESPEAK_BIN")
            .ok()
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .or_else(|| find_on_path("espeak-ng"))
            .or_else(|| find_on_path("espeak"))?;
        log::debug!("Detected local synthesizer at {}", binary.display());
        Some(Self::with_binary(binary))
    }

    pub fn binary(&self) -> &std::path::Path {
        &self.binary
    }

    fn take_current(&self, id: Option<u64>) -> Option<oneshot::Sender<()>> {
        let Ok(mut guard) = self.current.lock() else {
            return None;
        };
        match (id, guard.as_ref()) {
            (None, Some(_)) => guard.take().map(|(_, tx)| tx),
            (Some(id), Some((current, _))) if *current == id => guard.take().map(|(_, tx)| tx),
            _ => None,
        }
    }

    async fn run(
        &self,
        utterance: LocalUtterance,
        cancel_rx: oneshot::Receiver<()>,
    ) -> SpeechResult<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-v")
            .arg(voice_for_language(&utterance.language_tag))
            .arg("-s")
            .arg(words_per_minute(utterance.rate).to_string())
            .arg("-a")
            .arg(amplitude(utterance.volume).to_string())
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        log::debug!("Running local synthesizer: {:?}", cmd);
        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take();
        let text = utterance.text;

        let exited = tokio::select! {
            status = async {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(text.as_bytes()).await?;
                    drop(stdin);
                }
                child.wait().await
            } => Some(status),
            _ = cancel_rx => None,
        };

        match exited {
            Some(Ok(status)) if status.success() => Ok(()),
            Some(Ok(status)) => Err(SpeechError::Playback(format!(
                "{} exited with {}",
                self.binary.display(),
                status
            ))),
            Some(Err(e)) => Err(SpeechError::Io(e)),
            None => {
                log::debug!("Local utterance cancelled");
                let _ = child.kill().await;
                Ok(())
            }
        }
    }
}

/// First espeak voice for a language tag: the primary subtag, lowercased
pub fn voice_for_language(language_tag: &str) -> String {
    language_tag
        .split(['-', '_'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("da")
        .to_lowercase()
}

/// espeak speed in words per minute for a speaking rate
pub fn words_per_minute(rate: f32) -> u32 {
    (160.0 * rate).round().clamp(80.0, 450.0) as u32
}

/// espeak amplitude for a volume in `[0.0, 2.0]`
pub fn amplitude(volume: f32) -> u32 {
    (100.0 * volume).round().clamp(0.0, 200.0) as u32
}

fn find_on_path(bin: &str) -> Option<PathBuf> {
    if bin.contains(MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return p.exists().then_some(p);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.exists())
}

#[async_trait]
impl LocalSynthesizer for EspeakSynthesizer {
    async fn speak(&self, utterance: LocalUtterance) -> SpeechResult<()> {
        self.cancel();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        if let Ok(mut guard) = self.current.lock() {
            *guard = Some((id, cancel_tx));
        }

        let result = self.run(utterance, cancel_rx).await;
        self.take_current(Some(id));
        result
    }

    fn pause(&self) {
        log::debug!("espeak cannot pause; ignoring");
    }

    fn resume(&self) {
        log::debug!("espeak cannot resume; ignoring");
    }

    fn cancel(&self) {
        if let Some(tx) = self.take_current(None) {
            let _ = tx.send(());
        }
    }

    fn is_speaking(&self) -> bool {
        self.current.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    fn is_paused(&self) -> bool {
        false
    }
}
