//! Audio output abstraction
//!
//! An `AudioOutput` starts playback of an encoded payload and hands back a
//! `Playback`: a control handle plus a completion signal that resolves when the
//! audio ends naturally, is stopped, or fails mid-stream.

use crate::error::SpeechResult;
use crate::types::SynthesizedAudio;
use async_trait::async_trait;
use tokio::sync::oneshot;

/// Control over a single running playback
pub trait PlaybackControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
    fn is_paused(&self) -> bool;
}

/// A started playback
pub struct Playback {
    pub control: Box<dyn PlaybackControl>,
    /// Resolves with `Ok(())` when playback ends or `Err` if it fails mid-stream
    pub finished: oneshot::Receiver<SpeechResult<()>>,
}

impl Playback {
    pub fn new(
        control: Box<dyn PlaybackControl>,
        finished: oneshot::Receiver<SpeechResult<()>>,
    ) -> Self {
        Self { control, finished }
    }
}

/// Audio device capability
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Start playing `audio`. Fails with `SpeechError::Playback` if the device
    /// refuses to start or the payload cannot be decoded.
    async fn start(&self, audio: &SynthesizedAudio) -> SpeechResult<Playback>;
}

#[cfg(feature = "playback")]
pub use rodio_output::RodioOutput;

#[cfg(feature = "playback")]
mod rodio_output {
    use super::{AudioOutput, Playback, PlaybackControl};
    use crate::error::{SpeechError, SpeechResult};
    use crate::types::SynthesizedAudio;
    use async_trait::async_trait;
    use rodio::{Decoder, OutputStreamBuilder, Sink};
    use std::io::Cursor;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    struct RodioControl {
        sink: Arc<Sink>,
    }

    impl PlaybackControl for RodioControl {
        fn pause(&self) {
            self.sink.pause();
        }

        fn resume(&self) {
            self.sink.play();
        }

        fn stop(&self) {
            self.sink.stop();
        }

        fn is_paused(&self) -> bool {
            self.sink.is_paused()
        }
    }

    /// Plays encoded audio on the default output device.
    ///
    /// Each playback runs on its own thread, which owns the output stream for
    /// the lifetime of the sound.
    #[derive(Default)]
    pub struct RodioOutput;

    impl RodioOutput {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl AudioOutput for RodioOutput {
        async fn start(&self, audio: &SynthesizedAudio) -> SpeechResult<Playback> {
            let payload = audio.payload.clone();
            let (ready_tx, ready_rx) = oneshot::channel::<SpeechResult<Arc<Sink>>>();
            let (done_tx, done_rx) = oneshot::channel::<SpeechResult<()>>();

            std::thread::Builder::new()
                .name("tale-playback".to_string())
                .spawn(move || {
                    let stream = match OutputStreamBuilder::open_default_stream() {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(SpeechError::Playback(format!(
                                "failed to open audio output: {}",
                                e
                            ))));
                            return;
                        }
                    };
                    let source = match Decoder::new(Cursor::new(payload)) {
                        Ok(source) => source,
                        Err(e) => {
                            let _ = ready_tx.send(Err(SpeechError::Playback(format!(
                                "failed to decode audio: {}",
                                e
                            ))));
                            return;
                        }
                    };

                    let sink = Arc::new(Sink::connect_new(stream.mixer()));
                    sink.append(source);
                    if ready_tx.send(Ok(Arc::clone(&sink))).is_err() {
                        sink.stop();
                        return;
                    }

                    sink.sleep_until_end();
                    drop(stream);
                    let _ = done_tx.send(Ok(()));
                })?;

            let sink = ready_rx.await.map_err(|_| {
                SpeechError::Playback("playback thread exited before starting".to_string())
            })??;

            Ok(Playback::new(Box::new(RodioControl { sink }), done_rx))
        }
    }
}
