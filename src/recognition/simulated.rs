//! Console-fed speech recognizer
//!
//! Behaves like a platform recognizer driven by text "spoken" into a
//! [`SimulatedMicrophone`]. Sessions are single-shot: they finish on
//! `stop()`, on a silence timeout, or after the first utterance when not
//! continuous, and always close with exactly one `Ended`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::engine::{EngineConfig, EngineError, RecognitionEngine, RecognitionEvent, SpeechCapability};

/// Error code reported when a session hears nothing before the timeout
pub const NO_SPEECH: &str = "no-speech";

/// Error code reported when the microphone is gone
pub const AUDIO_CAPTURE: &str = "audio-capture";

/// Input side of the simulated recognizer
#[derive(Debug, Clone)]
pub struct SimulatedMicrophone {
    tx: mpsc::UnboundedSender<String>,
}

impl SimulatedMicrophone {
    /// Speak an utterance. Returns false once the recognizer is gone.
    pub fn speak(&self, text: impl Into<String>) -> bool {
        self.tx.send(text.into()).is_ok()
    }
}

/// Speech capability backed by the simulated recognizer
pub struct SimulatedSpeech {
    enabled: bool,
    silence_timeout: Duration,
    speech: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl SimulatedSpeech {
    /// Create the capability and the microphone that feeds it
    pub fn new(enabled: bool, silence_timeout: Duration) -> (Self, SimulatedMicrophone) {
        let (tx, rx) = mpsc::unbounded_channel();
        let capability = Self {
            enabled,
            silence_timeout,
            speech: Arc::new(Mutex::new(rx)),
        };
        (capability, SimulatedMicrophone { tx })
    }
}

impl SpeechCapability for SimulatedSpeech {
    fn probe(
        &self,
        config: &EngineConfig,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Option<Box<dyn RecognitionEngine>> {
        if !self.enabled {
            info!("speech recognition disabled in configuration");
            return None;
        }

        Some(Box::new(SimulatedEngine {
            config: config.clone(),
            silence_timeout: self.silence_timeout,
            events,
            speech: Arc::clone(&self.speech),
            active: Arc::new(AtomicBool::new(false)),
            session: None,
        }))
    }
}

/// A single recognizer instance
pub struct SimulatedEngine {
    config: EngineConfig,
    silence_timeout: Duration,
    events: mpsc::UnboundedSender<RecognitionEvent>,
    speech: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    active: Arc<AtomicBool>,
    session: Option<JoinHandle<()>>,
}

impl RecognitionEngine for SimulatedEngine {
    fn start(&mut self) -> Result<(), EngineError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }

        debug!(
            language = %self.config.language,
            continuous = self.config.continuous,
            "recognition session started"
        );

        self.session = Some(tokio::spawn(run_session(
            self.config.continuous,
            self.silence_timeout,
            self.events.clone(),
            Arc::clone(&self.speech),
            Arc::clone(&self.active),
        )));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.abort();
        }
        // Only the side that flips `active` reports the end
        if self.active.swap(false, Ordering::SeqCst) {
            debug!("recognition session stopped");
            let _ = self.events.send(RecognitionEvent::Ended);
        }
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.abort();
        }
    }
}

async fn run_session(
    continuous: bool,
    silence_timeout: Duration,
    events: mpsc::UnboundedSender<RecognitionEvent>,
    speech: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    active: Arc<AtomicBool>,
) {
    let mut speech = speech.lock().await;

    // Anything said while nobody was listening is lost
    while speech.try_recv().is_ok() {}
    let _ = events.send(RecognitionEvent::Started);

    loop {
        tokio::select! {
            utterance = speech.recv() => match utterance {
                Some(text) => {
                    debug!(%text, "utterance recognized");
                    let _ = events.send(RecognitionEvent::Result(text));
                    if !continuous {
                        break;
                    }
                }
                None => {
                    let _ = events.send(RecognitionEvent::Error(AUDIO_CAPTURE.to_string()));
                    break;
                }
            },
            _ = tokio::time::sleep(silence_timeout) => {
                let _ = events.send(RecognitionEvent::Error(NO_SPEECH.to_string()));
                break;
            }
        }
    }

    if active.swap(false, Ordering::SeqCst) {
        let _ = events.send(RecognitionEvent::Ended);
    }
}
