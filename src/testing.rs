//! Test doubles shared by unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::assistant::ReplyGenerator;
use crate::camera::{Camera, CameraConstraints, CameraError, CameraStream};
use crate::recognition::{
    EngineConfig, EngineError, RecognitionEngine, RecognitionEvent, SpeechCapability,
};

#[derive(Debug, Default)]
struct EngineLog {
    starts: Vec<Instant>,
    stops: usize,
    double_starts: usize,
    active: bool,
    fail_next: bool,
}

/// Engine that records calls and tracks its own notion of an active session
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    log: Arc<Mutex<EngineLog>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> usize {
        self.log.lock().unwrap().starts.len()
    }

    pub fn last_start(&self) -> Option<Instant> {
        self.log.lock().unwrap().starts.last().copied()
    }

    pub fn stops(&self) -> usize {
        self.log.lock().unwrap().stops
    }

    pub fn double_starts(&self) -> usize {
        self.log.lock().unwrap().double_starts
    }

    pub fn is_active(&self) -> bool {
        self.log.lock().unwrap().active
    }

    /// The session finished on the engine's side
    pub fn end_session(&self) {
        self.log.lock().unwrap().active = false;
    }

    /// Pretend a session is running that the controller never started
    pub fn force_active(&self) {
        self.log.lock().unwrap().active = true;
    }

    pub fn fail_next_start(&self) {
        self.log.lock().unwrap().fail_next = true;
    }
}

impl RecognitionEngine for MockEngine {
    fn start(&mut self) -> Result<(), EngineError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_next {
            log.fail_next = false;
            return Err(EngineError::Failed("not-allowed".into()));
        }
        if log.active {
            log.double_starts += 1;
            return Err(EngineError::AlreadyStarted);
        }
        log.active = true;
        log.starts.push(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.stops += 1;
        log.active = false;
    }
}

/// Capability handing out a `MockEngine` and keeping its event sender
#[derive(Clone, Default)]
pub struct MockCapability {
    pub engine: MockEngine,
    pub events: Arc<Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>>,
}

impl MockCapability {
    /// Send an event as the engine would
    pub fn emit(&self, event: RecognitionEvent) {
        if matches!(event, RecognitionEvent::Error(_) | RecognitionEvent::Ended) {
            self.engine.end_session();
        }
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl SpeechCapability for MockCapability {
    fn probe(
        &self,
        _config: &EngineConfig,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Option<Box<dyn RecognitionEngine>> {
        *self.events.lock().unwrap() = Some(events);
        Some(Box::new(self.engine.clone()))
    }
}

/// Capability for a platform without speech recognition
pub struct NoSpeech;

impl SpeechCapability for NoSpeech {
    fn probe(
        &self,
        _config: &EngineConfig,
        _events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Option<Box<dyn RecognitionEngine>> {
        None
    }
}

/// Camera that always succeeds (or always fails) without touching devices
#[derive(Clone, Default)]
pub struct FakeCamera {
    pub fail: bool,
    pub acquired: Arc<AtomicUsize>,
}

impl Camera for FakeCamera {
    fn acquire(&mut self, _constraints: &CameraConstraints) -> Result<CameraStream, CameraError> {
        if self.fail {
            return Err(CameraError::Unavailable {
                device: "fake".into(),
                reason: "permission denied".into(),
            });
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(CameraStream::detached("fake"))
    }
}

/// Reply generator with a predictable answer
pub struct EchoReplies;

impl ReplyGenerator for EchoReplies {
    fn generate(&self, question: &str) -> String {
        format!("you asked: {}", question)
    }
}
