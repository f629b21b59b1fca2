//! Recognition engine contract
//!
//! The platform speech recognizer is an opaque, single-shot capability:
//! each started session delivers zero or more results and then finishes
//! with an error and/or an end notification.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Error code reported by engines when a session was cut short by `stop()`
pub const ABORTED: &str = "aborted";

/// Events delivered by a recognition engine, in session order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Audio capture began; not every engine reports this
    Started,
    /// A final transcript for one utterance
    Result(String),
    /// The session failed with an engine-specific code
    Error(String),
    /// The session has ended
    Ended,
}

impl RecognitionEvent {
    /// Whether this is the error an engine reports after an intentional stop
    pub fn is_aborted(&self) -> bool {
        matches!(self, RecognitionEvent::Error(code) if code == ABORTED)
    }
}

/// Settings applied to the engine at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Keep the session open across utterances
    pub continuous: bool,
    /// Deliver partial transcripts (never consumed here)
    pub interim_results: bool,
    /// BCP 47 language tag
    pub language: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: false,
            language: "en-US".to_string(),
        }
    }
}

/// Errors returned synchronously by `RecognitionEngine::start`
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("recognition session is already started")]
    AlreadyStarted,

    #[error("recognition engine failed to start: {0}")]
    Failed(String),
}

/// A started/stopped speech recognizer
///
/// Events are not returned from these calls; they arrive later on the
/// channel the engine was constructed with.
pub trait RecognitionEngine: Send {
    /// Begin a new recognition session
    fn start(&mut self) -> Result<(), EngineError>;

    /// Ask the current session to finish
    fn stop(&mut self);
}

/// Platform probe for speech recognition support
pub trait SpeechCapability {
    /// Construct the engine, or `None` when recognition is unsupported
    fn probe(
        &self,
        config: &EngineConfig,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Option<Box<dyn RecognitionEngine>>;
}
