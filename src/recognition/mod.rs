//! Speech recognition module
//!
//! Defines the narrow contract the listening controller drives, plus a
//! console-fed recognizer used when no platform engine is wired in.

mod engine;
mod simulated;

pub use engine::{
    EngineConfig, EngineError, RecognitionEngine, RecognitionEvent, SpeechCapability,
};
pub use simulated::{SimulatedMicrophone, SimulatedSpeech};
