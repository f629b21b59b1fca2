//! Voice input module
//!
//! Binds a microphone toggle to the continuous listening controller.

mod control;

pub use control::{VoiceError, VoiceInput};
