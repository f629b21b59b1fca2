//! Overlay module for the conversation UI
//!
//! Owns conversation state and the camera preview, and hands the desired
//! listening flag to the voice input.

mod conversation;
mod message;

pub use conversation::{status_line, Overlay, OverlaySettings, UserAction};
pub use message::Message;
