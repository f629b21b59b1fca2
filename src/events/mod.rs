//! Events module for upward notifications
//!
//! `VoiceEvent` flows from the listening controller to the overlay;
//! `OverlayEvent` flows from the overlay to whatever renders it.

use serde::{Deserialize, Serialize};

use crate::overlay::Message;

/// Reports emitted by the listening controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceEvent {
    /// The engine recognized an utterance
    Transcript {
        /// Final transcript text
        text: String,
    },

    /// Listening stopped (or started) on the engine's side
    ListeningChanged {
        /// New listening value for the parent
        listening: bool,
    },
}

/// Observable changes of the conversation overlay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayEvent {
    /// A user or assistant message was appended
    MessageAdded(Message),

    /// The assistant started or finished preparing a reply
    ThinkingChanged { thinking: bool },

    /// Camera switched on or off
    CameraChanged {
        /// Camera toggle state
        on: bool,
        /// Whether a stream is actually attached to the preview
        streaming: bool,
    },

    /// Voice listening flag changed
    ListeningChanged { listening: bool },

    /// Continuous listening mode toggled
    ModeChanged { continuous: bool },

    /// Conversation history cleared
    MessagesCleared,

    /// One-off notice for the user
    Notice { text: String },
}

impl std::fmt::Display for VoiceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceEvent::Transcript { text } => write!(f, "TRANSCRIPT ({} chars)", text.len()),
            VoiceEvent::ListeningChanged { listening } => {
                write!(f, "LISTENING_CHANGED ({})", listening)
            }
        }
    }
}

impl std::fmt::Display for OverlayEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlayEvent::MessageAdded(message) => write!(f, "MESSAGE_ADDED ({})", message.id),
            OverlayEvent::ThinkingChanged { thinking } => {
                write!(f, "THINKING_CHANGED ({})", thinking)
            }
            OverlayEvent::CameraChanged { on, streaming } => {
                write!(f, "CAMERA_CHANGED (on={}, streaming={})", on, streaming)
            }
            OverlayEvent::ListeningChanged { listening } => {
                write!(f, "LISTENING_CHANGED ({})", listening)
            }
            OverlayEvent::ModeChanged { continuous } => write!(f, "MODE_CHANGED ({})", continuous),
            OverlayEvent::MessagesCleared => write!(f, "MESSAGES_CLEARED"),
            OverlayEvent::Notice { .. } => write!(f, "NOTICE"),
        }
    }
}
