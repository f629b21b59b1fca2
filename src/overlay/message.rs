//! Conversation message model

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One entry of the conversation thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub text: String,
    /// Written by the user rather than the assistant
    pub is_user: bool,
    pub timestamp: DateTime<Local>,
}

impl Message {
    pub fn user(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            is_user: true,
            timestamp: Local::now(),
        }
    }

    pub fn assistant(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            is_user: false,
            timestamp: Local::now(),
        }
    }

    /// Hour and minute the message was created, e.g. `09:41`
    pub fn time_label(&self) -> String {
        self.timestamp.format("%H:%M").to_string()
    }
}
