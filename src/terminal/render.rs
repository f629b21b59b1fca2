//! Overlay rendering for the terminal

use tracing::warn;

use crate::config::OutputFormat;
use crate::events::OverlayEvent;
use crate::overlay::status_line;

/// Format an overlay event as one output line, or nothing
pub fn render(event: &OverlayEvent, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => match serde_json::to_string(event) {
            Ok(line) => Some(line),
            Err(e) => {
                warn!(?e, "failed to encode overlay event");
                None
            }
        },
        OutputFormat::Text => render_text(event),
    }
}

fn render_text(event: &OverlayEvent) -> Option<String> {
    let line = match event {
        OverlayEvent::MessageAdded(message) => {
            let who = if message.is_user { "you" } else { "ai" };
            format!("[{}] {}: {}", message.time_label(), who, message.text)
        }
        OverlayEvent::ThinkingChanged { thinking: true } => "   AI is thinking...".to_string(),
        OverlayEvent::ThinkingChanged { thinking: false } => return None,
        OverlayEvent::CameraChanged { on: false, .. } => "[camera] Camera is off".to_string(),
        OverlayEvent::CameraChanged { on: true, streaming } => {
            if *streaming {
                "[camera] on".to_string()
            } else {
                "[camera] on, no picture".to_string()
            }
        }
        OverlayEvent::ListeningChanged { listening } => {
            format!("[mic] {}", if *listening { "listening" } else { "off" })
        }
        OverlayEvent::ModeChanged { continuous } => format!(
            "[{}] {}",
            if *continuous { "Auto ON" } else { "Auto OFF" },
            status_line(*continuous)
        ),
        OverlayEvent::MessagesCleared => "[conversation cleared]".to_string(),
        OverlayEvent::Notice { text } => format!("! {}", text),
    };

    Some(line)
}
