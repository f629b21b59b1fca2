//! Terminal command parsing
//!
//! Maps one line of terminal input to an overlay action, speech for the
//! simulated microphone, or quit.

use crate::overlay::UserAction;

/// Prefix marking a line as spoken rather than typed
pub const SPEECH_PREFIX: char = '"';

/// Slash commands understood by the terminal
pub mod keywords {
    pub const MIC: &str = "/mic";
    pub const AUTO: &str = "/auto";
    pub const CAMERA: &str = "/camera";
    pub const CLEAR: &str = "/clear";
    pub const QUIT: &str = "/quit";
}

/// What a line of terminal input means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalInput {
    /// Forward to the overlay
    Action(UserAction),
    /// Say this into the microphone
    Speak(String),
    /// Leave the program
    Quit,
    /// Nothing to do
    Ignore,
}

/// Interpret a line of input
pub fn parse_line(line: &str) -> TerminalInput {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(spoken) = line.strip_prefix(SPEECH_PREFIX) {
        let spoken = spoken.trim();
        return if spoken.is_empty() {
            TerminalInput::Ignore
        } else {
            TerminalInput::Speak(spoken.to_string())
        };
    }

    match line.trim() {
        keywords::MIC => TerminalInput::Action(UserAction::ToggleMic),
        keywords::AUTO => TerminalInput::Action(UserAction::ToggleContinuous),
        keywords::CAMERA => TerminalInput::Action(UserAction::ToggleCamera),
        keywords::CLEAR => TerminalInput::Action(UserAction::ClearMessages),
        keywords::QUIT => TerminalInput::Quit,
        "" => TerminalInput::Ignore,
        _ => TerminalInput::Action(UserAction::Send(line.to_string())),
    }
}

/// One-line usage hint printed at startup
pub fn help() -> String {
    format!(
        "type to ask, {}text to speak, {} mic, {} auto-listen, {} camera, {} clear, {} exit",
        SPEECH_PREFIX,
        keywords::MIC,
        keywords::AUTO,
        keywords::CAMERA,
        keywords::CLEAR,
        keywords::QUIT
    )
}
