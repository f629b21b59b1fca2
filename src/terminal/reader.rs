//! Terminal input reader
//!
//! Reads stdin on a dedicated thread so a blocked read never holds up
//! the async runtime, and forwards each parsed line to the overlay or the
//! simulated microphone.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::overlay::UserAction;
use crate::recognition::SimulatedMicrophone;

use super::commands::{parse_line, TerminalInput};

/// Errors that can occur in the input reader
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("input reader is already running")]
    AlreadyRunning,

    #[error("failed to spawn reader thread: {0}")]
    ThreadSpawn(String),

    #[error("failed to read terminal input: {0}")]
    Read(#[from] std::io::Error),
}

/// Reads terminal lines and routes them
pub struct InputReader {
    actions: Option<mpsc::Sender<UserAction>>,
    microphone: SimulatedMicrophone,
    running: Arc<AtomicBool>,
}

impl InputReader {
    /// Create a new input reader
    pub fn new(actions: mpsc::Sender<UserAction>, microphone: SimulatedMicrophone) -> Self {
        Self {
            actions: Some(actions),
            microphone,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start reading stdin
    ///
    /// The action sender moves to the reader thread, so the overlay sees
    /// its input close once the user quits or stdin reaches EOF.
    pub fn start(&mut self) -> Result<(), InputError> {
        let actions = self.actions.take().ok_or(InputError::AlreadyRunning)?;
        self.running.store(true, Ordering::SeqCst);

        let microphone = self.microphone.clone();
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("input-reader".to_string())
            .spawn(move || {
                info!("input reader thread started");

                let stdin = std::io::stdin();
                if let Err(e) = read_lines(stdin.lock(), &actions, &microphone, &running) {
                    error!(?e, "input reader error");
                }

                running.store(false, Ordering::SeqCst);
                info!("input reader thread stopped");
            })
            .map_err(|e| InputError::ThreadSpawn(e.to_string()))?;

        Ok(())
    }

    /// Stop forwarding input; the thread exits after its current read
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the reader thread is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Forward lines from `input` until quit, EOF or `running` is cleared
fn read_lines<R: BufRead>(
    input: R,
    actions: &mpsc::Sender<UserAction>,
    microphone: &SimulatedMicrophone,
    running: &AtomicBool,
) -> Result<(), InputError> {
    for line in input.lines() {
        let line = line?;

        if !running.load(Ordering::SeqCst) {
            break;
        }

        match parse_line(&line) {
            TerminalInput::Action(action) => {
                // Not in an async context, so block until the overlay has room
                if actions.blocking_send(action).is_err() {
                    warn!("failed to send action - overlay closed?");
                    break;
                }
            }
            TerminalInput::Speak(text) => {
                debug!(chars = text.len(), "speaking into microphone");
                if !microphone.speak(text) {
                    warn!("microphone closed, speech dropped");
                }
            }
            TerminalInput::Quit => {
                info!("quit requested");
                break;
            }
            TerminalInput::Ignore => {}
        }
    }

    Ok(())
}
