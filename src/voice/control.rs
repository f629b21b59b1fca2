//! Voice input control
//!
//! A thin handle over the listening controller task. The capability is
//! probed once at mount; when recognition is unsupported the control is
//! disabled for its whole lifetime.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::VoiceEvent;
use crate::recognition::{EngineConfig, SpeechCapability};
use crate::state::{ControlCommand, ListeningController};

/// Errors surfaced by the voice input control
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("speech recognition is not supported")]
    Unsupported,

    #[error("listening controller is no longer running")]
    Disconnected,
}

/// Toggle button bound to a listening controller
pub struct VoiceInput {
    supported: bool,
    commands: Option<mpsc::UnboundedSender<ControlCommand>>,
    task: Option<JoinHandle<()>>,
}

impl VoiceInput {
    /// Probe the capability and, when supported, start the controller task
    ///
    /// Recognized text and engine-side listening changes are sent to
    /// `reports`.
    pub fn mount(
        capability: &dyn SpeechCapability,
        config: &EngineConfig,
        reports: mpsc::UnboundedSender<VoiceEvent>,
    ) -> Self {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();

        let Some(engine) = capability.probe(config, engine_tx) else {
            warn!("speech recognition is not supported, voice input disabled");
            return Self {
                supported: false,
                commands: None,
                task: None,
            };
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let controller = ListeningController::new(engine, reports);
        let task = tokio::spawn(controller.run(command_rx, engine_rx));

        info!(language = %config.language, "voice input mounted");

        Self {
            supported: true,
            commands: Some(command_tx),
            task: Some(task),
        }
    }

    /// Whether the platform supports speech recognition
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Forward the parent's desired listening flag
    pub fn sync_desired(&self, desired: bool) {
        let Some(commands) = &self.commands else {
            return;
        };

        if commands.send(ControlCommand::SetDesired(desired)).is_err() {
            warn!(desired, "listening controller gone, desired state dropped");
        }
    }

    /// User clicked the microphone button
    ///
    /// Returns the listening value the parent should now record.
    pub fn toggle(&self, listening: bool) -> Result<bool, VoiceError> {
        if !self.supported {
            return Err(VoiceError::Unsupported);
        }
        let commands = self.commands.as_ref().ok_or(VoiceError::Disconnected)?;
        let next = !listening;

        commands
            .send(ControlCommand::SetDesired(next))
            .map_err(|_| VoiceError::Disconnected)?;

        debug!(listening = next, "voice input toggled");
        Ok(next)
    }

    /// Tear down the controller and wait for it to stop the engine
    pub async fn unmount(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(ControlCommand::Dispose);
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(?e, "listening controller task failed");
            }
            info!("voice input unmounted");
        }
    }
}
