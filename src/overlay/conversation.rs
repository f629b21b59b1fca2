//! Conversation overlay
//!
//! Owns the conversation thread, the camera preview and the listening
//! flags, and forwards the desired listening state to the voice input.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::assistant::ReplyGenerator;
use crate::camera::{Camera, CameraConstraints, CameraStream};
use crate::events::{OverlayEvent, VoiceEvent};
use crate::voice::{VoiceError, VoiceInput};

use super::message::Message;

/// Notice shown once when the platform cannot recognize speech
pub const SPEECH_UNSUPPORTED: &str = "speech recognition is not supported";

/// Header text for the current listening mode
pub fn status_line(continuous_mode: bool) -> &'static str {
    if continuous_mode {
        "Continuous AI Listening"
    } else {
        "AI Vision Active"
    }
}

/// Things the user can do in the overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Submit typed text
    Send(String),
    /// Microphone button
    ToggleMic,
    /// Auto (continuous listening) button
    ToggleContinuous,
    /// Camera button
    ToggleCamera,
    /// Clear button
    ClearMessages,
}

/// Timing of the simulated assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlaySettings {
    /// Delay before the assistant answers
    pub reply_delay: Duration,
    /// Delay between a spoken question's answer and the camera switching off
    pub camera_off_delay: Duration,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            reply_delay: Duration::from_millis(2000),
            camera_off_delay: Duration::from_millis(1000),
        }
    }
}

/// A question waiting for its answer
#[derive(Debug)]
struct PendingReply {
    question: String,
    from_voice: bool,
}

/// The camera overlay with its conversation thread
pub struct Overlay {
    settings: OverlaySettings,
    camera: Box<dyn Camera>,
    stream: Option<CameraStream>,
    camera_on: bool,
    camera_off_at: Option<Instant>,
    voice: VoiceInput,
    /// Last desired value forwarded to the voice input
    voice_desired: bool,
    listening: bool,
    continuous_mode: bool,
    replies: Box<dyn ReplyGenerator>,
    pending_replies: JoinSet<PendingReply>,
    messages: Vec<Message>,
    next_message_id: u64,
    is_loading: bool,
    events: broadcast::Sender<OverlayEvent>,
}

impl Overlay {
    /// Mount the overlay: the camera starts on
    pub fn mount(
        settings: OverlaySettings,
        camera: Box<dyn Camera>,
        voice: VoiceInput,
        replies: Box<dyn ReplyGenerator>,
        events: broadcast::Sender<OverlayEvent>,
    ) -> Self {
        let mut overlay = Self {
            settings,
            camera,
            stream: None,
            camera_on: false,
            camera_off_at: None,
            voice,
            voice_desired: false,
            listening: false,
            continuous_mode: false,
            replies,
            pending_replies: JoinSet::new(),
            messages: Vec::new(),
            next_message_id: 0,
            is_loading: false,
            events,
        };

        if !overlay.voice.is_supported() {
            overlay.emit(OverlayEvent::Notice {
                text: SPEECH_UNSUPPORTED.to_string(),
            });
        }

        overlay.set_camera(true);

        info!(status = status_line(overlay.continuous_mode), "overlay mounted");
        overlay
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn camera_on(&self) -> bool {
        self.camera_on
    }

    /// Whether a stream is attached to the preview
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn listening(&self) -> bool {
        self.listening
    }

    pub fn continuous_mode(&self) -> bool {
        self.continuous_mode
    }

    /// Listening state handed to the voice input
    pub fn desired_listening(&self) -> bool {
        self.listening || self.continuous_mode
    }

    /// Process user actions, voice reports and timers until input closes
    pub async fn run(
        &mut self,
        actions: &mut mpsc::Receiver<UserAction>,
        voice_events: &mut mpsc::UnboundedReceiver<VoiceEvent>,
    ) {
        loop {
            let camera_off_at = self.camera_off_at;

            tokio::select! {
                action = actions.recv() => match action {
                    Some(action) => self.handle_action(action),
                    None => {
                        info!("overlay input closed");
                        break;
                    }
                },

                Some(event) = voice_events.recv() => {
                    self.handle_voice_event(event);
                }

                Some(joined) = self.pending_replies.join_next() => match joined {
                    Ok(reply) => self.deliver_reply(reply),
                    Err(e) if e.is_cancelled() => debug!("pending reply cancelled"),
                    Err(e) => warn!(?e, "reply task failed"),
                },

                _ = wait_until(camera_off_at) => {
                    self.camera_off_at = None;
                    info!("turning camera off after response");
                    self.set_camera(false);
                }
            }
        }
    }

    /// Apply one user action
    pub fn handle_action(&mut self, action: UserAction) {
        debug!(?action, "user action");

        match action {
            UserAction::Send(text) => {
                if self.is_loading {
                    info!("reply pending, typed message ignored");
                    return;
                }
                self.send_message(&text, false);
            }
            UserAction::ToggleMic => self.toggle_mic(),
            UserAction::ToggleContinuous => self.toggle_continuous_mode(),
            UserAction::ToggleCamera => self.set_camera(!self.camera_on),
            UserAction::ClearMessages => self.clear_messages(),
        }
    }

    /// Apply one report from the listening controller
    pub fn handle_voice_event(&mut self, event: VoiceEvent) {
        debug!(%event, "voice event");

        match event {
            VoiceEvent::Transcript { text } => self.send_message(&text, true),
            VoiceEvent::ListeningChanged { listening } => self.set_listening(listening),
        }
    }

    /// Tear everything down: replies, timers, camera and voice input
    pub async fn unmount(&mut self) {
        self.pending_replies.abort_all();
        self.camera_off_at = None;

        if let Some(stream) = self.stream.take() {
            stream.release();
        }

        self.voice.unmount().await;
        info!("overlay unmounted");
    }

    fn send_message(&mut self, text: &str, from_voice: bool) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let id = self.next_id();
        self.push_message(Message::user(id, text));
        self.set_loading(true);

        let pending = PendingReply {
            question: text.to_string(),
            from_voice,
        };
        let delay = self.settings.reply_delay;
        self.pending_replies.spawn(async move {
            tokio::time::sleep(delay).await;
            pending
        });

        debug!(id, from_voice, "question sent");
    }

    fn deliver_reply(&mut self, reply: PendingReply) {
        let text = self.replies.generate(&reply.question);
        let id = self.next_id();
        self.push_message(Message::assistant(id, text));
        self.set_loading(false);

        if reply.from_voice {
            self.camera_off_at = Some(Instant::now() + self.settings.camera_off_delay);
        }
    }

    fn toggle_mic(&mut self) {
        match self.voice.toggle(self.desired_listening()) {
            Ok(listening) => {
                // Stopping the microphone also leaves continuous mode
                if !listening && self.continuous_mode {
                    self.continuous_mode = false;
                    info!(status = status_line(false), "continuous mode off");
                    self.emit(OverlayEvent::ModeChanged { continuous: false });
                }
                self.set_listening(listening);
            }
            Err(VoiceError::Unsupported) => {
                warn!("microphone unavailable: {}", SPEECH_UNSUPPORTED);
            }
            Err(e) => {
                warn!(error = %e, "voice toggle failed");
            }
        }
    }

    fn toggle_continuous_mode(&mut self) {
        self.continuous_mode = !self.continuous_mode;
        info!(
            status = status_line(self.continuous_mode),
            "continuous mode toggled"
        );
        self.emit(OverlayEvent::ModeChanged {
            continuous: self.continuous_mode,
        });
        self.set_listening(self.continuous_mode);
    }

    fn set_listening(&mut self, listening: bool) {
        if self.listening != listening {
            self.listening = listening;
            self.emit(OverlayEvent::ListeningChanged { listening });
        }
        self.sync_voice();
    }

    fn sync_voice(&mut self) {
        let desired = self.desired_listening();
        if desired == self.voice_desired {
            return;
        }

        self.voice_desired = desired;
        self.voice.sync_desired(desired);

        if desired {
            info!("voice input started, turning camera on");
            self.camera_off_at = None;
            self.set_camera(true);
        }
    }

    fn set_camera(&mut self, on: bool) {
        if self.camera_on == on {
            return;
        }
        self.camera_on = on;

        if on {
            match self.camera.acquire(&CameraConstraints::default()) {
                Ok(stream) => self.stream = Some(stream),
                Err(e) => error!(error = %e, "error accessing camera"),
            }
        } else if let Some(stream) = self.stream.take() {
            stream.release();
        }

        info!(on, streaming = self.stream.is_some(), "camera toggled");
        self.emit(OverlayEvent::CameraChanged {
            on,
            streaming: self.stream.is_some(),
        });
    }

    fn clear_messages(&mut self) {
        self.messages.clear();
        self.emit(OverlayEvent::MessagesCleared);
    }

    fn set_loading(&mut self, loading: bool) {
        if self.is_loading != loading {
            self.is_loading = loading;
            self.emit(OverlayEvent::ThinkingChanged { thinking: loading });
        }
    }

    fn push_message(&mut self, message: Message) {
        self.messages.push(message.clone());
        self.emit(OverlayEvent::MessageAdded(message));
    }

    fn next_id(&mut self) -> u64 {
        self.next_message_id += 1;
        self.next_message_id
    }

    fn emit(&self, event: OverlayEvent) {
        let _ = self.events.send(event);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
