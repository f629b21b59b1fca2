//! Continuous listening controller
//!
//! Keeps a single-shot recognition engine running for as long as the
//! parent wants to listen. Two pieces of state are reconciled here: the
//! desired flag, which only the parent changes, and the engine run state,
//! which only engine callbacks and our own start/stop calls change. Every
//! transition goes through `set_desired`, `on_engine_event`,
//! `on_restart_due` or `dispose`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::VoiceEvent;
use crate::recognition::{EngineError, RecognitionEngine, RecognitionEvent};

/// Delay before restarting after a clean end of session
pub const RESTART_AFTER_END: Duration = Duration::from_millis(500);

/// Delay before restarting after an engine error
pub const RESTART_AFTER_ERROR: Duration = Duration::from_millis(1000);

/// What the controller believes the engine is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRunState {
    /// No session; `start()` may be called
    Stopped,
    /// `start()` was accepted but capture has not been confirmed
    Starting,
    /// The engine confirmed that capture began
    Running,
}

impl Default for EngineRunState {
    fn default() -> Self {
        Self::Stopped
    }
}

impl std::fmt::Display for EngineRunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineRunState::Stopped => write!(f, "Stopped"),
            EngineRunState::Starting => write!(f, "Starting"),
            EngineRunState::Running => write!(f, "Running"),
        }
    }
}

/// Why a restart was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartCause {
    /// The session ended normally
    Ended,
    /// The session failed
    Error,
}

impl RestartCause {
    /// Fixed backoff for this cause
    pub fn backoff(self) -> Duration {
        match self {
            RestartCause::Ended => RESTART_AFTER_END,
            RestartCause::Error => RESTART_AFTER_ERROR,
        }
    }
}

/// A scheduled engine restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRestart {
    /// Timer identity; a firing timer must match the current one
    pub id: u64,
    /// When the restart is due
    pub deadline: Instant,
    /// What triggered it
    pub cause: RestartCause,
}

/// Inputs accepted by the controller task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// The parent's desired listening flag
    SetDesired(bool),
    /// Tear the controller down
    Dispose,
}

/// Reconciles desired listening with the recognition engine lifecycle
pub struct ListeningController {
    engine: Box<dyn RecognitionEngine>,
    reports: mpsc::UnboundedSender<VoiceEvent>,
    desired: bool,
    run_state: EngineRunState,
    pending_restart: Option<PendingRestart>,
    next_restart_id: u64,
    /// Set by an `aborted` error until the next `start()`
    aborted: bool,
    disposed: bool,
}

impl ListeningController {
    /// Create a controller that exclusively drives `engine`
    pub fn new(
        engine: Box<dyn RecognitionEngine>,
        reports: mpsc::UnboundedSender<VoiceEvent>,
    ) -> Self {
        Self {
            engine,
            reports,
            desired: false,
            run_state: EngineRunState::Stopped,
            pending_restart: None,
            next_restart_id: 0,
            aborted: false,
            disposed: false,
        }
    }

    /// The last desired flag received from the parent
    pub fn desired(&self) -> bool {
        self.desired
    }

    /// Current belief about the engine
    pub fn run_state(&self) -> EngineRunState {
        self.run_state
    }

    /// The scheduled restart, if any
    pub fn pending_restart(&self) -> Option<PendingRestart> {
        self.pending_restart
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Run the controller until disposed or the command channel closes
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ControlCommand>,
        mut engine_events: mpsc::UnboundedReceiver<RecognitionEvent>,
    ) {
        info!("listening controller started");

        loop {
            let restart = self.pending_restart;

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(ControlCommand::SetDesired(desired)) => self.set_desired(desired),
                    Some(ControlCommand::Dispose) | None => break,
                },

                Some(event) = engine_events.recv() => {
                    self.on_engine_event(event);
                }

                id = restart_due(restart) => {
                    self.on_restart_due(id);
                }
            }
        }

        self.dispose();
    }

    /// Apply the parent's desired listening flag
    pub fn set_desired(&mut self, desired: bool) {
        if self.disposed || desired == self.desired {
            return;
        }

        debug!(desired, state = %self.run_state, "desired listening changed");
        self.desired = desired;

        if desired {
            if self.run_state == EngineRunState::Stopped {
                self.start_engine();
            }
        } else {
            self.cancel_restart();
            if self.run_state != EngineRunState::Stopped {
                debug!("stopping recognition engine");
                self.engine.stop();
                self.run_state = EngineRunState::Stopped;
            }
        }
    }

    /// Process one engine event
    pub fn on_engine_event(&mut self, event: RecognitionEvent) {
        if self.disposed {
            debug!(?event, "engine event after dispose ignored");
            return;
        }

        let aborted = event.is_aborted();

        match event {
            RecognitionEvent::Started => {
                if self.run_state == EngineRunState::Starting {
                    self.run_state = EngineRunState::Running;
                    debug!("recognition engine running");
                }
            }

            RecognitionEvent::Result(text) => {
                debug!(chars = text.len(), "transcript received");
                self.report(VoiceEvent::Transcript { text });
            }

            RecognitionEvent::Error(code) if aborted => {
                debug!(%code, "recognition aborted");
                self.run_state = EngineRunState::Stopped;
                self.aborted = true;
            }

            RecognitionEvent::Error(code) => {
                debug!(%code, desired = self.desired, "recognition error");
                self.run_state = EngineRunState::Stopped;
                if self.desired {
                    self.schedule_restart(RestartCause::Error);
                }
            }

            RecognitionEvent::Ended => {
                debug!(desired = self.desired, "recognition ended");
                self.run_state = EngineRunState::Stopped;

                if !self.desired {
                    self.report(VoiceEvent::ListeningChanged { listening: false });
                } else if self.aborted {
                    debug!("session was aborted, not restarting");
                } else {
                    self.schedule_restart(RestartCause::Ended);
                }
            }
        }
    }

    /// A restart timer fired
    pub fn on_restart_due(&mut self, id: u64) {
        match self.pending_restart {
            Some(pending) if pending.id == id => self.pending_restart = None,
            _ => {
                debug!(id, "stale restart timer dropped");
                return;
            }
        }

        // The world may have changed while the timer was pending
        if self.disposed || !self.desired || self.run_state != EngineRunState::Stopped {
            debug!(
                id,
                desired = self.desired,
                state = %self.run_state,
                "restart no longer wanted"
            );
            return;
        }

        debug!(id, "restarting recognition engine");
        self.start_engine();
    }

    /// Cancel pending work and stop the engine. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }

        self.disposed = true;
        self.cancel_restart();
        self.engine.stop();
        self.run_state = EngineRunState::Stopped;

        info!("listening controller disposed");
    }

    fn start_engine(&mut self) {
        self.aborted = false;

        match self.engine.start() {
            Ok(()) => {
                debug!("recognition engine start requested");
                self.run_state = EngineRunState::Starting;
            }
            Err(EngineError::AlreadyStarted) => {
                // The engine still owns a session; its end will bring us back to Stopped
                warn!("recognition engine already started, ignoring start");
                self.run_state = EngineRunState::Starting;
            }
            Err(e) => {
                warn!(error = %e, "recognition engine failed to start");
                self.run_state = EngineRunState::Stopped;
                self.schedule_restart(RestartCause::Error);
            }
        }
    }

    fn schedule_restart(&mut self, cause: RestartCause) {
        if let Some(pending) = &self.pending_restart {
            debug!(id = pending.id, ?cause, "restart already pending");
            return;
        }

        self.next_restart_id += 1;
        let delay = cause.backoff();
        let pending = PendingRestart {
            id: self.next_restart_id,
            deadline: Instant::now() + delay,
            cause,
        };

        debug!(
            id = pending.id,
            ?cause,
            delay_ms = delay.as_millis() as u64,
            "restart scheduled"
        );
        self.pending_restart = Some(pending);
    }

    fn cancel_restart(&mut self) {
        if let Some(pending) = self.pending_restart.take() {
            debug!(id = pending.id, "pending restart cancelled");
        }
    }

    fn report(&self, event: VoiceEvent) {
        debug!(%event, "reporting voice event");
        if self.reports.send(event).is_err() {
            debug!("voice event receiver dropped");
        }
    }
}

impl Drop for ListeningController {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn restart_due(pending: Option<PendingRestart>) -> u64 {
    match pending {
        Some(pending) => {
            tokio::time::sleep_until(pending.deadline).await;
            pending.id
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;

    fn create_controller() -> (
        ListeningController,
        MockEngine,
        mpsc::UnboundedReceiver<VoiceEvent>,
    ) {
        let engine = MockEngine::new();
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ListeningController::new(Box::new(engine.clone()), tx),
            engine,
            rx,
        )
    }

    /// Deliver an event the way the engine would, closing its session first
    fn deliver(controller: &mut ListeningController, engine: &MockEngine, event: RecognitionEvent) {
        if matches!(event, RecognitionEvent::Error(_) | RecognitionEvent::Ended) {
            engine.end_session();
        }
        controller.on_engine_event(event);
    }

    fn error(code: &str) -> RecognitionEvent {
        RecognitionEvent::Error(code.to_string())
    }

    #[test]
    fn test_initial_state() {
        let (controller, engine, _) = create_controller();
        assert!(!controller.desired());
        assert_eq!(controller.run_state(), EngineRunState::Stopped);
        assert!(controller.pending_restart().is_none());
        assert_eq!(engine.starts(), 0);
    }

    #[test]
    fn test_set_desired_starts_immediately() {
        let (mut controller, engine, _) = create_controller();

        controller.set_desired(true);
        assert_eq!(engine.starts(), 1);
        assert_eq!(controller.run_state(), EngineRunState::Starting);

        controller.on_engine_event(RecognitionEvent::Started);
        assert_eq!(controller.run_state(), EngineRunState::Running);
    }

    #[test]
    fn test_set_desired_is_idempotent() {
        let (mut controller, engine, _) = create_controller();

        controller.set_desired(true);
        controller.set_desired(true);
        assert_eq!(engine.starts(), 1);

        controller.set_desired(false);
        controller.set_desired(false);
        assert_eq!(engine.stops(), 1);
        assert_eq!(controller.run_state(), EngineRunState::Stopped);
    }

    #[test]
    fn test_result_is_reported_without_state_change() {
        let (mut controller, engine, mut reports) = create_controller();

        controller.set_desired(true);
        deliver(&mut controller, &engine, RecognitionEvent::Result("hello".into()));

        assert_eq!(
            reports.try_recv().unwrap(),
            VoiceEvent::Transcript {
                text: "hello".into()
            }
        );
        assert_eq!(controller.run_state(), EngineRunState::Starting);
        assert!(controller.desired());
        assert!(controller.pending_restart().is_none());
    }

    #[test]
    fn test_ended_schedules_short_restart() {
        let (mut controller, engine, mut reports) = create_controller();

        controller.set_desired(true);
        let before = Instant::now();
        deliver(&mut controller, &engine, RecognitionEvent::Ended);

        let pending = controller.pending_restart().unwrap();
        assert_eq!(pending.cause, RestartCause::Ended);
        assert!(pending.deadline >= before + RESTART_AFTER_END);
        assert_eq!(controller.run_state(), EngineRunState::Stopped);
        // Still desired, so nothing is reported upward
        assert!(reports.try_recv().is_err());
    }

    #[test]
    fn test_error_schedules_long_restart() {
        let (mut controller, engine, _) = create_controller();

        controller.set_desired(true);
        let before = Instant::now();
        deliver(&mut controller, &engine, error("network"));

        let pending = controller.pending_restart().unwrap();
        assert_eq!(pending.cause, RestartCause::Error);
        assert!(pending.deadline >= before + RESTART_AFTER_ERROR);
    }

    #[test]
    fn test_error_then_end_keeps_single_restart() {
        let (mut controller, engine, _) = create_controller();

        controller.set_desired(true);
        deliver(&mut controller, &engine, error("no-speech"));
        let first = controller.pending_restart().unwrap();

        deliver(&mut controller, &engine, RecognitionEvent::Ended);
        assert_eq!(controller.pending_restart(), Some(first));
    }

    #[test]
    fn test_aborted_error_does_not_restart() {
        let (mut controller, engine, _) = create_controller();

        controller.set_desired(true);
        deliver(&mut controller, &engine, error("aborted"));
        assert!(controller.pending_restart().is_none());
        assert_eq!(controller.run_state(), EngineRunState::Stopped);

        // The trailing end of the aborted session does not revive it
        deliver(&mut controller, &engine, RecognitionEvent::Ended);
        assert!(controller.pending_restart().is_none());
        assert_eq!(engine.starts(), 1);
    }

    #[test]
    fn test_ended_while_not_desired_reports_stop() {
        let (mut controller, engine, mut reports) = create_controller();

        controller.set_desired(true);
        controller.set_desired(false);
        controller.on_engine_event(RecognitionEvent::Ended);

        assert_eq!(
            reports.try_recv().unwrap(),
            VoiceEvent::ListeningChanged { listening: false }
        );
        assert!(controller.pending_restart().is_none());
        assert_eq!(engine.starts(), 1);
    }

    #[test]
    fn test_set_desired_false_cancels_restart() {
        let (mut controller, engine, _) = create_controller();

        controller.set_desired(true);
        deliver(&mut controller, &engine, error("network"));
        let pending = controller.pending_restart().unwrap();

        controller.set_desired(false);
        assert!(controller.pending_restart().is_none());

        // A timer that was already in flight must not start the engine
        controller.on_restart_due(pending.id);
        assert_eq!(engine.starts(), 1);
    }

    #[test]
    fn test_stale_restart_id_is_dropped() {
        let (mut controller, engine, _) = create_controller();

        controller.set_desired(true);
        deliver(&mut controller, &engine, RecognitionEvent::Ended);
        let first = controller.pending_restart().unwrap();
        controller.on_restart_due(first.id);
        assert_eq!(engine.starts(), 2);

        deliver(&mut controller, &engine, RecognitionEvent::Ended);
        controller.on_restart_due(first.id);
        assert_eq!(engine.starts(), 2);
        assert!(controller.pending_restart().is_some());
    }

    #[test]
    fn test_restart_rechecks_run_state() {
        let (mut controller, engine, _) = create_controller();

        controller.set_desired(true);
        deliver(&mut controller, &engine, RecognitionEvent::Ended);
        let pending = controller.pending_restart().unwrap();

        // Desired flaps off and on before the timer fires: the engine is
        // started right away and the old timer has nothing left to do
        controller.set_desired(false);
        controller.set_desired(true);
        assert_eq!(engine.starts(), 2);

        controller.on_restart_due(pending.id);
        assert_eq!(engine.starts(), 2);
        assert_eq!(engine.double_starts(), 0);
    }

    #[test]
    fn test_double_start_is_swallowed() {
        let (mut controller, engine, _) = create_controller();

        // The engine still believes a previous session is alive
        engine.force_active();
        controller.set_desired(true);

        assert_eq!(engine.starts(), 0);
        assert_eq!(engine.double_starts(), 1);
        assert_eq!(controller.run_state(), EngineRunState::Starting);
        assert!(controller.pending_restart().is_none());

        // Its eventual end brings the controller back on track
        deliver(&mut controller, &engine, RecognitionEvent::Ended);
        let pending = controller.pending_restart().unwrap();
        controller.on_restart_due(pending.id);
        assert_eq!(engine.starts(), 1);
    }

    #[test]
    fn test_start_failure_schedules_retry() {
        let (mut controller, engine, _) = create_controller();

        engine.fail_next_start();
        controller.set_desired(true);

        assert_eq!(controller.run_state(), EngineRunState::Stopped);
        let pending = controller.pending_restart().unwrap();
        assert_eq!(pending.cause, RestartCause::Error);

        controller.on_restart_due(pending.id);
        assert_eq!(engine.starts(), 1);
    }

    #[test]
    fn test_dispose_stops_engine_and_clears_timer() {
        let (mut controller, engine, mut reports) = create_controller();

        controller.set_desired(true);
        deliver(&mut controller, &engine, error("network"));
        let pending = controller.pending_restart().unwrap();

        controller.dispose();
        controller.dispose();
        assert!(controller.is_disposed());
        assert!(controller.pending_restart().is_none());
        assert_eq!(controller.run_state(), EngineRunState::Stopped);
        assert_eq!(engine.stops(), 1);

        // Nothing gets through after teardown
        controller.on_restart_due(pending.id);
        controller.set_desired(false);
        controller.set_desired(true);
        controller.on_engine_event(RecognitionEvent::Result("late".into()));
        assert_eq!(engine.starts(), 1);
        assert!(reports.try_recv().is_err());
    }

    #[test]
    fn test_drop_disposes() {
        let (mut controller, engine, _) = create_controller();

        controller.set_desired(true);
        drop(controller);

        assert_eq!(engine.stops(), 1);
        assert!(!engine.is_active());
    }

    #[test]
    fn test_no_double_start_for_any_toggle_sequence() {
        // Every sequence of six desired values, with the engine ending its
        // session after each step
        for mask in 0u32..64 {
            let (mut controller, engine, _) = create_controller();

            for step in 0..6 {
                let desired = mask & (1 << step) != 0;
                controller.set_desired(desired);
                controller.set_desired(desired);

                if step % 2 == 1 {
                    deliver(&mut controller, &engine, RecognitionEvent::Ended);
                    if let Some(pending) = controller.pending_restart() {
                        controller.on_restart_due(pending.id);
                    }
                }
            }

            assert_eq!(engine.double_starts(), 0, "sequence {mask:06b}");
        }
    }

    mod driver {
        use super::*;

        struct Harness {
            commands: mpsc::UnboundedSender<ControlCommand>,
            engine_events: mpsc::UnboundedSender<RecognitionEvent>,
            reports: mpsc::UnboundedReceiver<VoiceEvent>,
            engine: MockEngine,
            task: tokio::task::JoinHandle<()>,
        }

        impl Harness {
            fn spawn() -> Self {
                let (controller, engine, reports) = create_controller();
                let (commands, command_rx) = mpsc::unbounded_channel();
                let (engine_events, event_rx) = mpsc::unbounded_channel();
                let task = tokio::spawn(controller.run(command_rx, event_rx));
                Self {
                    commands,
                    engine_events,
                    reports,
                    engine,
                    task,
                }
            }

            async fn command(&self, command: ControlCommand) {
                self.commands.send(command).unwrap();
                settle().await;
            }

            async fn engine_event(&self, event: RecognitionEvent) {
                if matches!(event, RecognitionEvent::Error(_) | RecognitionEvent::Ended) {
                    self.engine.end_session();
                }
                self.engine_events.send(event).unwrap();
                settle().await;
            }
        }

        async fn settle() {
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_restart_after_end_every_time() {
            let harness = Harness::spawn();
            harness.command(ControlCommand::SetDesired(true)).await;
            assert_eq!(harness.engine.starts(), 1);

            for round in 1..=3 {
                let ended_at = Instant::now();
                harness.engine_event(RecognitionEvent::Ended).await;

                tokio::time::sleep(Duration::from_millis(499)).await;
                assert_eq!(harness.engine.starts(), round);

                tokio::time::sleep(Duration::from_millis(2)).await;
                assert_eq!(harness.engine.starts(), round + 1);

                let started_at = harness.engine.last_start().unwrap();
                let waited = started_at - ended_at;
                assert!(waited >= RESTART_AFTER_END);
                assert!(waited <= RESTART_AFTER_END + Duration::from_millis(1));
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_restart_after_error_uses_long_backoff() {
            let harness = Harness::spawn();
            harness.command(ControlCommand::SetDesired(true)).await;

            for round in 1..=2 {
                let failed_at = Instant::now();
                harness
                    .engine_event(RecognitionEvent::Error("network".into()))
                    .await;

                tokio::time::sleep(Duration::from_millis(600)).await;
                assert_eq!(harness.engine.starts(), round);

                tokio::time::sleep(Duration::from_millis(401)).await;
                assert_eq!(harness.engine.starts(), round + 1);

                let waited = harness.engine.last_start().unwrap() - failed_at;
                assert!(waited >= RESTART_AFTER_ERROR);
                assert!(waited <= RESTART_AFTER_ERROR + Duration::from_millis(1));
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_cancel_during_backoff() {
            let harness = Harness::spawn();
            harness.command(ControlCommand::SetDesired(true)).await;
            harness
                .engine_event(RecognitionEvent::Error("network".into()))
                .await;

            tokio::time::sleep(Duration::from_millis(300)).await;
            harness.command(ControlCommand::SetDesired(false)).await;

            tokio::time::sleep(Duration::from_millis(5000)).await;
            assert_eq!(harness.engine.starts(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_aborted_never_restarts() {
            let harness = Harness::spawn();
            harness.command(ControlCommand::SetDesired(true)).await;
            harness
                .engine_event(RecognitionEvent::Error("aborted".into()))
                .await;

            tokio::time::sleep(Duration::from_millis(5000)).await;
            assert_eq!(harness.engine.starts(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_transcripts_flow_upward() {
            let mut harness = Harness::spawn();
            harness.command(ControlCommand::SetDesired(true)).await;
            harness
                .engine_event(RecognitionEvent::Result("hello".into()))
                .await;

            assert_eq!(
                harness.reports.recv().await,
                Some(VoiceEvent::Transcript {
                    text: "hello".into()
                })
            );

            tokio::time::sleep(Duration::from_millis(2000)).await;
            assert_eq!(harness.engine.starts(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_dispose_command_tears_down() {
            let harness = Harness::spawn();
            harness.command(ControlCommand::SetDesired(true)).await;
            harness.engine_event(RecognitionEvent::Ended).await;

            harness.commands.send(ControlCommand::Dispose).unwrap();
            harness.task.await.unwrap();

            assert_eq!(harness.engine.stops(), 1);
            tokio::time::sleep(Duration::from_millis(2000)).await;
            assert_eq!(harness.engine.starts(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_closed_command_channel_disposes() {
            let Harness {
                commands,
                engine_events: _engine_events,
                engine,
                task,
                ..
            } = Harness::spawn();

            commands.send(ControlCommand::SetDesired(true)).unwrap();
            drop(commands);
            task.await.unwrap();

            assert_eq!(engine.starts(), 1);
            assert_eq!(engine.stops(), 1);
            assert!(!engine.is_active());
        }
    }
}
