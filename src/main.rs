//! camera-chat: camera-overlay chat with continuous voice input
//!
//! Runs the conversation overlay in a terminal:
//! - Camera preview acquired from a video device
//! - Conversation thread with a canned assistant
//! - Voice input kept listening by the continuous listening controller
//!
//! Stdout carries the overlay; logs go to stderr.

mod assistant;
mod camera;
mod config;
mod events;
mod lifecycle;
mod overlay;
mod recognition;
mod state;
mod terminal;
mod voice;

#[cfg(test)]
mod testing;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::assistant::CannedReplies;
use crate::camera::DeviceCamera;
use crate::config::Config;
use crate::events::OverlayEvent;
use crate::lifecycle::ShutdownSignal;
use crate::overlay::Overlay;
use crate::recognition::SimulatedSpeech;
use crate::terminal::InputReader;
use crate::voice::VoiceInput;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "camera-chat starting");

    // Load configuration
    let config = Config::load()?;
    info!(
        ?config.camera_device,
        language = %config.speech.language,
        output = ?config.output,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Overlay -> renderer
    let (event_tx, _event_rx) = broadcast::channel::<OverlayEvent>(64);
    let mut render_rx = event_tx.subscribe();
    // Listening controller -> overlay
    let (voice_tx, mut voice_rx) = mpsc::unbounded_channel();
    // Terminal input -> overlay
    let (action_tx, mut action_rx) = mpsc::channel(32);

    let (speech, microphone) = SimulatedSpeech::new(config.speech.enabled, config.silence_timeout());
    let voice = VoiceInput::mount(&speech, &config.engine_config(), voice_tx);

    let mut overlay = Overlay::mount(
        config.overlay_settings(),
        Box::new(DeviceCamera::new(&config.camera_device)),
        voice,
        Box::new(CannedReplies),
        event_tx.clone(),
    );

    // Start the input reader (runs on dedicated thread)
    let mut input_reader = InputReader::new(action_tx, microphone);
    if let Err(e) = input_reader.start() {
        error!(?e, "failed to start input reader");
        warn!("continuing without terminal input");
    }

    println!("{}", terminal::help());
    info!(input = input_reader.is_running(), "overlay ready, entering main loop");

    let output = config.output;

    // Main event loop
    tokio::select! {
        // Run the overlay until input closes
        _ = overlay.run(&mut action_rx, &mut voice_rx) => {
            info!("overlay exited");
        }

        // Render overlay events to stdout
        _ = async {
            loop {
                match render_rx.recv().await {
                    Ok(event) => {
                        if let Some(line) = terminal::render(&event, output) {
                            println!("{}", line);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "overlay event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("renderer exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    input_reader.stop();
    overlay.unmount().await;

    info!("camera-chat stopped");

    Ok(())
}
