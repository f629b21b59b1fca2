//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::overlay::OverlaySettings;
use crate::recognition::EngineConfig;

/// How overlay events are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => bail!("unknown output format: {other}"),
        }
    }
}

/// Speech recognition settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Whether the speech capability is offered at all
    pub enabled: bool,

    /// Recognition language
    pub language: String,

    /// How long a session waits for speech before giving up
    pub silence_timeout_ms: u64,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "en-US".to_string(),
            silence_timeout_ms: 8000,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for runtime data
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Video device used for the camera preview
    pub camera_device: PathBuf,

    pub speech: SpeechSettings,

    /// Delay before the assistant answers
    pub reply_delay_ms: u64,

    /// Delay between a spoken question's answer and the camera switching off
    pub camera_off_delay_ms: u64,

    pub output: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            camera_device: PathBuf::from("/dev/video0"),
            speech: SpeechSettings::default(),
            reply_delay_ms: 2000,
            camera_off_delay_ms: 1000,
            output: OutputFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("camera-chat");

        let mut config = Self::from_file(&data_dir.join("config.json"))?;
        config.data_dir = data_dir;
        config.apply_env(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Read a JSON config file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Apply `CAMERA_CHAT_*` overrides
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(device) = var("CAMERA_CHAT_DEVICE") {
            self.camera_device = PathBuf::from(device);
        }
        if let Some(language) = var("CAMERA_CHAT_LANG") {
            self.speech.language = language;
        }
        if let Some(output) = var("CAMERA_CHAT_OUTPUT") {
            self.output = output.parse().context("invalid CAMERA_CHAT_OUTPUT")?;
        }
        Ok(())
    }

    /// Engine settings for the voice input
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            language: self.speech.language.clone(),
            ..EngineConfig::default()
        }
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.speech.silence_timeout_ms)
    }

    pub fn overlay_settings(&self) -> OverlaySettings {
        OverlaySettings {
            reply_delay: Duration::from_millis(self.reply_delay_ms),
            camera_off_delay: Duration::from_millis(self.camera_off_delay_ms),
        }
    }
}
