//! Camera capability
//!
//! The overlay acquires a stream when the camera is switched on and
//! releases it when switched off or unmounted. Streams are never shared.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which camera to prefer on devices with several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    User,
    Environment,
}

/// Requested stream properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing_mode: FacingMode,
    /// Whether to capture audio alongside video
    pub audio: bool,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            audio: false,
        }
    }
}

/// Errors acquiring a camera stream
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("camera {device} unavailable: {reason}")]
    Unavailable { device: String, reason: String },
}

/// A live camera stream; dropping it releases the device
#[derive(Debug)]
pub struct CameraStream {
    label: String,
    _device: Option<File>,
}

impl CameraStream {
    /// A stream not backed by an open device handle
    pub fn detached(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            _device: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Stop all tracks and give the device back
    pub fn release(self) {
        debug!(label = %self.label, "camera stream released");
    }
}

/// Source of camera streams
pub trait Camera: Send {
    fn acquire(&mut self, constraints: &CameraConstraints) -> Result<CameraStream, CameraError>;
}

/// Camera backed by a video device node such as `/dev/video0`
#[derive(Debug, Clone)]
pub struct DeviceCamera {
    device: PathBuf,
}

impl DeviceCamera {
    pub fn new(device: &Path) -> Self {
        Self {
            device: device.to_owned(),
        }
    }
}

impl Camera for DeviceCamera {
    fn acquire(&mut self, constraints: &CameraConstraints) -> Result<CameraStream, CameraError> {
        let file = File::open(&self.device).map_err(|e| CameraError::Unavailable {
            device: self.device.display().to_string(),
            reason: e.to_string(),
        })?;

        info!(
            device = ?self.device,
            facing_mode = ?constraints.facing_mode,
            audio = constraints.audio,
            "camera stream acquired"
        );

        Ok(CameraStream {
            label: self.device.display().to_string(),
            _device: Some(file),
        })
    }
}
