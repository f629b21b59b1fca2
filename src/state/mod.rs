//! Listening state module
//!
//! Provides the continuous listening controller, which owns three pieces
//! of state:
//! - Desired: whether the parent wants to listen (observed, never changed here)
//! - EngineRunState: Stopped, Starting or Running
//! - PendingRestart: at most one scheduled restart, always cancellable

mod machine;

pub use machine::{ControlCommand, ListeningController};
