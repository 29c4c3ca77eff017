//! Error types for switchbridge
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Root is unavailable. Is the device rooted and has su access been granted?")]
    RootUnavailable,

    #[error("Could not make {0} readable (chmod or policy patch failed)")]
    PermissionPatchFailed(PathBuf),

    #[error("Cannot open input device '{path}': {reason}")]
    DeviceUnopenable { path: PathBuf, reason: String },

    #[error("Short read: expected 24 bytes, got {0}")]
    ShortRead(usize),

    #[error("Relay daemon did not start: {0}")]
    ShimStartFailed(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Shell error: {0}")]
    Shell(#[from] ShellError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the privileged shell
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("'{0} -c :' was refused. Grant root access to switchbridge in your su manager.")]
    ProbeFailed(String),

    #[error("Failed to write to privileged shell: {0}")]
    Write(#[source] std::io::Error),

    #[error("Privileged shell exited")]
    Exited,

    #[error("Command timed out after {0} ms")]
    Timeout(u64),

    #[error("Privileged shell lock poisoned")]
    Poisoned,
}

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
