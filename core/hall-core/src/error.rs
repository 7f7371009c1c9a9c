//! Error types for hall-core operations.

use std::path::PathBuf;

/// All errors that can occur in hall-core operations.
///
/// Most of these are soft failures: callers log them and carry on with the
/// rest of the cover sequence rather than aborting.
#[derive(Debug, thiserror::Error)]
pub enum HallError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration write failed: {path}: {source}")]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Sensor Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Hall sensor status unreadable: {path}: {source}")]
    StatusUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Command Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Command timed out after {timeout_ms}ms: {command}")]
    CommandTimedOut { command: String, timeout_ms: u64 },

    #[error("Platform action failed: {action}: {details}")]
    PlatformFailed { action: String, details: String },
}

/// Convenience alias for hall-core results.
pub type Result<T> = std::result::Result<T, HallError>;
