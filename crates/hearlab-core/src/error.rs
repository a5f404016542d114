//! Core error types for hearlab-core.
//!
//! Fatal failures (a block that cannot be loaded, a round that cannot be
//! fetched) surface to the participant as a terminal error action. Non-fatal
//! failures (rejected autoplay, a result POST that comes back 4xx) are
//! recovered locally and never abort a running session.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for hearlab-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The server returned no block for the requested slug.
    #[error("Block '{slug}' not found")]
    BlockNotFound { slug: String },

    /// The block exists but carried no session id.
    #[error("Block '{slug}' did not provide a session")]
    SessionCreationFailed { slug: String },

    /// The next-round call errored or returned no actions.
    #[error("No round available: {reason}")]
    RoundUnavailable { reason: String },

    /// An action arrived with a view discriminant no dispatcher entry matches.
    #[error("Unknown action view '{view}'")]
    UnknownActionView { view: String },

    /// The participant has not given consent; round fetching is gated on it.
    #[error("Participant has not given consent")]
    ConsentMissing,

    /// A result POST failed. Non-fatal: callers log and move on.
    #[error("Result submission failed: {reason}")]
    ResultSubmissionFailed { reason: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport-level HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Playback-specific errors. All of these are non-fatal by design: the
/// playback engine swallows them and the session keeps moving.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The output device refused to start playback without a user gesture.
    #[error("Autoplay rejected by the output device")]
    AutoplayRejected,

    /// A section asset could not be decoded or fetched.
    #[error("Section '{url}' could not be decoded: {reason}")]
    DecodeFailed { url: String, reason: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
