//! Error types for riverloop
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. These are internal: every variant is recoverable by design
//! (loader retries, tier downgrades), and none escape the public engine API.

use thiserror::Error;

/// Main error type for the riverloop engine internals
#[derive(Error, Debug)]
pub enum Error {
    /// Asset fetch exceeded the configured timeout
    #[error("asset fetch timed out after {0:?}")]
    LoadTimeout(std::time::Duration),

    /// Asset fetch failed (network or HTTP status)
    #[error("asset fetch failed: {0}")]
    Http(String),

    /// Audio decoding errors (malformed or unsupported payload)
    #[error("audio decode error: {0}")]
    Decode(String),

    /// Audio graph could not be constructed
    #[error("audio graph construction failed: {0}")]
    GraphConstruction(String),

    /// Output device missing or unusable
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Fallback element failed to play
    #[error("fallback element playback failed: {0}")]
    ElementPlayback(String),

    /// File I/O errors
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the riverloop Error
pub type Result<T> = std::result::Result<T, Error>;
