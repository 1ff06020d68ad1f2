//! Error types for nightcast-ctl
//!
//! Capability failures are split in two: `CapabilityUnavailable` when the
//! backend cannot be reached at all (not connected, timed out, socket closed)
//! and `Capability` when the backend answered but refused the request.

use thiserror::Error;

/// Main error type for the controller
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend not connected, timed out or dropped mid-request
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Backend answered with a failure status
    #[error("Capability request failed: {0}")]
    Capability(String),

    /// Malformed or unexpected message from the backend
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Media file, song or replay not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from nightcast-common
    #[error(transparent)]
    Common(#[from] nightcast_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when retrying later (after a reconnect) may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::CapabilityUnavailable(_))
    }
}

/// Convenience Result type using the controller Error
pub type Result<T> = std::result::Result<T, Error>;
