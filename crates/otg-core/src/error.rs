//! Typed error definitions for the gateway session core.
//!
//! [`GatewayError`] covers the failures the core itself can detect. Broker
//! level failures (login rejected, order rejected) are never represented
//! here: drivers report those to the consumer as notifications.

use thiserror::Error;

/// Domain-specific errors for the session core.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// A structurally malformed request (e.g. a login without a broker id).
    #[error("validation error: {0}")]
    Validation(String),

    /// `start` was called on a session whose worker is still running.
    #[error("session '{0}' is already running")]
    AlreadyRunning(String),

    /// The session has no driver to run (a previous worker died with it).
    #[error("session '{0}' has no driver available")]
    DriverUnavailable(String),

    /// A state record could not be converted to its wire form.
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Failed to spawn the worker thread.
    #[error("worker spawn error: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, GatewayError>;
