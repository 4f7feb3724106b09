//! Core error types for the scan coordinator.

use thiserror::Error;

/// Errors that can occur in coordinator operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// The session already shut down and no longer accepts input
    #[error("Scan session has ended")]
    SessionEnded,

    /// The task queue could not start its worker thread
    #[error("Task queue worker failed to start: {0}")]
    QueueSpawn(#[source] std::io::Error),

    /// Resource lock backend failure
    #[error("Resource lock error: {0}")]
    Lock(String),

    /// Progress indicator could not be published
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
