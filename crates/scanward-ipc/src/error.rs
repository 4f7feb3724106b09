//! IPC Error types

use thiserror::Error;

use crate::ErrorCode;

/// Errors raised while talking to, or serving, the daemon socket
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame header announced more than the 1 MiB limit
    #[error("Frame of {size} bytes exceeds the 1 MiB limit")]
    FrameTooLarge { size: usize },

    /// Payload was neither MessagePack nor JSON for the expected type
    #[error("Malformed message: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),

    #[error("Could not encode message: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),

    #[error("Timed out waiting for the peer")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Daemon answered with an error response
    #[error("Daemon refused the request ({code:?}): {message}")]
    Remote { code: ErrorCode, message: String },

    /// No socket at the configured path
    #[error("Scanward daemon is not running (no socket)")]
    DaemonNotRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_cause() {
        let err: IpcError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer hung up").into();
        let msg = err.to_string();
        assert!(msg.starts_with("IO error"));
        assert!(msg.contains("peer hung up"));
    }

    #[test]
    fn test_frame_too_large_reports_size() {
        let err = IpcError::FrameTooLarge { size: 2_000_000 };
        assert_eq!(err.to_string(), "Frame of 2000000 bytes exceeds the 1 MiB limit");
    }

    #[test]
    fn test_remote_error_display() {
        let err = IpcError::Remote {
            code: ErrorCode::ShuttingDown,
            message: "Daemon is shutting down".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ShuttingDown"));
        assert!(msg.contains("Daemon is shutting down"));
    }

    #[test]
    fn test_daemon_not_running_display() {
        assert!(IpcError::DaemonNotRunning.to_string().contains("not running"));
    }
}
