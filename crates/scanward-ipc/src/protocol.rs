//! IPC Protocol definitions for Scanward daemon communication.
//!
//! Uses MessagePack for efficient serialization over Unix sockets.

use serde::{Deserialize, Serialize};

/// Request from client (CLI/host) to daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Bootstrap the media library (or resume it)
    Init {
        /// Retry media that failed with a previous version
        #[serde(default)]
        upgrade: bool,
    },

    /// Reload everything, or a single entry point
    Reload {
        #[serde(default)]
        path: Option<String>,
    },

    /// Discover media under a path
    Discover {
        #[serde(default)]
        path: Option<String>,
    },

    /// Discover a newly attached storage root
    DiscoverDevice { path: String },

    /// Pause background scanning (power saving)
    PauseScan,

    /// Resume background scanning
    ResumeScan,

    /// Get daemon status
    Status,

    /// Graceful shutdown
    Shutdown,

    /// Ping for health check
    Ping,

    /// Any action this daemon does not know
    #[serde(other)]
    Unrecognized,
}

impl Request {
    /// Wire name of the action
    pub fn action(&self) -> &'static str {
        match self {
            Request::Init { .. } => "init",
            Request::Reload { .. } => "reload",
            Request::Discover { .. } => "discover",
            Request::DiscoverDevice { .. } => "discover_device",
            Request::PauseScan => "pause_scan",
            Request::ResumeScan => "resume_scan",
            Request::Status => "status",
            Request::Shutdown => "shutdown",
            Request::Ping => "ping",
            Request::Unrecognized => "unrecognized",
        }
    }
}

/// Response from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Success with optional data
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },

    /// Acknowledgment for fire-and-forget requests
    Ack,

    /// Error response
    Error { code: ErrorCode, message: String },
}

impl Response {
    /// Create a success response with no data
    pub fn ok() -> Self {
        Response::Ok { data: None }
    }

    /// Create a success response with data
    pub fn ok_with(data: ResponseData) -> Self {
        Response::Ok { data: Some(data) }
    }

    /// Create an acknowledgment response
    pub fn ack() -> Self {
        Response::Ack
    }

    /// Create an error response
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }
}

/// How a scan command was delivered to the coordinator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Delivered to the running session
    Delivered,
    /// A new session was started
    Started,
    /// No session to pause or resume
    NoSession,
}

/// The progress indicator as currently shown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndicatorInfo {
    pub title: String,
    pub body: String,
    /// Label of the toggle action, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Response data variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    /// Scan command accepted
    Dispatched {
        command: String,
        outcome: DispatchOutcome,
    },

    /// Daemon status
    Status {
        version: String,
        uptime_secs: u64,
        session_active: bool,
        #[serde(default)]
        indicator: Option<IndicatorInfo>,
        /// Parsing progress (0 when not parsing)
        #[serde(default)]
        parsing_percent: u8,
        #[serde(default)]
        current_discovery: Option<String>,
        /// In-flight global reloads
        #[serde(default)]
        reload_count: u32,
        /// Operations waiting on the task queue
        #[serde(default)]
        pending_operations: usize,
        #[serde(default)]
        lock_held: bool,
        /// New storage roots awaiting a user decision
        #[serde(default)]
        pending_devices: Vec<String>,
    },

    /// Pong response
    Pong { timestamp: i64 },
}

/// Error codes for error responses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request format is invalid
    InvalidRequest,
    /// Internal daemon error
    InternalError,
    /// Operation timed out
    Timeout,
    /// Daemon is shutting down
    ShuttingDown,
}
