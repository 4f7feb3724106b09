//! Request handler for daemon IPC.

use async_trait::async_trait;
use scanward_core::{Coordinator, Dispatch, ScanCommand};
use scanward_ipc::{DispatchOutcome, ErrorCode, Request, RequestHandler, Response, ResponseData};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use crate::host::{IndicatorSlot, PendingDevices};

/// Handles incoming IPC requests
pub struct DaemonHandler {
    coordinator: Arc<Coordinator>,
    indicator: Arc<IndicatorSlot>,
    devices: Arc<PendingDevices>,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: AtomicBool,
    start_time: Instant,
}

impl DaemonHandler {
    /// Create a new handler
    pub fn new(
        coordinator: Arc<Coordinator>,
        indicator: Arc<IndicatorSlot>,
        devices: Arc<PendingDevices>,
        shutdown_tx: broadcast::Sender<()>,
        start_time: Instant,
    ) -> Self {
        Self {
            coordinator,
            indicator,
            devices,
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
            start_time,
        }
    }

    /// Get uptime in seconds
    fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn dispatch(&self, command: ScanCommand) -> Response {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Response::error(ErrorCode::ShuttingDown, "Daemon is shutting down");
        }

        match self.coordinator.handle(command.clone()) {
            Ok(dispatch) => {
                if let ScanCommand::DiscoverDevice { path } = &command {
                    self.devices.resolve(path);
                }
                tracing::debug!(%command, ?dispatch, "Command dispatched");
                Response::ok_with(ResponseData::Dispatched {
                    command: command.name().to_string(),
                    outcome: outcome(dispatch),
                })
            }
            Err(e) => {
                tracing::warn!(%command, error = %e, "Failed to dispatch command");
                Response::error(ErrorCode::InternalError, e.to_string())
            }
        }
    }

    async fn status(&self) -> ResponseData {
        let snapshot = self.coordinator.status().await;

        ResponseData::Status {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.uptime_secs(),
            session_active: snapshot.is_some(),
            indicator: self.indicator.info(),
            parsing_percent: snapshot.as_ref().map_or(0, |s| s.parsing_percent),
            current_discovery: snapshot.as_ref().and_then(|s| s.current_discovery.clone()),
            reload_count: snapshot.as_ref().map_or(0, |s| s.reload_count),
            pending_operations: snapshot.as_ref().map_or(0, |s| s.pending_operations),
            lock_held: snapshot.as_ref().is_some_and(|s| s.lock_held),
            pending_devices: self.devices.paths(),
        }
    }
}

/// Map a request onto a scan command, if it is one
pub fn scan_command(request: &Request) -> Option<ScanCommand> {
    match request {
        Request::Init { upgrade } => Some(ScanCommand::Init { upgrade: *upgrade }),
        Request::Reload { path } => Some(ScanCommand::Reload { path: path.clone() }),
        Request::Discover { path } => Some(ScanCommand::Discover { path: path.clone() }),
        Request::DiscoverDevice { path } => Some(ScanCommand::DiscoverDevice { path: path.clone() }),
        Request::PauseScan => Some(ScanCommand::Pause),
        Request::ResumeScan => Some(ScanCommand::Resume),
        Request::Status
        | Request::Shutdown
        | Request::Ping
        | Request::Unrecognized => None,
    }
}

fn outcome(dispatch: Dispatch) -> DispatchOutcome {
    match dispatch {
        Dispatch::Delivered => DispatchOutcome::Delivered,
        Dispatch::Started => DispatchOutcome::Started,
        Dispatch::NoSession => DispatchOutcome::NoSession,
    }
}

#[async_trait]
impl RequestHandler for DaemonHandler {
    async fn handle(&self, request: Request) -> Response {
        if let Some(command) = scan_command(&request) {
            return self.dispatch(command);
        }

        match request {
            Request::Ping => Response::ok_with(ResponseData::Pong {
                timestamp: chrono::Utc::now().timestamp(),
            }),

            Request::Status => Response::ok_with(self.status().await),

            Request::Shutdown => {
                tracing::info!("Shutdown requested via IPC");
                self.shutting_down.store(true, Ordering::SeqCst);
                let _ = self.shutdown_tx.send(());
                Response::ack()
            }

            Request::Unrecognized => {
                // still counts as activity for the live session
                if !self.shutting_down.load(Ordering::SeqCst) {
                    if let Err(e) = self.coordinator.handle_unrecognized(request.action()) {
                        tracing::debug!(error = %e, "Unrecognized command dropped");
                    }
                }
                Response::error(ErrorCode::InvalidRequest, "Unrecognized action")
            }

            _ => Response::error(ErrorCode::InternalError, "Unhandled request"),
        }
    }
}
