//! Session lifecycle: starts a session on the first command and a fresh one
//! once the previous session has shut down.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::command::ScanCommand;
use crate::session::{ScanSession, SessionDeps, SessionHandle, SessionSnapshot};
use crate::CoreError;

/// How a command was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Handed to the session that was already running
    Delivered,
    /// A new session was started for this command
    Started,
    /// Pause/resume with no live session; nothing to act on
    NoSession,
}

/// Entry point for scan commands.
pub struct Coordinator {
    deps: SessionDeps,
    current: Mutex<Option<SessionHandle>>,
    replay_tx: mpsc::UnboundedSender<ScanCommand>,
    stopping: AtomicBool,
}

impl Coordinator {
    /// Must be called from within a tokio runtime.
    pub fn new(deps: SessionDeps) -> Arc<Self> {
        let (replay_tx, mut replay_rx) = mpsc::unbounded_channel::<ScanCommand>();
        let coordinator = Arc::new(Self {
            deps,
            current: Mutex::new(None),
            replay_tx,
            stopping: AtomicBool::new(false),
        });

        let weak: Weak<Self> = Arc::downgrade(&coordinator);
        tokio::spawn(async move {
            while let Some(command) = replay_rx.recv().await {
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                if coordinator.stopping.load(Ordering::SeqCst) {
                    continue;
                }
                if let Err(e) = coordinator.handle(command) {
                    debug!(error = %e, "Replayed command lost");
                }
            }
        });

        coordinator
    }

    pub fn deps(&self) -> &SessionDeps {
        &self.deps
    }

    /// Route a command to the live session, starting one if needed.
    pub fn handle(&self, command: ScanCommand) -> Result<Dispatch, CoreError> {
        let mut current = self.current.lock();

        if let Some(session) = current.as_ref().filter(|s| s.is_active()) {
            match session.dispatch(command.clone()) {
                Ok(()) => return Ok(Dispatch::Delivered),
                // ended between the check and the send
                Err(CoreError::SessionEnded) => {}
                Err(e) => return Err(e),
            }
        }

        if matches!(command, ScanCommand::Pause | ScanCommand::Resume) {
            debug!(%command, "No active session");
            return Ok(Dispatch::NoSession);
        }

        let session = self.start_session();
        session.dispatch(command)?;
        *current = Some(session);
        Ok(Dispatch::Started)
    }

    /// Forward an undecodable command so listeners still see activity.
    pub fn handle_unrecognized(&self, action: &str) -> Result<Dispatch, CoreError> {
        let mut current = self.current.lock();

        if let Some(session) = current.as_ref().filter(|s| s.is_active()) {
            if session.dispatch_unrecognized(action).is_ok() {
                return Ok(Dispatch::Delivered);
            }
        }

        let session = self.start_session();
        session.dispatch_unrecognized(action)?;
        *current = Some(session);
        Ok(Dispatch::Started)
    }

    /// Live session, if any
    pub fn current(&self) -> Option<SessionHandle> {
        self.current.lock().clone().filter(|s| s.is_active())
    }

    pub async fn status(&self) -> Option<SessionSnapshot> {
        let session = self.current()?;
        session.inspect().await.ok()
    }

    /// Stop the live session and refuse to replay leftovers.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(session) = self.current.lock().take() {
            if session.stop().is_ok() {
                info!(id = %session.id(), "Stopping scan session");
            }
        }
    }

    fn start_session(&self) -> SessionHandle {
        self.stopping.store(false, Ordering::SeqCst);
        ScanSession::start_with_replay(self.deps.clone(), Some(self.replay_tx.clone()))
    }
}
