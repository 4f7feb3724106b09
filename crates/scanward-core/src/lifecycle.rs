//! Fire-and-forget lifecycle signals for external listeners.

use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

/// Signals emitted by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// A command was received by a live session
    SessionStarted,
    /// The session shut down and released its resources
    SessionEnded,
    /// Bootstrap finished and the library accepts queries
    LibraryReady,
}

impl fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleSignal::SessionStarted => "session-started",
            LifecycleSignal::SessionEnded => "session-ended",
            LifecycleSignal::LibraryReady => "library-ready",
        })
    }
}

/// Broadcast bus for [`LifecycleSignal`]s. Cloning shares the bus.
#[derive(Debug, Clone)]
pub struct LifecycleBus {
    tx: broadcast::Sender<LifecycleSignal>,
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl LifecycleBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.tx.subscribe()
    }

    /// Emit without waiting for, or requiring, any listener.
    pub fn emit(&self, signal: LifecycleSignal) {
        trace!(%signal, "Lifecycle signal");
        let _ = self.tx.send(signal);
    }
}
