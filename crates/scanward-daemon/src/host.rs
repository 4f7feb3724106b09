//! Host-side collaborators wired into the coordinator: the lock file, the
//! indicator slot and the new-device log.

use parking_lot::Mutex;
use scanward_core::{
    Coordinator, CoreError, DevicePrompter, LifecycleBus, NewDevice, ProgressIndicator,
    ResourceLock, ScanCommand, StatusSink,
};
use scanward_ipc::IndicatorInfo;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lock file present in the data directory while a session may scan.
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResourceLock for LockFile {
    fn acquire(&self) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, std::process::id().to_string())
            .map_err(|e| CoreError::Lock(format!("{}: {}", self.path.display(), e)))
    }

    fn release(&self) -> Result<(), CoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Lock(format!("{}: {}", self.path.display(), e))),
        }
    }
}

/// Holds the single indicator currently on display.
#[derive(Default)]
pub struct IndicatorSlot {
    current: Mutex<Option<ProgressIndicator>>,
}

impl IndicatorSlot {
    pub fn current(&self) -> Option<ProgressIndicator> {
        self.current.lock().clone()
    }

    /// Wire form of the indicator for status replies
    pub fn info(&self) -> Option<IndicatorInfo> {
        self.current.lock().as_ref().map(|indicator| IndicatorInfo {
            title: indicator.title.clone(),
            body: indicator.body.clone(),
            action: indicator.action.map(|a| a.kind.label().to_string()),
        })
    }
}

impl StatusSink for IndicatorSlot {
    fn publish(&self, indicator: &ProgressIndicator) -> Result<(), CoreError> {
        debug!(body = %indicator.body, "Indicator updated");
        *self.current.lock() = Some(indicator.clone());
        Ok(())
    }

    fn withdraw(&self, id: u32) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|indicator| indicator.id == id) {
            *current = None;
            debug!(id, "Indicator withdrawn");
        }
    }
}

/// New external storage roots waiting for the user to scan them.
#[derive(Default)]
pub struct PendingDevices {
    devices: Mutex<Vec<NewDevice>>,
}

impl PendingDevices {
    pub fn paths(&self) -> Vec<String> {
        self.devices.lock().iter().map(|d| d.path.clone()).collect()
    }

    /// Forget a device once it has been handed to discovery.
    pub fn resolve(&self, path: &str) -> bool {
        let mut devices = self.devices.lock();
        let before = devices.len();
        devices.retain(|d| d.path != path);
        devices.len() != before
    }
}

impl DevicePrompter for PendingDevices {
    fn prompt_new_device(&self, device: &NewDevice) {
        info!(
            id = %device.id,
            path = %device.path,
            "New storage device; run `scanward discover-device {}` to scan it",
            device.path
        );
        let mut devices = self.devices.lock();
        if !devices.iter().any(|d| d.path == device.path) {
            devices.push(device.clone());
        }
    }
}

/// Log every lifecycle signal until the bus goes away.
pub fn spawn_lifecycle_logger(bus: &LifecycleBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(signal) => info!(%signal, "Lifecycle"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Lifecycle logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Bootstrap the library as if the host had just come up.
pub fn auto_init(coordinator: &Coordinator) {
    match coordinator.handle(ScanCommand::Init { upgrade: false }) {
        Ok(dispatch) => info!(?dispatch, "Auto-init dispatched"),
        Err(e) => warn!(error = %e, "Auto-init failed"),
    }
}
