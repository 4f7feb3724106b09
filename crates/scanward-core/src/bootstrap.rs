//! One-shot library bootstrap executed on the task queue.
//!
//! Device decisions are plain functions over the storage layout; the only
//! side effects are the engine calls and the [`DevicePrompter`] consumer.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::engine::{banned_path, MediaEngine};
use crate::lifecycle::{LifecycleBus, LifecycleSignal};
use crate::queue::TaskQueue;

/// Device id of the default storage root.
pub const MAIN_STORAGE_ID: &str = "main-storage";

/// A storage root to register with the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRegistration {
    pub id: String,
    pub path: String,
    pub removable: bool,
}

impl DeviceRegistration {
    pub fn is_main(&self) -> bool {
        !self.removable
    }
}

/// A newly seen external storage root the user should be asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDevice {
    pub id: String,
    pub path: String,
}

/// Consumer of new-device events (dialog, log, IPC notification, ...).
pub trait DevicePrompter: Send + Sync {
    fn prompt_new_device(&self, device: &NewDevice);
}

/// What bootstrap does once the library is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Upgrade: retry media whose parsing failed with the previous version
    ForceParserRetry,
    /// Existing library: refresh everything
    GlobalReload,
    Nothing,
}

/// Result of a successful bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub first_run: bool,
    pub new_devices: Vec<NewDevice>,
    pub follow_up: FollowUp,
}

/// Device id for a storage root: its last path segment.
pub fn device_id(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(path)
        .to_string()
}

/// Default root first, then each distinct external root.
pub fn plan_devices(storage: &StorageConfig) -> Vec<DeviceRegistration> {
    let mut plan = vec![DeviceRegistration {
        id: MAIN_STORAGE_ID.to_string(),
        path: storage.default_root.clone(),
        removable: false,
    }];

    for root in &storage.external_roots {
        if root.is_empty() || plan.iter().any(|d| d.path == *root) {
            continue;
        }
        plan.push(DeviceRegistration {
            id: device_id(root),
            path: root.clone(),
            removable: true,
        });
    }

    plan
}

/// Non-default devices the engine reported as new.
pub fn devices_needing_prompt(registered: &[(DeviceRegistration, bool)]) -> Vec<NewDevice> {
    registered
        .iter()
        .filter(|(device, is_new)| *is_new && !device.is_main())
        .map(|(device, _)| NewDevice {
            id: device.id.clone(),
            path: device.path.clone(),
        })
        .collect()
}

pub fn follow_up(upgrade: bool, first_run: bool) -> FollowUp {
    if upgrade {
        FollowUp::ForceParserRetry
    } else if !first_run {
        FollowUp::GlobalReload
    } else {
        FollowUp::Nothing
    }
}

/// Everything the bootstrap job needs, moved onto the queue worker.
pub(crate) struct Bootstrap {
    pub engine: Arc<dyn MediaEngine>,
    pub storage: StorageConfig,
    pub prompter: Arc<dyn DevicePrompter>,
    pub lifecycle: LifecycleBus,
    pub queue: TaskQueue,
    pub upgrade: bool,
}

impl Bootstrap {
    /// Returns `None` when the engine failed to initialize.
    pub(crate) fn run(self) -> Option<BootstrapOutcome> {
        // probed before setup: an engine may create its database during init
        let first_run = !self.storage.database_path.exists();

        self.engine.setup();
        if !self.engine.init() {
            warn!("Media library failed to initialize");
            return None;
        }

        let blacklist = self.engine.blacklist();
        let mut registered = Vec::new();
        for device in plan_devices(&self.storage) {
            let is_new = self
                .engine
                .add_device(&device.id, &device.path, device.removable);
            debug!(id = %device.id, path = %device.path, is_new, "Device registered");

            if device.is_main() && first_run {
                for folder in &blacklist {
                    self.engine.ban_folder(&banned_path(&device.path, folder));
                }
            }
            registered.push((device, is_new));
        }

        let new_devices = devices_needing_prompt(&registered);
        for device in &new_devices {
            self.prompter.prompt_new_device(device);
        }

        self.engine.start();

        for dir in self.storage.media_directories.iter().filter(|d| !d.is_empty()) {
            let engine = self.engine.clone();
            let dir = dir.clone();
            if let Err(e) = self.queue.submit("discover", move || engine.discover(&dir)) {
                warn!(error = %e, "Failed to queue media directory discovery");
            }
        }

        self.lifecycle.emit(LifecycleSignal::LibraryReady);

        let follow_up = follow_up(self.upgrade, first_run);
        if follow_up == FollowUp::ForceParserRetry {
            self.engine.force_parser_retry();
        }

        info!(first_run, upgrade = self.upgrade, ?follow_up, "Media library ready");

        Some(BootstrapOutcome {
            first_run,
            new_devices,
            follow_up,
        })
    }
}
