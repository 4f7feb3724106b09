//! Scanward Core Components
//!
//! Coordinates media library scans: a single session owns the scan state,
//! serializes long engine operations on a task queue, guards concurrent
//! reloads, holds a resource lock while work may run and publishes a
//! throttled progress indicator.

mod bootstrap;
mod command;
mod config;
mod coordinator;
mod engine;
mod error;
mod lifecycle;
mod notifier;
mod power;
mod queue;
mod reload;
mod session;

pub use bootstrap::{
    device_id, devices_needing_prompt, follow_up, plan_devices, BootstrapOutcome,
    DevicePrompter, DeviceRegistration, FollowUp, NewDevice, MAIN_STORAGE_ID,
};
pub use command::ScanCommand;
pub use config::{DaemonConfig, LibraryConfig, StorageConfig};
pub use coordinator::{Coordinator, Dispatch};
pub use engine::{banned_path, is_global, non_empty, CallbackId, EngineCallbacks, EngineEvent, MediaEngine};
pub use error::CoreError;
pub use lifecycle::{LifecycleBus, LifecycleSignal};
pub use notifier::{
    display_path, IndicatorAction, IndicatorRenderer, Notifier, NotifyState, ProgressIndicator,
    StatusSink, StatusSnapshot, ToggleKind, DEFAULT_NOTIFICATION_DELAY, INDICATOR_ID,
};
pub use power::{PowerGuard, ResourceLock};
pub use queue::TaskQueue;
pub use reload::ReloadGuard;
pub use session::{ScanSession, SessionDeps, SessionHandle, SessionSnapshot, ShutdownReason};
