//! Facade over the indexing engine.
//!
//! The coordinator never walks the filesystem or parses metadata itself; it
//! only sequences calls into a [`MediaEngine`] and listens to the progress the
//! engine reports through [`EngineCallbacks`].

use std::sync::Arc;

/// Handle returned by [`MediaEngine::add_callbacks`], used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

/// Indexing engine consumed by the coordinator.
///
/// `discover`, `reload*` and `setup`/`init` may take a long time and are only
/// ever invoked from the task queue worker. The pause/resume switches,
/// `is_initiated` and `is_working` must be cheap: they are called from the
/// session task while a queued operation may still be running.
pub trait MediaEngine: Send + Sync {
    /// Prepare engine resources before `init`
    fn setup(&self);

    /// Open the library; `false` means the engine is unusable
    fn init(&self) -> bool;

    /// Start background processing after devices are registered
    fn start(&self);

    fn is_initiated(&self) -> bool;

    /// Whether discovery, reload or parsing work is currently running
    fn is_working(&self) -> bool;

    fn discover(&self, entry_point: &str);

    /// Reload every known entry point
    fn reload(&self);

    /// Reload a single entry point
    fn reload_path(&self, entry_point: &str);

    fn ban_folder(&self, path: &str);

    /// Register a storage device. Returns `true` when it was not known before.
    fn add_device(&self, id: &str, path: &str, removable: bool) -> bool;

    /// Mount points of every registered device
    fn devices(&self) -> Vec<String>;

    fn pause_background_operations(&self);

    fn resume_background_operations(&self);

    /// Re-queue media whose parsing previously failed
    fn force_parser_retry(&self);

    /// Subfolders (each starting with `/`) never indexed under a new root
    fn blacklist(&self) -> Vec<String>;

    fn add_callbacks(&self, callbacks: Arc<dyn EngineCallbacks>) -> CallbackId;

    fn remove_callbacks(&self, id: CallbackId);
}

/// Progress callbacks invoked by the engine from its own threads.
pub trait EngineCallbacks: Send + Sync {
    fn on_discovery_started(&self, entry_point: &str);
    fn on_discovery_progress(&self, entry_point: &str);
    fn on_discovery_completed(&self, entry_point: &str);
    /// Parsing progress, `0..=100`
    fn on_parsing_stats_updated(&self, percent: u8);
    /// `None` or an empty path denotes a global reload
    fn on_reload_started(&self, entry_point: Option<&str>);
    fn on_reload_completed(&self, entry_point: Option<&str>);
}

/// Owned form of an engine callback, queued for the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    DiscoveryStarted(String),
    DiscoveryProgress(String),
    DiscoveryCompleted(String),
    ParsingStatsUpdated(u8),
    ReloadStarted(Option<String>),
    ReloadCompleted(Option<String>),
}

/// Returns `true` for the path of a global (unscoped) operation.
pub fn is_global(entry_point: Option<&str>) -> bool {
    entry_point.map_or(true, str::is_empty)
}

/// Normalizes an optional path argument: empty strings count as absent.
pub fn non_empty(path: Option<&str>) -> Option<&str> {
    path.filter(|p| !p.is_empty())
}

/// Joins a blacklisted subfolder onto a storage root.
///
/// `("/usb1", "/Android")` and `("/usb1/", "Android")` both give `/usb1/Android`.
pub fn banned_path(root: &str, folder: &str) -> String {
    let root = root.trim_end_matches('/');
    if folder.starts_with('/') {
        format!("{root}{folder}")
    } else {
        format!("{root}/{folder}")
    }
}
