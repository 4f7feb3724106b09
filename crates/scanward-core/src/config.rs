//! Configuration for the scan daemon and its coordinator.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::CoreError;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket path for IPC
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Data directory for the media database and lock file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// PID file path
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Send an `init` command as soon as the daemon is up
    #[serde(default = "default_auto_init")]
    pub auto_init: bool,

    /// Minimum interval between two progress indicator updates
    #[serde(default = "default_notification_delay_ms")]
    pub notification_delay_ms: u64,

    /// How long the task queue worker lingers without work
    #[serde(default = "default_queue_idle_timeout_secs")]
    pub queue_idle_timeout_secs: u64,

    /// Storage roots and media directories
    #[serde(default)]
    pub storage: StorageConfig,

    /// Settings handed to the library engine
    #[serde(default)]
    pub library: LibraryConfig,
}

/// Storage roots known to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Primary storage root, registered as the non-removable main device
    #[serde(default = "default_root")]
    pub default_root: String,

    /// Additional (removable) storage roots
    #[serde(default)]
    pub external_roots: Vec<String>,

    /// Directories discovered on every bootstrap
    #[serde(default = "default_media_directories")]
    pub media_directories: Vec<String>,

    /// Media database file; its absence marks a first run
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

/// Library engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Subfolders banned under every newly registered storage root
    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<String>,

    /// File extensions treated as media (lowercase, no dot)
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,

    /// Follow symlinks while discovering
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/scanward.sock")
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scanward")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/scanward.pid")
}

fn default_auto_init() -> bool {
    true
}

fn default_notification_delay_ms() -> u64 {
    1000
}

fn default_queue_idle_timeout_secs() -> u64 {
    30
}

fn default_root() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .display()
        .to_string()
}

fn default_media_directories() -> Vec<String> {
    [dirs::audio_dir(), dirs::video_dir()]
        .into_iter()
        .flatten()
        .map(|dir| dir.display().to_string())
        .collect()
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("media.db.json")
}

fn default_blacklist() -> Vec<String> {
    ["/.cache", "/.thumbnails", "/.local/share/Trash"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_media_extensions() -> Vec<String> {
    [
        "mp3", "flac", "ogg", "opus", "m4a", "wav", "aac", "mkv", "mp4", "avi", "webm", "mov",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_root: default_root(),
            external_roots: Vec::new(),
            media_directories: default_media_directories(),
            database_path: default_database_path(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            blacklist: default_blacklist(),
            media_extensions: default_media_extensions(),
            follow_symlinks: false,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            pid_file: default_pid_file(),
            auto_init: default_auto_init(),
            notification_delay_ms: default_notification_delay_ms(),
            queue_idle_timeout_secs: default_queue_idle_timeout_secs(),
            storage: StorageConfig::default(),
            library: LibraryConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the data directory, falling back to defaults
    pub fn load() -> Self {
        let config_path = default_data_dir().join("config.yaml");

        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %config_path.display(), "Failed to load config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Interval enforced between indicator updates
    pub fn notification_delay(&self) -> Duration {
        Duration::from_millis(self.notification_delay_ms)
    }

    /// Idle period after which the queue worker exits
    pub fn queue_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_idle_timeout_secs)
    }

    /// Path of the lock file held while scanning is allowed to run
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join("scan.lock")
    }

    /// Ensure data directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        if let Some(parent) = self.storage.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
