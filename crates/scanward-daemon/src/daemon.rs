//! Wiring for one daemon process: library, coordinator, socket and signals.

use anyhow::{Context, Result};
use scanward_core::{Coordinator, DaemonConfig, LifecycleBus, SessionDeps};
use scanward_indexer::{FsLibrary, LibraryOptions};
use scanward_ipc::IpcServer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::handler::DaemonHandler;
use crate::host::{self, IndicatorSlot, LockFile, PendingDevices};
use crate::signals;

/// How long a stopped session gets to release its lock and indicator
const SESSION_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Daemon {
    config: DaemonConfig,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Result<Self> {
        config
            .ensure_dirs()
            .context("Cannot prepare the data directory")?;

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            shutdown_tx,
            started_at: Instant::now(),
        })
    }

    /// Serve until a shutdown request or signal arrives, then stop the live
    /// scan and remove the socket and PID file.
    pub async fn run(&self) -> Result<()> {
        let _pid_file = PidFile::claim(&self.config.pid_file)?;

        tracing::info!(
            socket = %self.config.socket_path.display(),
            database = %self.config.storage.database_path.display(),
            "Scanward daemon starting"
        );

        let library = Arc::new(FsLibrary::new(LibraryOptions::from_config(&self.config)));
        let indicator = Arc::new(IndicatorSlot::default());
        let devices = Arc::new(PendingDevices::default());
        let lifecycle = LifecycleBus::default();

        let coordinator = Coordinator::new(
            SessionDeps::new(
                library.clone(),
                Arc::new(LockFile::new(self.config.lock_file())),
                indicator.clone(),
                devices.clone(),
            )
            .with_config(&self.config)
            .with_lifecycle(lifecycle.clone()),
        );
        let lifecycle_logger = host::spawn_lifecycle_logger(&lifecycle);

        let server = IpcServer::new(
            &self.config.socket_path,
            Arc::new(DaemonHandler::new(
                coordinator.clone(),
                indicator,
                devices,
                self.shutdown_tx.clone(),
                self.started_at,
            )),
        )
        .await
        .context("Cannot bind the daemon socket")?;

        if self.config.auto_init {
            host::auto_init(&coordinator);
        }
        let power_signals = tokio::spawn(signals::forward_power_signals(coordinator.clone()));

        tokio::select! {
            served = server.run() => {
                if let Err(e) = served {
                    tracing::error!(error = %e, "Socket server stopped");
                }
            }
            _ = signals::wait_for_shutdown(self.shutdown_tx.subscribe()) => {
                tracing::info!("Shutting down");
            }
        }

        power_signals.abort();
        stop_coordinator(&coordinator).await;
        library.shutdown();
        lifecycle_logger.abort();

        if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "Could not remove the daemon socket");
            }
        }
        tracing::info!("Scanward daemon stopped");

        Ok(())
    }
}

/// Single-instance guard; the file holds our PID and is removed on drop.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn claim(path: &Path) -> Result<Self> {
        if let Some(pid) = std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| contents.trim().parse::<u32>().ok())
        {
            if pid != std::process::id() && process_alive(pid) {
                anyhow::bail!("Scanward daemon already running with PID {}", pid);
            }
            tracing::debug!(pid, "Replacing PID file left by a dead daemon");
        }

        std::fs::write(path, std::process::id().to_string())
            .with_context(|| format!("Cannot write PID file {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Stop the live session and wait for it to release its resources.
async fn stop_coordinator(coordinator: &Coordinator) {
    let session = coordinator.current();
    coordinator.stop();

    if let Some(session) = session {
        if tokio::time::timeout(SESSION_STOP_TIMEOUT, session.ended())
            .await
            .is_err()
        {
            tracing::warn!(id = %session.id(), "Scan session did not stop in time");
        }
    }
}

fn process_alive(pid: u32) -> bool {
    // signal 0 probes without delivering anything
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(root: &Path) -> DaemonConfig {
        let mut config = DaemonConfig {
            socket_path: root.join("daemon.sock"),
            data_dir: root.join("data"),
            pid_file: root.join("daemon.pid"),
            auto_init: false,
            ..Default::default()
        };
        config.storage.database_path = root.join("data/media.db.json");
        config
    }

    #[test]
    fn test_process_alive() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(999_999_999));
    }

    #[test]
    fn test_pid_file_rejects_live_process() {
        let temp_dir = tempdir().unwrap();
        let pid_path = temp_dir.path().join("daemon.pid");
        // our parent (the test harness) is alive and is not us
        std::fs::write(&pid_path, std::os::unix::process::parent_id().to_string()).unwrap();

        let err = PidFile::claim(&pid_path).err().unwrap();
        assert!(err.to_string().contains("already running"));
        assert!(pid_path.exists());
    }

    #[test]
    fn test_pid_file_replaces_stale_file_and_cleans_up() {
        let temp_dir = tempdir().unwrap();
        let pid_path = temp_dir.path().join("daemon.pid");
        std::fs::write(&pid_path, "999999999").unwrap();

        {
            let _guard = PidFile::claim(&pid_path).unwrap();
            let pid = std::fs::read_to_string(&pid_path).unwrap();
            assert_eq!(pid, std::process::id().to_string());
        }
        assert!(!pid_path.exists());
    }

    #[test]
    fn test_new_creates_data_dir() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path());
        Daemon::new(config.clone()).unwrap();
        assert!(config.data_dir.exists());
    }

    #[tokio::test]
    async fn test_stop_coordinator_releases_lock() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path());
        config.ensure_dirs().unwrap();

        let library = Arc::new(FsLibrary::new(LibraryOptions::from_config(&config)));
        let deps = SessionDeps::new(
            library,
            Arc::new(LockFile::new(config.lock_file())),
            Arc::new(IndicatorSlot::default()),
            Arc::new(PendingDevices::default()),
        )
        .with_config(&config);
        let coordinator = Coordinator::new(deps);

        host::auto_init(&coordinator);
        assert!(config.lock_file().exists());

        stop_coordinator(&coordinator).await;
        assert!(!config.lock_file().exists());
        assert!(coordinator.current().is_none());
    }
}
