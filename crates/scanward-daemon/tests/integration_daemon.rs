//! Integration tests for the coordinator driving the filesystem library,
//! wired the way the daemon wires them.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::time::timeout;

use scanward_core::{
    Coordinator, CoreError, DaemonConfig, DevicePrompter, Dispatch, LifecycleBus,
    LifecycleSignal, NewDevice, ProgressIndicator, ResourceLock, ScanCommand, SessionDeps,
    StatusSink,
};
use scanward_indexer::{FsLibrary, LibraryOptions, MediaDatabase, ParseState};

#[derive(Default)]
struct FlagLock {
    held: AtomicBool,
}

impl ResourceLock for FlagLock {
    fn acquire(&self) -> Result<(), CoreError> {
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) -> Result<(), CoreError> {
        self.held.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    published: Mutex<Vec<ProgressIndicator>>,
    withdrawn: AtomicBool,
}

impl RecordingSink {
    fn bodies(&self) -> Vec<String> {
        self.published.lock().iter().map(|i| i.body.clone()).collect()
    }
}

impl StatusSink for RecordingSink {
    fn publish(&self, indicator: &ProgressIndicator) -> Result<(), CoreError> {
        self.published.lock().push(indicator.clone());
        Ok(())
    }

    fn withdraw(&self, _id: u32) {
        self.withdrawn.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingPrompter {
    prompts: Mutex<Vec<NewDevice>>,
}

impl DevicePrompter for RecordingPrompter {
    fn prompt_new_device(&self, device: &NewDevice) {
        self.prompts.lock().push(device.clone());
    }
}

struct Host {
    coordinator: Arc<Coordinator>,
    library: Arc<FsLibrary>,
    lock: Arc<FlagLock>,
    sink: Arc<RecordingSink>,
    prompter: Arc<RecordingPrompter>,
    lifecycle: LifecycleBus,
}

/// Helper to create a test config rooted in a temp dir
fn test_config(root: &Path, media_directories: Vec<String>) -> DaemonConfig {
    let mut config = DaemonConfig {
        data_dir: root.join("data"),
        auto_init: false,
        notification_delay_ms: 50,
        queue_idle_timeout_secs: 1,
        ..Default::default()
    };
    config.storage.default_root = root.join("home").display().to_string();
    config.storage.external_roots = vec![root.join("usb1").display().to_string()];
    config.storage.media_directories = media_directories;
    config.storage.database_path = root.join("data/media.db.json");
    config.library.blacklist = vec!["/.cache".to_string()];
    config.library.media_extensions = vec!["mp3".to_string(), "mkv".to_string()];
    config
}

fn start_host(config: &DaemonConfig) -> Host {
    config.ensure_dirs().unwrap();

    let library = Arc::new(FsLibrary::new(LibraryOptions::from_config(config)));
    let lock = Arc::new(FlagLock::default());
    let sink = Arc::new(RecordingSink::default());
    let prompter = Arc::new(RecordingPrompter::default());
    let lifecycle = LifecycleBus::default();

    let deps = SessionDeps::new(library.clone(), lock.clone(), sink.clone(), prompter.clone())
        .with_config(config)
        .with_lifecycle(lifecycle.clone());

    Host {
        coordinator: Coordinator::new(deps),
        library,
        lock,
        sink,
        prompter,
        lifecycle,
    }
}

fn create_collection(root: &Path) {
    std::fs::create_dir_all(root.join("Albums/Blue Train")).unwrap();
    std::fs::write(root.join("Albums/Blue Train/Moment_s_Notice.mp3"), b"ID3....").unwrap();
    std::fs::write(root.join("Albums/Blue Train/Locomotion.mp3"), b"ID3....").unwrap();
    std::fs::write(root.join("film.mkv"), b"\x1a\x45\xdf\xa3").unwrap();
}

/// Wait until the live session reports it has ended, returning every signal seen
async fn wait_for_session_end(
    rx: &mut tokio::sync::broadcast::Receiver<LifecycleSignal>,
) -> Vec<LifecycleSignal> {
    let mut seen = Vec::new();
    timeout(Duration::from_secs(10), async {
        loop {
            let signal = rx.recv().await.unwrap();
            seen.push(signal);
            if signal == LifecycleSignal::SessionEnded {
                break;
            }
        }
    })
    .await
    .expect("session did not end");
    seen
}

/// First run: bootstrap registers devices, discovers media directories and
/// the session ends once parsing drains
#[tokio::test]
async fn test_first_run_scans_and_ends() {
    let temp_dir = tempdir().unwrap();
    let media = temp_dir.path().join("home/Music");
    create_collection(&media);

    let config = test_config(temp_dir.path(), vec![media.display().to_string()]);
    let host = start_host(&config);
    let mut rx = host.lifecycle.subscribe();

    let dispatch = host
        .coordinator
        .handle(ScanCommand::Init { upgrade: false })
        .unwrap();
    assert_eq!(dispatch, Dispatch::Started);
    assert!(host.lock.held.load(Ordering::SeqCst));

    let signals = wait_for_session_end(&mut rx).await;
    assert!(signals.contains(&LifecycleSignal::LibraryReady));

    assert!(!host.lock.held.load(Ordering::SeqCst));
    assert!(host.sink.withdrawn.load(Ordering::SeqCst));
    assert!(host.coordinator.current().is_none());

    // the removable root is new and gets a prompt; the main root never does
    let prompts = host.prompter.prompts.lock().clone();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].id, "usb1");

    let db = host.library.snapshot();
    assert_eq!(db.count(ParseState::Parsed), 3);
    assert_eq!(db.devices.len(), 2);
    assert!(MediaDatabase::load(&config.storage.database_path).is_ok());
    // blacklist applied under the main root on first run
    assert!(db
        .banned
        .contains(&temp_dir.path().join("home/.cache").display().to_string()));
}

/// A restart against an existing database reloads and drops vanished media
#[tokio::test]
async fn test_restart_reloads_existing_library() {
    let temp_dir = tempdir().unwrap();
    let media = temp_dir.path().join("home/Music");
    create_collection(&media);

    {
        let config = test_config(temp_dir.path(), vec![media.display().to_string()]);
        let host = start_host(&config);
        let mut rx = host.lifecycle.subscribe();
        host.coordinator
            .handle(ScanCommand::Init { upgrade: false })
            .unwrap();
        wait_for_session_end(&mut rx).await;
        host.library.shutdown();
    }

    std::fs::remove_file(media.join("film.mkv")).unwrap();

    let config = test_config(temp_dir.path(), vec![]);
    let host = start_host(&config);
    let mut rx = host.lifecycle.subscribe();
    host.coordinator
        .handle(ScanCommand::Init { upgrade: false })
        .unwrap();
    wait_for_session_end(&mut rx).await;

    // known devices are not new anymore
    assert!(host.prompter.prompts.lock().is_empty());

    let db = host.library.snapshot();
    assert_eq!(db.media.len(), 2);
    assert_eq!(db.count(ParseState::Parsed), 2);
}

/// A newly attached device gets the blacklist before it is discovered
#[tokio::test]
async fn test_discover_device_applies_blacklist() {
    let temp_dir = tempdir().unwrap();
    let usb = temp_dir.path().join("usb1");
    std::fs::create_dir_all(usb.join(".cache")).unwrap();
    std::fs::write(usb.join(".cache/thumb.mp3"), b"ID3").unwrap();
    std::fs::write(usb.join("track.mp3"), b"ID3").unwrap();

    let config = test_config(temp_dir.path(), vec![]);
    let host = start_host(&config);
    let mut rx = host.lifecycle.subscribe();

    host.coordinator
        .handle(ScanCommand::Init { upgrade: false })
        .unwrap();
    let dispatch = host
        .coordinator
        .handle(ScanCommand::DiscoverDevice {
            path: usb.display().to_string(),
        })
        .unwrap();
    assert_eq!(dispatch, Dispatch::Delivered);

    wait_for_session_end(&mut rx).await;

    // discovery chatter never names the banned folder
    assert!(host.sink.bodies().iter().all(|body| !body.contains(".cache")));

    let db = host.library.snapshot();
    assert_eq!(db.media.len(), 1);
    assert!(db
        .media
        .contains_key(&usb.join("track.mp3").display().to_string()));
    assert!(db.banned.contains(&usb.join(".cache").display().to_string()));
}

/// Pause gives the lock back and resume takes it again, on the same session
#[tokio::test]
async fn test_pause_resume_toggles_lock() {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path(), vec![]);
    let host = start_host(&config);

    assert_eq!(
        host.coordinator.handle(ScanCommand::Pause).unwrap(),
        Dispatch::NoSession
    );

    host.coordinator
        .handle(ScanCommand::Init { upgrade: false })
        .unwrap();
    let session = host.coordinator.current().unwrap();

    host.coordinator.handle(ScanCommand::Pause).unwrap();
    let snapshot = session.inspect().await.unwrap();
    assert!(!snapshot.lock_held);
    assert!(!host.lock.held.load(Ordering::SeqCst));

    host.coordinator.handle(ScanCommand::Resume).unwrap();
    let snapshot = session.inspect().await.unwrap();
    assert!(snapshot.lock_held);
    assert!(host.lock.held.load(Ordering::SeqCst));
    assert_eq!(host.coordinator.current().unwrap().id(), session.id());

    host.coordinator.stop();
    timeout(Duration::from_secs(5), session.ended()).await.unwrap();
    assert!(!host.lock.held.load(Ordering::SeqCst));
}
