//! Filesystem media library implementing [`MediaEngine`].
//!
//! Discovery and reloads run on the caller's thread (the coordinator's task
//! queue worker). Parsing runs on a dedicated thread started by `start()`
//! that honours the pause switch between files.

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, trace, warn};

use scanward_core::{CallbackId, DaemonConfig, EngineCallbacks, MediaEngine};

use crate::database::{DeviceRecord, MediaDatabase, MediaRecord, ParseState};
use crate::parser::probe;
use crate::walker::Walker;
use crate::IndexerError;

/// Library settings.
#[derive(Debug, Clone)]
pub struct LibraryOptions {
    pub database_path: PathBuf,
    /// Subfolders the coordinator bans under new storage roots
    pub blacklist: Vec<String>,
    pub media_extensions: Vec<String>,
    pub follow_symlinks: bool,
}

impl LibraryOptions {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            database_path: config.storage.database_path.clone(),
            blacklist: config.library.blacklist.clone(),
            media_extensions: config.library.media_extensions.clone(),
            follow_symlinks: config.library.follow_symlinks,
        }
    }
}

/// Counts from one walk of an entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub found: usize,
    pub queued: usize,
    pub removed: usize,
}

#[derive(Default)]
struct ParseQueue {
    pending: VecDeque<String>,
    queued: HashSet<String>,
    total: usize,
    done: usize,
    busy: bool,
}

struct LibraryInner {
    options: LibraryOptions,
    db: Mutex<MediaDatabase>,
    initiated: AtomicBool,
    paused: AtomicBool,
    shutdown: AtomicBool,
    active_ops: AtomicUsize,
    callbacks: RwLock<Vec<(CallbackId, Arc<dyn EngineCallbacks>)>>,
    next_callback: AtomicU64,
    parse: Mutex<ParseQueue>,
    parse_signal: Condvar,
}

/// Marks a discovery/reload as running for `is_working`.
struct OpGuard<'a>(&'a AtomicUsize);

impl<'a> OpGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Entry point string to a filesystem path.
pub fn entry_path(entry_point: &str) -> PathBuf {
    PathBuf::from(entry_point.strip_prefix("file://").unwrap_or(entry_point))
}

impl LibraryInner {
    fn emit(&self, f: impl Fn(&dyn EngineCallbacks)) {
        let callbacks: Vec<_> = self.callbacks.read().iter().map(|(_, cb)| cb.clone()).collect();
        for cb in callbacks {
            f(cb.as_ref());
        }
    }

    fn persist(&self) {
        let db = self.db.lock();
        if let Err(e) = db.save(&self.options.database_path) {
            warn!(error = %e, "Failed to persist media database");
        }
    }

    fn enqueue_parse(&self, paths: Vec<String>) {
        if paths.is_empty() {
            return;
        }
        let mut queue = self.parse.lock();
        for path in paths {
            if queue.queued.insert(path.clone()) {
                queue.pending.push_back(path);
                queue.total += 1;
            }
        }
        self.parse_signal.notify_all();
    }

    fn parse_backlog(&self) -> bool {
        let queue = self.parse.lock();
        !queue.pending.is_empty() || queue.busy
    }

    /// Walk `entry_point`, add new or changed media and drop vanished files.
    fn scan(&self, entry_point: &str) -> Result<ScanStats, IndexerError> {
        let root = entry_path(entry_point);
        let banned = self.db.lock().banned_paths();

        let output = Walker::new(&root, self.options.follow_symlinks)
            .extensions(&self.options.media_extensions)
            .banned(banned)
            .walk()?;

        for dir in &output.directories {
            let dir = dir.display().to_string();
            self.emit(|cb| cb.on_discovery_progress(&dir));
        }

        let mut stats = ScanStats {
            found: output.files.len(),
            ..Default::default()
        };
        let mut to_parse = Vec::new();
        {
            let mut db = self.db.lock();
            db.entry_points.insert(root.display().to_string());

            let mut seen = HashSet::with_capacity(output.files.len());
            for file in output.files {
                let key = file.path.display().to_string();
                seen.insert(key.clone());

                let unchanged = db
                    .media
                    .get(&key)
                    .map(|m| m.size == file.size && m.mtime == file.mtime && m.state != ParseState::Pending)
                    .unwrap_or(false);
                if unchanged {
                    continue;
                }
                db.media.insert(key.clone(), MediaRecord::pending(file.size, file.mtime));
                to_parse.push(key);
            }

            let before = db.media.len();
            db.media
                .retain(|path, _| !Path::new(path).starts_with(&root) || seen.contains(path));
            stats.removed = before - db.media.len();

            if let Err(e) = db.save(&self.options.database_path) {
                warn!(error = %e, "Failed to persist media database");
            }
        }

        stats.queued = to_parse.len();
        self.enqueue_parse(to_parse);
        Ok(stats)
    }

    fn scan_logged(&self, entry_point: &str) {
        match self.scan(entry_point) {
            Ok(stats) => info!(
                entry_point,
                found = stats.found,
                queued = stats.queued,
                removed = stats.removed,
                "Entry point scanned"
            ),
            Err(e) => warn!(entry_point, error = %e, "Failed to scan entry point"),
        }
    }

    fn parse_one(&self, path: &str) {
        let still_pending = self
            .db
            .lock()
            .media
            .get(path)
            .map(|m| m.state == ParseState::Pending)
            .unwrap_or(false);
        if !still_pending {
            trace!(path, "Skipping media no longer pending");
            return;
        }

        let result = probe(Path::new(path));

        let mut db = self.db.lock();
        let Some(record) = db.media.get_mut(path) else {
            return;
        };
        match result {
            Ok(meta) => {
                record.title = Some(meta.title);
                record.kind = meta.kind;
                record.size = meta.size;
                record.state = ParseState::Parsed;
                record.parsed_at = Some(chrono::Utc::now());
            }
            Err(e) => {
                debug!(path, error = %e, "Media parsing failed");
                record.state = ParseState::Failed;
            }
        }
    }
}

fn parser_loop(inner: Arc<LibraryInner>) {
    debug!("Parser thread started");
    loop {
        let path = {
            let mut queue = inner.parse.lock();
            loop {
                if inner.shutdown.load(Ordering::SeqCst) {
                    debug!("Parser thread exiting");
                    return;
                }
                if !inner.paused.load(Ordering::SeqCst) {
                    if let Some(path) = queue.pending.pop_front() {
                        queue.queued.remove(&path);
                        queue.busy = true;
                        break path;
                    }
                }
                inner.parse_signal.wait(&mut queue);
            }
        };

        inner.parse_one(&path);

        let (percent, drained) = {
            let mut queue = inner.parse.lock();
            queue.done += 1;
            if queue.pending.is_empty() {
                queue.busy = false;
                queue.total = 0;
                queue.done = 0;
                (100, true)
            } else {
                let percent = (queue.done * 100 / queue.total.max(1)).min(99);
                (percent as u8, false)
            }
        };

        if drained {
            inner.persist();
            info!("Parsing finished");
        }
        inner.emit(|cb| cb.on_parsing_stats_updated(percent));
    }
}

/// Reference media library over the local filesystem.
pub struct FsLibrary {
    inner: Arc<LibraryInner>,
    parser: Mutex<Option<JoinHandle<()>>>,
}

impl FsLibrary {
    pub fn new(options: LibraryOptions) -> Self {
        Self {
            inner: Arc::new(LibraryInner {
                options,
                db: Mutex::new(MediaDatabase::default()),
                initiated: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                active_ops: AtomicUsize::new(0),
                callbacks: RwLock::new(Vec::new()),
                next_callback: AtomicU64::new(1),
                parse: Mutex::new(ParseQueue::default()),
                parse_signal: Condvar::new(),
            }),
            parser: Mutex::new(None),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.inner.options.database_path
    }

    /// Copy of the in-memory database.
    pub fn snapshot(&self) -> MediaDatabase {
        self.inner.db.lock().clone()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Stop the parser thread and persist the database.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        {
            let _queue = self.inner.parse.lock();
            self.inner.parse_signal.notify_all();
        }
        if let Some(handle) = self.parser.lock().take() {
            if handle.join().is_err() {
                warn!("Parser thread panicked");
            }
        }
        if self.inner.initiated.load(Ordering::SeqCst) {
            self.inner.persist();
        }
    }

    fn reload_entry_points(&self, entry_points: Vec<String>) {
        let _op = OpGuard::enter(&self.inner.active_ops);
        for entry_point in entry_points {
            self.inner.scan_logged(&entry_point);
        }
    }
}

impl Drop for FsLibrary {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl MediaEngine for FsLibrary {
    fn setup(&self) {
        if let Some(dir) = self.inner.options.database_path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to create library directory");
            }
        }
    }

    fn init(&self) -> bool {
        if self.inner.initiated.load(Ordering::SeqCst) {
            return true;
        }

        let path = &self.inner.options.database_path;
        let db = match MediaDatabase::load_or_default(path) {
            Ok(db) => db,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open media database");
                return false;
            }
        };
        if let Err(e) = db.save(path) {
            warn!(path = %path.display(), error = %e, "Media database is not writable");
            return false;
        }

        info!(
            path = %path.display(),
            media = db.media.len(),
            devices = db.devices.len(),
            "Media library opened"
        );
        *self.inner.db.lock() = db;
        self.inner.initiated.store(true, Ordering::SeqCst);
        true
    }

    fn start(&self) {
        if !self.is_initiated() {
            warn!("Library started before init");
            return;
        }

        let mut parser = self.parser.lock();
        if parser.is_none() {
            let inner = self.inner.clone();
            match std::thread::Builder::new()
                .name("scanward-parser".to_string())
                .spawn(move || parser_loop(inner))
            {
                Ok(handle) => *parser = Some(handle),
                Err(e) => warn!(error = %e, "Failed to spawn parser thread"),
            }
        }
        drop(parser);

        let pending = self.inner.db.lock().paths_in(ParseState::Pending);
        self.inner.enqueue_parse(pending);
    }

    fn is_initiated(&self) -> bool {
        self.inner.initiated.load(Ordering::SeqCst)
    }

    fn is_working(&self) -> bool {
        if self.is_paused() {
            return false;
        }
        self.inner.active_ops.load(Ordering::SeqCst) > 0 || self.inner.parse_backlog()
    }

    fn discover(&self, entry_point: &str) {
        if !self.is_initiated() {
            warn!(entry_point, "Discover before init ignored");
            return;
        }

        self.inner.emit(|cb| cb.on_discovery_started(entry_point));
        {
            let _op = OpGuard::enter(&self.inner.active_ops);
            self.inner.scan_logged(entry_point);
        }
        self.inner.emit(|cb| cb.on_discovery_completed(entry_point));
    }

    fn reload(&self) {
        if !self.is_initiated() {
            return;
        }
        self.inner.emit(|cb| cb.on_reload_started(None));
        let entry_points = self.inner.db.lock().entry_points.iter().cloned().collect();
        self.reload_entry_points(entry_points);
        self.inner.emit(|cb| cb.on_reload_completed(None));
    }

    fn reload_path(&self, entry_point: &str) {
        if !self.is_initiated() {
            return;
        }
        self.inner.emit(|cb| cb.on_reload_started(Some(entry_point)));
        self.reload_entry_points(vec![entry_point.to_string()]);
        self.inner.emit(|cb| cb.on_reload_completed(Some(entry_point)));
    }

    fn ban_folder(&self, path: &str) {
        let folder = entry_path(path);
        let mut db = self.inner.db.lock();
        if !db.banned.insert(folder.display().to_string()) {
            return;
        }
        let removed = db.remove_under(&folder);
        debug!(folder = %folder.display(), removed, "Folder banned");
        if let Err(e) = db.save(&self.inner.options.database_path) {
            warn!(error = %e, "Failed to persist media database");
        }
    }

    fn add_device(&self, id: &str, path: &str, removable: bool) -> bool {
        let record = DeviceRecord {
            path: path.to_string(),
            removable,
        };
        let mut db = self.inner.db.lock();
        let previous = db.devices.insert(id.to_string(), record.clone());
        let is_new = previous.is_none();

        if previous.as_ref() != Some(&record) {
            if let Err(e) = db.save(&self.inner.options.database_path) {
                warn!(error = %e, "Failed to persist media database");
            }
        }
        is_new
    }

    fn devices(&self) -> Vec<String> {
        self.inner
            .db
            .lock()
            .devices
            .values()
            .map(|d| d.path.clone())
            .collect()
    }

    fn pause_background_operations(&self) {
        if !self.inner.paused.swap(true, Ordering::SeqCst) {
            info!("Background parsing paused");
        }
    }

    fn resume_background_operations(&self) {
        if self.inner.paused.swap(false, Ordering::SeqCst) {
            info!("Background parsing resumed");
        }
        let _queue = self.inner.parse.lock();
        self.inner.parse_signal.notify_all();
    }

    fn force_parser_retry(&self) {
        let retry = {
            let mut db = self.inner.db.lock();
            let mut retry = Vec::new();
            for (path, record) in db.media.iter_mut() {
                if record.state == ParseState::Failed {
                    record.state = ParseState::Pending;
                    record.retries += 1;
                    retry.push(path.clone());
                }
            }
            retry
        };
        info!(count = retry.len(), "Retrying failed media");
        self.inner.enqueue_parse(retry);
    }

    fn blacklist(&self) -> Vec<String> {
        self.inner.options.blacklist.clone()
    }

    fn add_callbacks(&self, callbacks: Arc<dyn EngineCallbacks>) -> CallbackId {
        let id = CallbackId(self.inner.next_callback.fetch_add(1, Ordering::SeqCst));
        self.inner.callbacks.write().push((id, callbacks));
        id
    }

    fn remove_callbacks(&self, id: CallbackId) {
        self.inner.callbacks.write().retain(|(cb_id, _)| *cb_id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_path() {
        assert_eq!(entry_path("file:///music"), PathBuf::from("/music"));
        assert_eq!(entry_path("/music"), PathBuf::from("/music"));
    }

    #[test]
    fn test_op_guard_counts() {
        let counter = AtomicUsize::new(0);
        {
            let _a = OpGuard::enter(&counter);
            let _b = OpGuard::enter(&counter);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
