//! JSON media database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::IndexerError;

/// Current on-disk format version.
pub const DATABASE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub path: String,
    pub removable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseState {
    Pending,
    Parsed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
    Unknown,
}

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "opus", "m4a", "wav", "aac", "wma"];
const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "webm", "mov", "m4v", "ts"];

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Audio
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Unknown
        }
    }
}

/// One media file known to the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub size: u64,
    pub mtime: u64,
    pub state: ParseState,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "unknown_kind")]
    pub kind: MediaKind,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub parsed_at: Option<DateTime<Utc>>,
}

fn unknown_kind() -> MediaKind {
    MediaKind::Unknown
}

impl MediaRecord {
    pub fn pending(size: u64, mtime: u64) -> Self {
        Self {
            size,
            mtime,
            state: ParseState::Pending,
            title: None,
            kind: MediaKind::Unknown,
            retries: 0,
            parsed_at: None,
        }
    }
}

/// Persistent library state: devices, entry points, bans and media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDatabase {
    pub version: u32,
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceRecord>,
    #[serde(default)]
    pub entry_points: BTreeSet<String>,
    #[serde(default)]
    pub banned: BTreeSet<String>,
    /// Keyed by absolute file path
    #[serde(default)]
    pub media: BTreeMap<String, MediaRecord>,
}

impl Default for MediaDatabase {
    fn default() -> Self {
        Self {
            version: DATABASE_VERSION,
            devices: BTreeMap::new(),
            entry_points: BTreeSet::new(),
            banned: BTreeSet::new(),
            media: BTreeMap::new(),
        }
    }
}

impl MediaDatabase {
    pub fn load(path: &Path) -> Result<Self, IndexerError> {
        if !path.exists() {
            return Err(IndexerError::NotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        let db: MediaDatabase = serde_json::from_str(&json)?;
        if db.version > DATABASE_VERSION {
            return Err(IndexerError::Database(format!(
                "unsupported database version {}",
                db.version
            )));
        }
        debug!(path = %path.display(), media = db.media.len(), "Loaded media database");
        Ok(db)
    }

    /// Load `path`, or start empty when it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, IndexerError> {
        match Self::load(path) {
            Err(IndexerError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Atomic write: temp file, then rename.
    pub fn save(&self, path: &Path) -> Result<(), IndexerError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;

        let temp_path = temp_path(path);
        std::fs::write(&temp_path, &json)?;
        std::fs::rename(&temp_path, path)?;

        debug!(path = %path.display(), size = json.len(), "Saved media database");
        Ok(())
    }

    /// Banned folders as paths.
    pub fn banned_paths(&self) -> Vec<PathBuf> {
        self.banned.iter().map(PathBuf::from).collect()
    }

    /// Drop media under `folder`; returns how many were removed.
    pub fn remove_under(&mut self, folder: &Path) -> usize {
        let before = self.media.len();
        self.media.retain(|path, _| !Path::new(path).starts_with(folder));
        before - self.media.len()
    }

    pub fn count(&self, state: ParseState) -> usize {
        self.media.values().filter(|m| m.state == state).count()
    }

    /// Paths in the given parse state, in path order.
    pub fn paths_in(&self, state: ParseState) -> Vec<String> {
        self.media
            .iter()
            .filter(|(_, m)| m.state == state)
            .map(|(path, _)| path.clone())
            .collect()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "media.db".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_database() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("media.db.json");

        assert!(matches!(MediaDatabase::load(&path), Err(IndexerError::NotFound(_))));
        assert_eq!(MediaDatabase::load_or_default(&path).unwrap(), MediaDatabase::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested/media.db.json");

        let mut db = MediaDatabase::default();
        db.devices.insert(
            "usb1".into(),
            DeviceRecord {
                path: "/media/usb1".into(),
                removable: true,
            },
        );
        db.entry_points.insert("/media/usb1".into());
        db.media.insert("/media/usb1/a.mp3".into(), MediaRecord::pending(10, 1));
        db.save(&path).unwrap();

        assert!(!temp_dir.path().join("nested/.media.db.json.tmp").exists());
        assert_eq!(MediaDatabase::load(&path).unwrap(), db);
    }

    #[test]
    fn test_newer_version_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("media.db.json");
        std::fs::write(&path, r#"{"version": 99}"#).unwrap();

        assert!(matches!(MediaDatabase::load(&path), Err(IndexerError::Database(_))));
    }

    #[test]
    fn test_corrupt_database() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("media.db.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            MediaDatabase::load_or_default(&path),
            Err(IndexerError::Serialization(_))
        ));
    }

    #[test]
    fn test_remove_under() {
        let mut db = MediaDatabase::default();
        db.media.insert("/home/me/.cache/a.mp3".into(), MediaRecord::pending(1, 1));
        db.media.insert("/home/me/.cached.mp3".into(), MediaRecord::pending(1, 1));
        db.media.insert("/home/me/Music/b.mp3".into(), MediaRecord::pending(1, 1));

        assert_eq!(db.remove_under(Path::new("/home/me/.cache")), 1);
        assert_eq!(db.media.len(), 2);
    }

    #[test]
    fn test_media_kind() {
        assert_eq!(MediaKind::from_path(Path::new("/a/b.FLAC")), MediaKind::Audio);
        assert_eq!(MediaKind::from_path(Path::new("/a/b.mkv")), MediaKind::Video);
        assert_eq!(MediaKind::from_path(Path::new("/a/b")), MediaKind::Unknown);
    }
}
