//! Lightweight metadata probe for media files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::database::MediaKind;
use crate::IndexerError;

/// Metadata extracted from a media file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMetadata {
    pub title: String,
    pub kind: MediaKind,
    pub size: u64,
}

/// Probe `path`: the file must exist and hold at least one byte.
pub fn probe(path: &Path) -> Result<MediaMetadata, IndexerError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IndexerError::NotFound(path.to_path_buf()),
        _ => IndexerError::Io(e),
    })?;

    let size = file.metadata()?.len();
    let mut header = [0u8; 4];
    let read = file.read(&mut header)?;
    if read == 0 {
        return Err(IndexerError::Parse {
            path: path.to_path_buf(),
            message: "empty media file".to_string(),
        });
    }

    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default();

    Ok(MediaMetadata {
        title,
        kind: MediaKind::from_path(path),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_probe_reads_title_and_kind() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("Blue_in_Green.flac");
        std::fs::write(&path, b"fLaC....").unwrap();

        let meta = probe(&path).unwrap();
        assert_eq!(meta.title, "Blue in Green");
        assert_eq!(meta.kind, MediaKind::Audio);
        assert_eq!(meta.size, 8);
    }

    #[test]
    fn test_probe_empty_file_fails() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("broken.mp3");
        std::fs::write(&path, b"").unwrap();

        assert!(matches!(probe(&path), Err(IndexerError::Parse { .. })));
    }

    #[test]
    fn test_probe_missing_file() {
        let temp_dir = tempdir().unwrap();
        let result = probe(&temp_dir.path().join("gone.mp3"));
        assert!(matches!(result, Err(IndexerError::NotFound(_))));
    }
}
