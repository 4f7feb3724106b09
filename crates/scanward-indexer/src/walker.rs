//! Media file walker.

use crate::IndexerError;
use ignore::{WalkBuilder, WalkState};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::debug;

/// A discovered media file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified time (Unix timestamp)
    pub mtime: u64,
}

/// Result of walking one entry point.
#[derive(Debug, Default)]
pub struct WalkOutput {
    /// Media files, sorted by path
    pub files: Vec<FileEntry>,
    /// Directories visited, sorted by path
    pub directories: Vec<PathBuf>,
}

enum Walked {
    File(FileEntry),
    Dir(PathBuf),
}

/// Walks an entry point, keeping media files outside banned folders.
pub struct Walker {
    root: PathBuf,
    follow_symlinks: bool,
    extensions: HashSet<String>,
    banned: Vec<PathBuf>,
}

impl Walker {
    pub fn new(root: &Path, follow_symlinks: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            follow_symlinks,
            extensions: HashSet::new(),
            banned: Vec::new(),
        }
    }

    /// Only keep files with these extensions (case-insensitive, no dot).
    /// An empty set keeps every file.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Skip everything under these folders.
    pub fn banned<I>(mut self, banned: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.banned = banned.into_iter().collect();
        self
    }

    fn keeps_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    pub fn walk(&self) -> Result<WalkOutput, IndexerError> {
        if !self.root.exists() {
            return Err(IndexerError::NotFound(self.root.clone()));
        }
        if is_banned(&self.root, &self.banned) {
            debug!(root = %self.root.display(), "Entry point is banned");
            return Ok(WalkOutput::default());
        }

        let (tx, rx) = mpsc::channel();
        let banned = self.banned.clone();

        let walker = WalkBuilder::new(&self.root)
            .follow_links(self.follow_symlinks)
            .hidden(true)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(true)
            .parents(false)
            .filter_entry(move |entry| !is_banned(entry.path(), &banned))
            .build_parallel();

        walker.run(|| {
            let tx = tx.clone();
            Box::new(move |result| {
                match result {
                    Ok(entry) => match entry.file_type() {
                        Some(ft) if ft.is_dir() => {
                            let _ = tx.send(Walked::Dir(entry.path().to_path_buf()));
                        }
                        Some(ft) if ft.is_file() && self.keeps_extension(entry.path()) => {
                            if let Ok(metadata) = entry.metadata() {
                                let mtime = metadata
                                    .modified()
                                    .ok()
                                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                                    .map(|d| d.as_secs())
                                    .unwrap_or(0);

                                let _ = tx.send(Walked::File(FileEntry {
                                    path: entry.path().to_path_buf(),
                                    size: metadata.len(),
                                    mtime,
                                }));
                            }
                        }
                        _ => {}
                    },
                    Err(e) => {
                        debug!(error = %e, "Walk error");
                    }
                }
                WalkState::Continue
            })
        });

        drop(tx);

        let mut output = WalkOutput::default();
        for walked in rx {
            match walked {
                Walked::File(entry) => output.files.push(entry),
                Walked::Dir(dir) => output.directories.push(dir),
            }
        }

        output.files.sort_by(|a, b| a.path.cmp(&b.path));
        output.directories.sort();

        Ok(output)
    }
}

/// Whether `path` is, or lies under, one of the banned folders.
pub fn is_banned(path: &Path, banned: &[PathBuf]) -> bool {
    banned.iter().any(|folder| path.starts_with(folder))
}
