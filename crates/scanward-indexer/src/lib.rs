//! Scanward Indexer
//!
//! Reference media library used by the daemon:
//! - Media file walking with banned-folder filtering
//! - Background metadata probing with pause support
//! - JSON database persistence

mod database;
mod error;
mod library;
mod parser;
pub mod walker;

pub use database::{DeviceRecord, MediaDatabase, MediaKind, MediaRecord, ParseState, DATABASE_VERSION};
pub use error::IndexerError;
pub use library::{entry_path, FsLibrary, LibraryOptions, ScanStats};
pub use parser::{probe, MediaMetadata};
pub use walker::{FileEntry, WalkOutput, Walker};
