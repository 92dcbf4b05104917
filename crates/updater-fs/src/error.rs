//! Error types for updater-fs

use std::path::PathBuf;

/// Result type for updater-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in updater-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A relative path that is absolute, empty, or would leave its root.
    #[error("Path {path:?} escapes the tree root: {reason}")]
    PathTraversal { path: String, reason: &'static str },

    #[error("Failed to parse {format} settings at {path}: {message}")]
    SettingsParse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Failed to serialize {format} settings for {path}: {message}")]
    SettingsSerialize {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported settings format: {extension}")]
    UnsupportedFormat { extension: String },

    /// Another synchronization cycle holds the lock for this tree.
    #[error("Tree {root} is locked by another synchronization (lock file {lock})")]
    Locked { root: PathBuf, lock: PathBuf },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
