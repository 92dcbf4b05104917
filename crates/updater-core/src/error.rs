//! Error types for updater-core

use std::path::PathBuf;

/// Result type for updater-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in updater-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure: DNS, connect, timeout or a non-2xx status
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// The downloaded payload could not be unpacked as a file tree
    #[error("Corrupt archive from {url}: {message}")]
    CorruptArchive { url: String, message: String },

    /// A remote entry would resolve outside the local tree
    #[error("Rejected path {path:?}: {reason}")]
    PathSecurity { path: String, reason: String },

    /// A file could not be read while fingerprinting
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be replaced during apply
    #[error("Failed to write {path} after {applied} file(s) were applied: {source}")]
    Write {
        path: String,
        applied: usize,
        #[source]
        source: updater_fs::Error,
    },

    /// The cycle was cancelled before it changed anything
    #[error("Synchronization cancelled")]
    Cancelled,

    /// Another cycle is in flight for the same tree
    #[error("A synchronization is already running for {root}")]
    AlreadyRunning { root: PathBuf },

    /// Invalid or missing updater settings
    #[error("Invalid updater configuration: {message}")]
    Config { message: String },

    /// A source reference that cannot be resolved
    #[error("Invalid source reference {input:?}: {reason}")]
    InvalidSource { input: String, reason: String },

    /// A background task panicked or was aborted
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Filesystem error from updater-fs
    #[error(transparent)]
    Fs(updater_fs::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Fs(updater_fs::Error::io(path, source))
    }
}

impl From<updater_fs::Error> for Error {
    fn from(err: updater_fs::Error) -> Self {
        match err {
            updater_fs::Error::PathTraversal { path, reason } => Self::PathSecurity {
                path,
                reason: reason.to_string(),
            },
            updater_fs::Error::Locked { root, .. } => Self::AlreadyRunning { root },
            other => Self::Fs(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_becomes_path_security() {
        let fs_err = updater_fs::RelativePath::parse("../../etc/passwd").unwrap_err();
        let err = Error::from(fs_err);
        assert!(matches!(err, Error::PathSecurity { .. }));
        assert!(err.to_string().contains("../../etc/passwd"));
    }

    #[test]
    fn lock_contention_becomes_already_running() {
        let err = Error::from(updater_fs::Error::Locked {
            root: PathBuf::from("/opt/launcher"),
            lock: PathBuf::from("/tmp/x.lock"),
        });
        assert!(matches!(err, Error::AlreadyRunning { .. }));
    }

    #[test]
    fn write_error_reports_partial_count() {
        let err = Error::Write {
            path: "mods/c.jar".into(),
            applied: 2,
            source: updater_fs::Error::io(
                "/opt/launcher/mods/c.jar",
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ),
        };
        let display = err.to_string();
        assert!(display.contains("mods/c.jar"), "got: {display}");
        assert!(display.contains("2 file(s)"), "got: {display}");
    }
}
