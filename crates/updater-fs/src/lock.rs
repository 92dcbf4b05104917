//! Single-flight lock for an installation tree
//!
//! The lock file lives in the system temp directory and is keyed by the
//! fingerprint of the tree's canonical path, so holding the lock never
//! writes into the tree itself.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{Error, Fingerprint, Result};

/// An exclusive advisory lock on one installation tree.
///
/// Released when dropped.
#[derive(Debug)]
pub struct TreeLock {
    root: PathBuf,
    path: PathBuf,
    file: File,
}

impl TreeLock {
    /// Try to lock `root`, failing immediately with [`Error::Locked`] when
    /// another holder exists.
    pub fn try_acquire(root: &Path) -> Result<Self> {
        Self::try_acquire_in(root, &std::env::temp_dir())
    }

    /// Like [`TreeLock::try_acquire`], with the lock file placed in `lock_dir`.
    pub fn try_acquire_in(root: &Path, lock_dir: &Path) -> Result<Self> {
        let root = canonical_root(root);
        let path = lock_dir.join(lock_file_name(&root));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        if file.try_lock_exclusive().is_err() {
            return Err(Error::Locked { root, lock: path });
        }

        tracing::debug!(root = %root.display(), lock = %path.display(), "Acquired tree lock");
        Ok(Self { root, path, file })
    }

    /// The canonical tree root this lock guards.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the lock file.
    pub fn lock_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TreeLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), "Failed to release tree lock: {}", e);
        }
    }
}

/// Canonicalize when the root exists; a root that is yet to be created is
/// keyed by its absolute form.
fn canonical_root(root: &Path) -> PathBuf {
    dunce::canonicalize(root)
        .or_else(|_| std::path::absolute(root))
        .unwrap_or_else(|_| root.to_path_buf())
}

fn lock_file_name(root: &Path) -> String {
    let key = Fingerprint::of_bytes(root.to_string_lossy().as_bytes()).to_hex();
    format!("launcher-updater-{}.lock", &key[..16])
}
