//! Local-versus-remote change detection
//!
//! [`DigestComparator`] decides whether a local file must be replaced:
//!
//! 1. missing locally → changed
//! 2. sizes differ → changed, nothing is hashed
//! 3. otherwise the SHA-256 fingerprints decide
//!
//! Size only ever short-circuits the "definitely different" case; equal
//! sizes are always settled by hashing.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use updater_fs::Fingerprint;

use crate::snapshot::FileEntry;
use crate::{Error, Result};

/// Source of content fingerprints.
pub trait ContentHasher: Send + Sync {
    fn fingerprint(&self, path: &Path) -> io::Result<Fingerprint>;
}

/// Streams files through SHA-256.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn fingerprint(&self, path: &Path) -> io::Result<Fingerprint> {
        Fingerprint::of_file(path)
    }
}

/// Applies the three-tier change policy.
#[derive(Clone)]
pub struct DigestComparator {
    hasher: Arc<dyn ContentHasher>,
}

impl Default for DigestComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DigestComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestComparator").finish_non_exhaustive()
    }
}

impl DigestComparator {
    pub fn new() -> Self {
        Self::with_hasher(Arc::new(Sha256Hasher))
    }

    pub fn with_hasher(hasher: Arc<dyn ContentHasher>) -> Self {
        Self { hasher }
    }

    /// Whether `local` differs from `remote`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] when either side cannot be read once
    /// hashing is required.
    pub fn is_changed(&self, local: &Path, remote: &FileEntry) -> Result<bool> {
        let metadata = match fs::metadata(local) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => {
                return Err(Error::Read {
                    path: local.to_path_buf(),
                    source: e,
                });
            }
        };

        // A directory where the remote has a file can only be "changed";
        // the apply step reports the conflict.
        if !metadata.is_file() {
            return Ok(true);
        }

        if metadata.len() != remote.size() {
            return Ok(true);
        }

        let local_fingerprint = self.hasher.fingerprint(local).map_err(|e| Error::Read {
            path: local.to_path_buf(),
            source: e,
        })?;
        let remote_fingerprint =
            remote
                .fingerprint_with(self.hasher.as_ref())
                .map_err(|e| Error::Read {
                    path: remote.location().to_path_buf(),
                    source: e,
                })?;

        Ok(local_fingerprint != remote_fingerprint)
    }

    /// Like [`Self::is_changed`], but an unreadable file counts as changed:
    /// re-fetching is preferred over silently keeping a possibly stale file.
    pub fn is_changed_or_unreadable(&self, local: &Path, remote: &FileEntry) -> bool {
        match self.is_changed(local, remote) {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!(
                    path = %remote.path(),
                    error = %e,
                    "Could not compare file, treating it as changed"
                );
                true
            }
        }
    }
}
