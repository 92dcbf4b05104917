//! Remote tree snapshots and their file entries
//!
//! A [`RemoteTreeSnapshot`] owns the temporary directory the fetcher
//! materialized the remote tree into. Dropping or discarding it removes
//! that directory recursively.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use updater_fs::{Fingerprint, RelativePath};
use walkdir::WalkDir;

use crate::digest::ContentHasher;
use crate::source::SourceRef;
use crate::{Error, Result};

/// One file of a tree.
#[derive(Debug)]
pub struct FileEntry {
    path: RelativePath,
    location: PathBuf,
    size: u64,
    /// Computed on first use and kept for the rest of the cycle
    fingerprint: OnceLock<Fingerprint>,
}

impl FileEntry {
    pub fn new(path: RelativePath, location: PathBuf, size: u64) -> Self {
        Self {
            path,
            location,
            size,
            fingerprint: OnceLock::new(),
        }
    }

    /// Path relative to the tree root
    pub fn path(&self) -> &RelativePath {
        &self.path
    }

    /// Where the file's bytes live on disk
    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The entry's fingerprint, computed with `hasher` on first call.
    pub fn fingerprint_with(&self, hasher: &dyn ContentHasher) -> io::Result<Fingerprint> {
        if let Some(fingerprint) = self.fingerprint.get() {
            return Ok(*fingerprint);
        }
        let fingerprint = hasher.fingerprint(&self.location)?;
        Ok(*self.fingerprint.get_or_init(|| fingerprint))
    }
}

/// A fully materialized copy of the remote tree in a temporary directory.
#[derive(Debug)]
pub struct RemoteTreeSnapshot {
    dir: TempDir,
    root: PathBuf,
    created: DateTime<Utc>,
    source: SourceRef,
}

impl RemoteTreeSnapshot {
    /// Wrap a populated temp dir. `root` is the directory inside `dir` that
    /// corresponds to the root of the reference tree.
    pub fn new(dir: TempDir, root: PathBuf, source: SourceRef) -> Self {
        Self {
            dir,
            root,
            created: Utc::now(),
            source,
        }
    }

    /// Root of the reference tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The owned temporary directory, which may be a parent of [`Self::root`]
    pub fn temp_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    /// Enumerate every regular file in walk order.
    ///
    /// The order is lexical by file name within each directory, with
    /// directories descended in place, and is stable across runs.
    /// Symlinks are skipped.
    pub fn entries(&self) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();

        for item in WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
        {
            let item = item.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                Error::Read {
                    path,
                    source: io::Error::other(e),
                }
            })?;

            let file_type = item.file_type();
            if file_type.is_symlink() {
                tracing::warn!(path = %item.path().display(), "Skipping symlink in snapshot");
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let relative = item.path().strip_prefix(&self.root).map_err(|_| Error::PathSecurity {
                path: item.path().display().to_string(),
                reason: "entry outside the snapshot root".into(),
            })?;
            let path = RelativePath::from_path(relative)?;
            let size = item
                .metadata()
                .map_err(|e| Error::Read {
                    path: item.path().to_path_buf(),
                    source: io::Error::other(e),
                })?
                .len();

            entries.push(FileEntry::new(path, item.into_path(), size));
        }

        Ok(entries)
    }

    /// Remove the temporary directory now, reporting failures.
    pub fn discard(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| Error::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Sha256Hasher;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn snapshot_with(files: &[(&str, &str)]) -> RemoteTreeSnapshot {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let root = dir.path().to_path_buf();
        RemoteTreeSnapshot::new(dir, root, "file:///mirror".parse().unwrap())
    }

    #[test]
    fn entries_follow_walk_order() {
        let snapshot = snapshot_with(&[
            ("b.txt", "b"),
            ("a/z.txt", "z"),
            ("a/m/n.txt", "n"),
            ("config.json", "{}"),
        ]);

        let paths: Vec<String> = snapshot
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.path().to_string())
            .collect();

        assert_eq!(paths, vec!["a/m/n.txt", "a/z.txt", "b.txt", "config.json"]);
    }

    #[test]
    fn entries_report_sizes() {
        let snapshot = snapshot_with(&[("data.bin", "0123456789")]);
        let entries = snapshot.entries().unwrap();
        assert_eq!(entries[0].size(), 10);
    }

    #[test]
    fn fingerprint_is_cached() {
        let snapshot = snapshot_with(&[("data.bin", "original")]);
        let entries = snapshot.entries().unwrap();
        let first = entries[0].fingerprint_with(&Sha256Hasher).unwrap();

        // A second call must not re-read the file.
        fs::remove_file(entries[0].location()).unwrap();
        let second = entries[0].fingerprint_with(&Sha256Hasher).unwrap();
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped() {
        let snapshot = snapshot_with(&[("real.txt", "x")]);
        std::os::unix::fs::symlink("/etc/passwd", snapshot.root().join("link")).unwrap();

        let entries = snapshot.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path().as_str(), "real.txt");
    }

    #[test]
    fn discard_removes_temp_dir() {
        let snapshot = snapshot_with(&[("a.txt", "a")]);
        let dir = snapshot.temp_dir().to_path_buf();
        assert!(dir.exists());

        snapshot.discard().unwrap();
        assert!(!dir.exists());
    }
}
