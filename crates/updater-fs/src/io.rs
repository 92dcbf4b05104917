//! Atomic file replacement
//!
//! Every write stages the new content in a temporary sibling of the target
//! (same directory, so the same filesystem) and renames it over the target.
//! Observers see either the old file or the new file, never a partial one.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::{NamedTempFile, PersistError};

use crate::{Error, Result};

/// Durability settings for atomic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Flush staged content to disk before the rename.
    pub enable_fsync: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { enable_fsync: true }
    }
}

/// Replace `target` with a copy of `source`.
///
/// Parent directories of `target` are created as needed and the source's
/// permissions are carried over. When the rename is refused and `target`
/// is an existing file, it is deleted and the rename retried.
pub fn replace_file(source: &Path, target: &Path, options: WriteOptions) -> Result<()> {
    let parent = ensure_parent(target)?;

    let mut reader = File::open(source).map_err(|e| Error::io(source, e))?;
    let permissions = reader
        .metadata()
        .map_err(|e| Error::io(source, e))?
        .permissions();

    let mut staged = stage_in(parent, target)?;
    io::copy(&mut reader, staged.as_file_mut()).map_err(|e| Error::io(staged.path(), e))?;
    fs::set_permissions(staged.path(), permissions).map_err(|e| Error::io(staged.path(), e))?;

    commit(staged, target, options)
}

/// Write `content` to `path` atomically, creating parent directories.
pub fn write_atomic(path: &Path, content: &[u8], options: WriteOptions) -> Result<()> {
    let parent = ensure_parent(path)?;

    let mut staged = stage_in(parent, path)?;
    staged
        .write_all(content)
        .map_err(|e| Error::io(staged.path(), e))?;

    commit(staged, path, options)
}

fn ensure_parent(target: &Path) -> Result<&Path> {
    let parent = target.parent().ok_or_else(|| {
        Error::io(
            target,
            io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory"),
        )
    })?;
    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    Ok(parent)
}

/// Create the staging file `.<name>.<random>.tmp` next to `target`.
fn stage_in(parent: &Path, target: &Path) -> Result<NamedTempFile> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| Error::io(parent, e))
}

fn commit(staged: NamedTempFile, target: &Path, options: WriteOptions) -> Result<()> {
    if options.enable_fsync {
        staged
            .as_file()
            .sync_all()
            .map_err(|e| Error::io(staged.path(), e))?;
    }

    match staged.persist(target) {
        Ok(_) => Ok(()),
        Err(PersistError { error, file }) => {
            // Only an existing regular file can be cleared out of the way.
            let replaceable = fs::symlink_metadata(target)
                .map(|meta| !meta.is_dir())
                .unwrap_or(false);
            if !replaceable {
                return Err(Error::io(target, error));
            }

            tracing::debug!(
                path = %target.display(),
                %error,
                "Rename refused, falling back to delete-then-move"
            );
            fs::remove_file(target).map_err(|e| Error::io(target, e))?;
            file.persist(target)
                .map(|_| ())
                .map_err(|e| Error::io(target, e.error))
        }
    }
}
