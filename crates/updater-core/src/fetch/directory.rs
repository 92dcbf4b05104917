//! Local mirror directories

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use updater_fs::RelativePath;
use walkdir::WalkDir;

use super::{ContentFetcher, snapshot_dir};
use crate::snapshot::RemoteTreeSnapshot;
use crate::source::SourceRef;
use crate::{Error, Result};

/// Copies a `file://` mirror into a snapshot, so offline installs run the
/// same diff and apply pipeline as downloads.
#[derive(Debug, Clone, Default)]
pub struct DirectoryFetcher {
    temp_root: Option<PathBuf>,
}

impl DirectoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }
}

#[async_trait]
impl ContentFetcher for DirectoryFetcher {
    async fn fetch(
        &self,
        source: &SourceRef,
        cancel: &CancellationToken,
    ) -> Result<RemoteTreeSnapshot> {
        let SourceRef::Directory { path } = source else {
            return Err(Error::InvalidSource {
                input: source.to_string(),
                reason: "not a directory source".into(),
            });
        };

        if !path.is_dir() {
            return Err(Error::Network {
                url: source.to_string(),
                message: "mirror directory not found".into(),
            });
        }

        tracing::info!(mirror = %path.display(), "Copying mirror directory");
        let dir = snapshot_dir(self.temp_root.as_deref())?;
        let from = path.clone();
        let to = dir.path().to_path_buf();
        let cancel = cancel.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&from, &to, &cancel)).await??;
        tracing::debug!(files = copied, "Mirror copied");

        let root = dir.path().to_path_buf();
        Ok(RemoteTreeSnapshot::new(dir, root, source.clone()))
    }
}

fn copy_tree(from: &Path, to: &Path, cancel: &CancellationToken) -> Result<usize> {
    let mut copied = 0;

    for item in WalkDir::new(from).follow_links(false).sort_by_file_name() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let item = item.map_err(|e| Error::Read {
            path: e.path().map_or_else(|| from.to_path_buf(), Path::to_path_buf),
            source: io::Error::other(e),
        })?;

        let file_type = item.file_type();
        if file_type.is_symlink() {
            tracing::warn!(path = %item.path().display(), "Skipping symlink in mirror");
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let relative = item
            .path()
            .strip_prefix(from)
            .map_err(|_| Error::PathSecurity {
                path: item.path().display().to_string(),
                reason: "entry outside the mirror root".into(),
            })?;
        let target = RelativePath::from_path(relative)?.resolve_under(to);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::copy(item.path(), &target).map_err(|e| Error::Read {
            path: item.path().to_path_buf(),
            source: e,
        })?;
        copied += 1;
    }

    Ok(copied)
}
