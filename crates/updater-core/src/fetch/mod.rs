//! Content fetchers
//!
//! A [`ContentFetcher`] materializes the reference tree into a fresh
//! temporary directory and hands it over as a [`RemoteTreeSnapshot`]. It is
//! a pure I/O boundary: it never looks at the local tree and never decides
//! what changed.
//!
//! - [`HttpArchiveFetcher`] downloads a zip archive over HTTP(S)
//! - [`DirectoryFetcher`] copies a local mirror directory
//! - [`SourceFetcher`] picks one of the two from the [`SourceRef`]

mod archive;
mod directory;
mod http;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::snapshot::RemoteTreeSnapshot;
use crate::source::SourceRef;
use crate::{Error, Result};

pub use directory::DirectoryFetcher;
pub use http::HttpArchiveFetcher;

const SNAPSHOT_PREFIX: &str = "launcher-update-";

/// Retrieves a snapshot of the reference tree.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `source` into a new snapshot.
    ///
    /// Partial output is removed on every error path, including
    /// cancellation.
    async fn fetch(
        &self,
        source: &SourceRef,
        cancel: &CancellationToken,
    ) -> Result<RemoteTreeSnapshot>;
}

/// Dispatches on the kind of [`SourceRef`].
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    http: HttpArchiveFetcher,
    directory: DirectoryFetcher,
}

impl SourceFetcher {
    /// Fetcher whose downloads time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpArchiveFetcher::new(timeout)?,
            directory: DirectoryFetcher::new(),
        })
    }

    /// Create snapshots under `root` instead of the system temp dir.
    pub fn with_temp_root(self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            http: self.http.with_temp_root(root.clone()),
            directory: self.directory.with_temp_root(root),
        }
    }
}

#[async_trait]
impl ContentFetcher for SourceFetcher {
    async fn fetch(
        &self,
        source: &SourceRef,
        cancel: &CancellationToken,
    ) -> Result<RemoteTreeSnapshot> {
        match source {
            SourceRef::Directory { .. } => self.directory.fetch(source, cancel).await,
            SourceRef::Archive { .. } | SourceRef::Hosted { .. } => {
                self.http.fetch(source, cancel).await
            }
        }
    }
}

/// A fresh, uniquely named snapshot directory.
fn snapshot_dir(temp_root: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(SNAPSHOT_PREFIX);

    match temp_root {
        Some(root) => {
            std::fs::create_dir_all(root).map_err(|e| Error::io(root, e))?;
            builder.tempdir_in(root).map_err(|e| Error::io(root, e))
        }
        None => builder
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e)),
    }
}
