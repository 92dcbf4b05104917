//! Applying a change set to the local tree
//!
//! Each file is replaced atomically, but the set as a whole is not a
//! transaction: a failure stops the run with earlier files already in
//! place. Re-running the cycle converges the tree.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use updater_fs::{RelativePath, WriteOptions, io};

use crate::diff::ChangeSet;
use crate::snapshot::RemoteTreeSnapshot;
use crate::{Error, Result};

/// Progress emitted after each applied file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub completed: usize,
    pub total: usize,
    pub current_path: String,
}

impl SyncProgress {
    /// Completion in whole percent
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total).min(100) as u8
    }
}

/// Summary of an apply run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub total: usize,
    /// Stopped early between files because of cancellation
    pub cancelled: bool,
}

/// The only writer to the local tree.
#[derive(Debug, Clone, Default)]
pub struct SyncApplier {
    options: WriteOptions,
}

impl SyncApplier {
    pub fn new(options: WriteOptions) -> Self {
        Self { options }
    }

    /// Replace every path of `changes` under `local_root` with its copy
    /// from `snapshot`, in order.
    pub fn apply(
        &self,
        snapshot: &RemoteTreeSnapshot,
        changes: &ChangeSet,
        local_root: &Path,
        on_progress: &mut dyn FnMut(&SyncProgress),
    ) -> Result<ApplyReport> {
        self.apply_cancellable(
            snapshot,
            changes,
            local_root,
            on_progress,
            &CancellationToken::new(),
        )
    }

    /// Apply, checking `cancel` between files. A file already being
    /// written always completes or fails on its own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`] for the first file that cannot be replaced,
    /// carrying how many files were applied before it.
    pub fn apply_cancellable(
        &self,
        snapshot: &RemoteTreeSnapshot,
        changes: &ChangeSet,
        local_root: &Path,
        on_progress: &mut dyn FnMut(&SyncProgress),
        cancel: &CancellationToken,
    ) -> Result<ApplyReport> {
        let total = changes.len();

        for (applied, path) in changes.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(applied, total, "Apply cancelled between files");
                return Ok(ApplyReport {
                    applied,
                    total,
                    cancelled: true,
                });
            }

            self.apply_one(snapshot, path, local_root)
                .map_err(|source| {
                    tracing::warn!(%path, applied, error = %source, "Failed to apply file");
                    Error::Write {
                        path: path.to_string(),
                        applied,
                        source,
                    }
                })?;
            tracing::debug!(%path, "Applied");

            on_progress(&SyncProgress {
                completed: applied + 1,
                total,
                current_path: path.to_string(),
            });
        }

        Ok(ApplyReport {
            applied: total,
            total,
            cancelled: false,
        })
    }

    fn apply_one(
        &self,
        snapshot: &RemoteTreeSnapshot,
        path: &RelativePath,
        local_root: &Path,
    ) -> updater_fs::Result<()> {
        let source = path.resolve_under(snapshot.root());
        // Checked again here: the tree may have changed since the diff.
        let target = path.resolve_contained(local_root)?;
        io::replace_file(&source, &target, self.options)
    }
}
