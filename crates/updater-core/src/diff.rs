//! Tree diffing
//!
//! [`TreeDiffEngine`] walks a snapshot once and asks the
//! [`DigestComparator`] about every admitted file. Local files that the
//! remote does not know about are never reported; reconciliation only adds
//! and overwrites.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use updater_fs::RelativePath;

use crate::digest::DigestComparator;
use crate::snapshot::RemoteTreeSnapshot;
use crate::{Error, Result};

/// Ordered relative paths judged changed or new, in snapshot walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    paths: Vec<RelativePath>,
}

impl ChangeSet {
    pub fn new(paths: Vec<RelativePath>) -> Self {
        Self { paths }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RelativePath> {
        self.paths.iter()
    }

    pub fn paths(&self) -> &[RelativePath] {
        &self.paths
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a RelativePath;
    type IntoIter = std::slice::Iter<'a, RelativePath>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

/// Pre-filter on snapshot enumeration.
///
/// With a non-empty allow-list only paths under one of its prefixes are
/// considered. Paths under an excluded prefix are never updated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    allow: Vec<RelativePath>,
    exclude: Vec<RelativePath>,
}

impl PathFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the raw prefixes kept in settings.
    pub fn from_patterns(allow: &[String], exclude: &[String]) -> Result<Self> {
        let parse = |patterns: &[String]| -> Result<Vec<RelativePath>> {
            patterns
                .iter()
                .map(|p| {
                    RelativePath::parse(p)
                        .map_err(|e| Error::config(format!("invalid path filter {p:?}: {e}")))
                })
                .collect()
        };

        Ok(Self {
            allow: parse(allow)?,
            exclude: parse(exclude)?,
        })
    }

    pub fn allow(mut self, prefix: RelativePath) -> Self {
        self.allow.push(prefix);
        self
    }

    pub fn exclude(mut self, prefix: RelativePath) -> Self {
        self.exclude.push(prefix);
        self
    }

    pub fn admits(&self, path: &RelativePath) -> bool {
        let allowed = self.allow.is_empty() || self.allow.iter().any(|p| path.starts_with(p));
        allowed && !self.exclude.iter().any(|p| path.starts_with(p))
    }
}

/// Computes the [`ChangeSet`] between a snapshot and a local tree.
#[derive(Debug, Clone, Default)]
pub struct TreeDiffEngine {
    comparator: DigestComparator,
    filter: PathFilter,
}

impl TreeDiffEngine {
    pub fn new(comparator: DigestComparator, filter: PathFilter) -> Self {
        Self { comparator, filter }
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Diff `snapshot` against the tree at `local_root`.
    pub fn diff(&self, snapshot: &RemoteTreeSnapshot, local_root: &Path) -> Result<ChangeSet> {
        self.diff_cancellable(snapshot, local_root, &CancellationToken::new())
    }

    /// Diff, stopping with [`Error::Cancelled`] once `cancel` fires.
    ///
    /// # Errors
    ///
    /// Any entry that would resolve outside `local_root` aborts the whole
    /// diff with [`Error::PathSecurity`].
    pub fn diff_cancellable(
        &self,
        snapshot: &RemoteTreeSnapshot,
        local_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<ChangeSet> {
        let entries = snapshot.entries()?;
        let mut changed = Vec::new();

        for entry in &entries {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if !self.filter.admits(entry.path()) {
                tracing::debug!(path = %entry.path(), "Filtered out");
                continue;
            }

            let local = entry.path().resolve_contained(local_root).map_err(|e| {
                tracing::warn!(path = %entry.path(), error = %e, "Rejecting remote entry");
                Error::from(e)
            })?;

            if self.comparator.is_changed_or_unreadable(&local, entry) {
                tracing::debug!(path = %entry.path(), size = entry.size(), "Changed");
                changed.push(entry.path().clone());
            }
        }

        tracing::info!(
            scanned = entries.len(),
            changed = changed.len(),
            "Diff complete"
        );
        Ok(ChangeSet::new(changed))
    }
}
