//! Update orchestration
//!
//! [`UpdateOrchestrator`] sequences one synchronization cycle:
//!
//! ```text
//! Idle → Fetching → Diffing → (AwaitingConfirmation) → Applying → CleaningUp → Idle
//!            │          │                                   │
//!            └→ Failed  └──────────→ CleaningUp → Failed ←──┘
//! ```
//!
//! The snapshot is owned by the cycle and removed in `CleaningUp` whatever
//! the outcome. Diff and apply run on the blocking pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use updater_fs::{SettingsStore, TreeLock, WriteOptions};

use crate::apply::SyncApplier;
use crate::config::UpdaterConfig;
use crate::diff::{ChangeSet, TreeDiffEngine};
use crate::digest::DigestComparator;
use crate::fetch::{ContentFetcher, SourceFetcher};
use crate::observer::{NoopObserver, UpdateObserver};
use crate::outcome::{FailureKind, NoOpReason, SyncOutcome, SyncState};
use crate::snapshot::RemoteTreeSnapshot;
use crate::{Error, Result};

/// Runs synchronization cycles for one local tree.
pub struct UpdateOrchestrator {
    config: UpdaterConfig,
    fetcher: Arc<dyn ContentFetcher>,
    diff_engine: TreeDiffEngine,
    applier: SyncApplier,
    observer: Arc<dyn UpdateObserver>,
    state: Mutex<SyncState>,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    lock_dir: Option<PathBuf>,
}

impl std::fmt::Debug for UpdateOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateOrchestrator")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl UpdateOrchestrator {
    /// Orchestrator with the default fetcher, comparator and applier.
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        let fetcher = SourceFetcher::new(config.timeout())?;
        let diff_engine = TreeDiffEngine::new(DigestComparator::new(), config.path_filter()?);

        Ok(Self {
            config,
            fetcher: Arc::new(fetcher),
            diff_engine,
            applier: SyncApplier::default(),
            observer: Arc::new(NoopObserver),
            state: Mutex::new(SyncState::Idle),
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
            lock_dir: None,
        })
    }

    /// Orchestrator configured from the host's settings store.
    pub fn from_settings(store: &dyn SettingsStore) -> Result<Self> {
        Self::new(UpdaterConfig::from_settings(store)?)
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn UpdateObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_comparator(mut self, comparator: DigestComparator) -> Self {
        self.diff_engine = TreeDiffEngine::new(comparator, self.diff_engine.filter().clone());
        self
    }

    pub fn with_write_options(mut self, options: WriteOptions) -> Self {
        self.applier = SyncApplier::new(options);
        self
    }

    /// Keep the tree lock file in `dir` instead of the system temp dir.
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Current phase of the cycle, `Idle` between cycles.
    pub fn state(&self) -> SyncState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request cancellation of the running cycle. Returns `false` when no
    /// cycle is running.
    pub fn cancel(&self) -> bool {
        match lock(&self.cancel).as_ref() {
            Some(token) => {
                tracing::info!("Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run [`Self::synchronize`] on a background task.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<Result<SyncOutcome>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.synchronize().await })
    }

    /// Bring the local tree in line with the remote tree.
    ///
    /// Fetch, diff and apply failures are reported as
    /// [`SyncOutcome::Failed`]; the observer always receives exactly one
    /// terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] when a cycle for the same tree is
    /// in flight, here or in another process.
    #[tracing::instrument(
        skip(self),
        fields(source = %self.config.source, root = %self.config.local_root.display())
    )]
    pub async fn synchronize(&self) -> Result<SyncOutcome> {
        let (_guard, cancel) = self.begin()?;
        let _tree_lock = self.lock_tree()?;

        tracing::info!("Synchronization started");
        let outcome = self.run_cycle(&cancel).await;
        *lock(&self.cancel) = None;

        self.finish(&outcome);
        Ok(outcome)
    }

    /// Claim the orchestrator for one cycle. The token is installed before
    /// anything else runs, so `cancel()` is never lost.
    fn begin(&self) -> Result<(CycleGuard<'_>, CancellationToken)> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Synchronization already running");
            return Err(Error::AlreadyRunning {
                root: self.config.local_root.clone(),
            });
        }
        let guard = CycleGuard { orchestrator: self };

        let cancel = CancellationToken::new();
        *lock(&self.cancel) = Some(cancel.clone());
        Ok((guard, cancel))
    }

    fn lock_tree(&self) -> Result<TreeLock> {
        let root = &self.config.local_root;
        let lock = match &self.lock_dir {
            Some(dir) => TreeLock::try_acquire_in(root, dir),
            None => TreeLock::try_acquire(root),
        };
        lock.map_err(|e| {
            tracing::warn!(error = %e, "Could not lock the local tree");
            Error::from(e)
        })
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> SyncOutcome {
        if cancel.is_cancelled() {
            return cancelled();
        }

        self.transition(SyncState::Fetching);
        self.observer.on_status("Checking for updates");

        let snapshot = match self.fetcher.fetch(&self.config.source, cancel).await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(Error::Cancelled) => return cancelled(),
            Err(e) => {
                tracing::warn!(error = %e, "Fetch failed");
                self.transition(SyncState::Failed);
                return SyncOutcome::failed(&e, 0);
            }
        };
        tracing::info!(root = %snapshot.root().display(), "Remote tree fetched");

        let outcome = self.reconcile(&snapshot, cancel).await;

        self.transition(SyncState::CleaningUp);
        discard(snapshot).await;
        outcome
    }

    async fn reconcile(
        &self,
        snapshot: &Arc<RemoteTreeSnapshot>,
        cancel: &CancellationToken,
    ) -> SyncOutcome {
        self.transition(SyncState::Diffing);
        let changes = match self.diff(snapshot, cancel).await {
            Ok(changes) => changes,
            Err(Error::Cancelled) => return cancelled(),
            Err(e) => {
                tracing::warn!(error = %e, "Diff failed");
                return SyncOutcome::failed(&e, 0);
            }
        };

        if changes.is_empty() {
            return SyncOutcome::NoOp {
                reason: NoOpReason::UpToDate,
            };
        }
        let total = changes.len();
        tracing::info!(changed = total, "Updates available");

        if self.config.require_confirmation {
            self.transition(SyncState::AwaitingConfirmation);
            self.observer
                .on_status(&format!("{total} file(s) can be updated"));

            let accepted = tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(),
                accepted = self.observer.on_confirmation_required(total) => accepted,
            };
            if !accepted {
                tracing::info!("Update declined");
                return SyncOutcome::NoOp {
                    reason: NoOpReason::Declined,
                };
            }
        }

        self.transition(SyncState::Applying);
        self.observer.on_status(&format!("Updating {total} file(s)"));
        self.apply(snapshot, changes, cancel).await
    }

    async fn diff(
        &self,
        snapshot: &Arc<RemoteTreeSnapshot>,
        cancel: &CancellationToken,
    ) -> Result<ChangeSet> {
        let engine = self.diff_engine.clone();
        let snapshot = Arc::clone(snapshot);
        let root = self.config.local_root.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || engine.diff_cancellable(&snapshot, &root, &cancel))
            .await?
    }

    async fn apply(
        &self,
        snapshot: &Arc<RemoteTreeSnapshot>,
        changes: ChangeSet,
        cancel: &CancellationToken,
    ) -> SyncOutcome {
        let applier = self.applier.clone();
        let observer = Arc::clone(&self.observer);
        let snapshot = Arc::clone(snapshot);
        let root = self.config.local_root.clone();
        let cancel = cancel.clone();

        let result = tokio::task::spawn_blocking(move || {
            applier.apply_cancellable(
                &snapshot,
                &changes,
                &root,
                &mut |progress| observer.on_progress(progress),
                &cancel,
            )
        })
        .await
        .map_err(Error::from)
        .and_then(|result| result);

        match result {
            Ok(report) if report.cancelled && report.applied == 0 => cancelled(),
            Ok(report) if report.cancelled => SyncOutcome::Failed {
                kind: FailureKind::Interrupted,
                reason: format!(
                    "Cancelled after {} of {} files",
                    report.applied, report.total
                ),
                partial_count: report.applied,
                failed_path: None,
            },
            Ok(report) => SyncOutcome::Updated {
                count: report.applied,
            },
            Err(e) => {
                let applied = match &e {
                    Error::Write { applied, .. } => *applied,
                    _ => 0,
                };
                SyncOutcome::failed(&e, applied)
            }
        }
    }

    fn finish(&self, outcome: &SyncOutcome) {
        if !outcome.is_success() {
            self.transition(SyncState::Failed);
        }
        self.transition(SyncState::Idle);

        let status = outcome.status_line();
        if outcome.is_success() {
            tracing::info!(%status, "Synchronization finished");
        } else {
            tracing::warn!(%status, "Synchronization failed");
        }
        self.observer.on_status(&status);
        self.observer.on_complete(outcome);
    }

    fn transition(&self, next: SyncState) {
        let previous = std::mem::replace(&mut *lock(&self.state), next);
        if previous == next {
            return;
        }
        tracing::debug!(from = %previous, to = %next, "State transition");
        self.observer.on_state(next);
    }
}

/// Clears the in-flight markers even if the cycle's future is dropped.
struct CycleGuard<'a> {
    orchestrator: &'a UpdateOrchestrator,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.orchestrator.cancel) = None;
        let mut state = lock(&self.orchestrator.state);
        if state.is_busy() {
            *state = SyncState::Idle;
        }
        drop(state);
        self.orchestrator.running.store(false, Ordering::SeqCst);
    }
}

fn cancelled() -> SyncOutcome {
    tracing::info!("Synchronization cancelled");
    SyncOutcome::NoOp {
        reason: NoOpReason::Cancelled,
    }
}

async fn discard(snapshot: Arc<RemoteTreeSnapshot>) {
    let snapshot = match Arc::try_unwrap(snapshot) {
        Ok(snapshot) => snapshot,
        Err(shared) => {
            // Removed when the last reference drops.
            tracing::warn!(dir = %shared.temp_dir().display(), "Snapshot still in use");
            return;
        }
    };

    let dir = snapshot.temp_dir().to_path_buf();
    match tokio::task::spawn_blocking(move || snapshot.discard()).await {
        Ok(Ok(())) => tracing::debug!(dir = %dir.display(), "Snapshot removed"),
        Ok(Err(e)) => tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove snapshot"),
        Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Snapshot cleanup task failed"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
