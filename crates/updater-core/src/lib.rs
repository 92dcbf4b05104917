//! Self-update engine for the launcher
//!
//! Keeps a local installation tree consistent with a remote reference tree,
//! replacing only the files whose content differs:
//!
//! - **Fetching**: [`ContentFetcher`] materializes the remote tree as a
//!   temporary [`RemoteTreeSnapshot`] (zip download or local mirror)
//! - **Change detection**: [`DigestComparator`] with a size fast path and
//!   SHA-256 as the authority
//! - **Diffing**: [`TreeDiffEngine`] walks the snapshot into a [`ChangeSet`]
//! - **Applying**: [`SyncApplier`] replaces files atomically, one at a time
//! - **Orchestration**: [`UpdateOrchestrator`] runs the cycle and reports to
//!   an [`UpdateObserver`]
//!
//! # Architecture
//!
//! ```text
//!                  launcher UI
//!                       |
//!              UpdateOrchestrator ---- UpdateObserver
//!                       |
//!     +---------+-------+--------+------------+
//!     |         |                |            |
//! fetch    TreeDiffEngine   SyncApplier   UpdaterConfig
//!     |         |                |            |
//!     +---------+--- updater-fs -+------------+
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use updater_core::{UpdateOrchestrator, UpdaterConfig};
//!
//! async fn update(config: UpdaterConfig) -> updater_core::Result<()> {
//!     let orchestrator = Arc::new(UpdateOrchestrator::new(config)?);
//!     let outcome = orchestrator.spawn().await??;
//!     println!("{}", outcome.status_line());
//!     Ok(())
//! }
//! ```

pub mod apply;
pub mod config;
pub mod diff;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod observer;
pub mod orchestrator;
pub mod outcome;
pub mod snapshot;
pub mod source;

pub use apply::{ApplyReport, SyncApplier, SyncProgress};
pub use config::UpdaterConfig;
pub use diff::{ChangeSet, PathFilter, TreeDiffEngine};
pub use digest::{ContentHasher, DigestComparator, Sha256Hasher};
pub use error::{Error, Result};
pub use fetch::{ContentFetcher, DirectoryFetcher, HttpArchiveFetcher, SourceFetcher};
pub use observer::{ChannelObserver, NoopObserver, SyncEvent, UpdateObserver};
pub use orchestrator::UpdateOrchestrator;
pub use outcome::{FailureKind, NoOpReason, SyncOutcome, SyncState};
pub use snapshot::{FileEntry, RemoteTreeSnapshot};
pub use source::SourceRef;
