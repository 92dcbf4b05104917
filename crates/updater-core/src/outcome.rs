//! Cycle states and terminal outcomes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Phase of a synchronization cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Fetching,
    Diffing,
    AwaitingConfirmation,
    Applying,
    CleaningUp,
    Failed,
}

impl SyncState {
    /// Whether a cycle is in flight.
    pub fn is_busy(self) -> bool {
        !matches!(self, Self::Idle | Self::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::AwaitingConfirmation => "awaiting confirmation",
            Self::Applying => "applying",
            Self::CleaningUp => "cleaning up",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a cycle finished without writing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    UpToDate,
    Declined,
    Cancelled,
}

/// Error category behind a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    CorruptArchive,
    PathSecurity,
    Read,
    Write,
    /// Cancelled after some files were already applied
    Interrupted,
    Config,
    Internal,
}

impl FailureKind {
    pub fn of(err: &Error) -> Self {
        match err {
            Error::Network { .. } => Self::Network,
            Error::CorruptArchive { .. } => Self::CorruptArchive,
            Error::PathSecurity { .. } => Self::PathSecurity,
            Error::Read { .. } => Self::Read,
            Error::Write { .. } => Self::Write,
            Error::Cancelled => Self::Interrupted,
            Error::Config { .. } | Error::InvalidSource { .. } => Self::Config,
            Error::AlreadyRunning { .. } | Error::Task(_) | Error::Fs(_) => Self::Internal,
        }
    }
}

/// Terminal result of one `synchronize()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Every changed file was replaced
    Updated { count: usize },

    /// Nothing was written
    NoOp { reason: NoOpReason },

    /// The cycle stopped early; `partial_count` files were already applied
    Failed {
        kind: FailureKind,
        reason: String,
        partial_count: usize,
        failed_path: Option<String>,
    },
}

impl SyncOutcome {
    /// Failure outcome for `err`, with `partial_count` files already applied.
    pub fn failed(err: &Error, partial_count: usize) -> Self {
        let (reason, failed_path) = match err {
            Error::Write { path, source, .. } => (source.to_string(), Some(path.clone())),
            Error::PathSecurity { path, .. } => (err.to_string(), Some(path.clone())),
            other => (other.to_string(), None),
        };

        Self::Failed {
            kind: FailureKind::of(err),
            reason,
            partial_count,
            failed_path,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Number of files this cycle replaced.
    pub fn files_written(&self) -> usize {
        match self {
            Self::Updated { count } => *count,
            Self::NoOp { .. } => 0,
            Self::Failed { partial_count, .. } => *partial_count,
        }
    }

    /// The single status line shown for this outcome.
    pub fn status_line(&self) -> String {
        match self {
            Self::Updated { count: 1 } => "Updated 1 file".to_string(),
            Self::Updated { count } => format!("Updated {count} files"),
            Self::NoOp {
                reason: NoOpReason::UpToDate,
            } => "Everything is up to date".to_string(),
            Self::NoOp {
                reason: NoOpReason::Declined,
            } => "Update declined".to_string(),
            Self::NoOp {
                reason: NoOpReason::Cancelled,
            } => "Update cancelled".to_string(),
            Self::Failed {
                reason,
                partial_count,
                ..
            } => format!("Update failed: {reason} ({partial_count} file(s) applied)"),
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(SyncOutcome::Updated { count: 1 }, "Updated 1 file")]
    #[case(SyncOutcome::Updated { count: 4 }, "Updated 4 files")]
    #[case(SyncOutcome::NoOp { reason: NoOpReason::UpToDate }, "Everything is up to date")]
    #[case(SyncOutcome::NoOp { reason: NoOpReason::Declined }, "Update declined")]
    #[case(SyncOutcome::NoOp { reason: NoOpReason::Cancelled }, "Update cancelled")]
    fn status_lines(#[case] outcome: SyncOutcome, #[case] expected: &str) {
        assert_eq!(outcome.status_line(), expected);
    }

    #[test]
    fn failure_status_mentions_partial_count() {
        let outcome = SyncOutcome::Failed {
            kind: FailureKind::Write,
            reason: "disk full".into(),
            partial_count: 2,
            failed_path: Some("mods/c.jar".into()),
        };
        assert_eq!(
            outcome.status_line(),
            "Update failed: disk full (2 file(s) applied)"
        );
        assert_eq!(outcome.files_written(), 2);
        assert!(!outcome.is_success());
    }

    #[test]
    fn write_failure_carries_path_and_count() {
        let err = Error::Write {
            path: "mods/c.jar".into(),
            applied: 2,
            source: updater_fs::Error::io(
                "/opt/launcher/mods/c.jar",
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ),
        };

        match SyncOutcome::failed(&err, 2) {
            SyncOutcome::Failed {
                kind,
                partial_count,
                failed_path,
                ..
            } => {
                assert_eq!(kind, FailureKind::Write);
                assert_eq!(partial_count, 2);
                assert_eq!(failed_path.as_deref(), Some("mods/c.jar"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn path_security_failure_names_the_entry() {
        let err = Error::PathSecurity {
            path: "../../etc/passwd".into(),
            reason: "parent directory segment".into(),
        };

        let outcome = SyncOutcome::failed(&err, 0);

        assert!(matches!(
            outcome,
            SyncOutcome::Failed {
                kind: FailureKind::PathSecurity,
                partial_count: 0,
                ..
            }
        ));
        assert!(outcome.status_line().contains("../../etc/passwd"));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(SyncOutcome::NoOp {
            reason: NoOpReason::UpToDate,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "no_op", "reason": "up_to_date"}));
    }

    #[test]
    fn busy_states() {
        assert!(!SyncState::Idle.is_busy());
        assert!(!SyncState::Failed.is_busy());
        assert!(SyncState::Applying.is_busy());
        assert_eq!(SyncState::AwaitingConfirmation.to_string(), "awaiting confirmation");
    }
}
