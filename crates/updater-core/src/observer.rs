//! UI boundary
//!
//! The orchestrator reports through an [`UpdateObserver`]. Hosts either
//! implement the trait directly or take a [`ChannelObserver`] and consume
//! [`SyncEvent`]s from a receiver on their own task.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::apply::SyncProgress;
use crate::outcome::{SyncOutcome, SyncState};

/// Receives status, progress and confirmation requests from a cycle.
///
/// All methods have defaults, so implementors only override what they
/// render. Callbacks run on the cycle's task and must not block.
#[async_trait]
pub trait UpdateObserver: Send + Sync {
    fn on_state(&self, _state: SyncState) {}

    fn on_status(&self, _text: &str) {}

    fn on_progress(&self, _progress: &SyncProgress) {}

    /// Asked when confirmation is required and `changed` files would be
    /// replaced. Returning `false` declines the update.
    async fn on_confirmation_required(&self, _changed: usize) -> bool {
        true
    }

    fn on_complete(&self, _outcome: &SyncOutcome) {}
}

/// Ignores everything and accepts every confirmation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl UpdateObserver for NoopObserver {}

/// Events produced by a [`ChannelObserver`].
#[derive(Debug)]
pub enum SyncEvent {
    State(SyncState),
    Status(String),
    Progress(SyncProgress),
    /// Send `true` to accept. Dropping `reply` declines.
    ConfirmationRequired {
        changed: usize,
        reply: oneshot::Sender<bool>,
    },
    Complete(SyncOutcome),
}

/// Forwards every callback onto an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Update event receiver dropped");
        }
    }
}

#[async_trait]
impl UpdateObserver for ChannelObserver {
    fn on_state(&self, state: SyncState) {
        self.send(SyncEvent::State(state));
    }

    fn on_status(&self, text: &str) {
        self.send(SyncEvent::Status(text.to_string()));
    }

    fn on_progress(&self, progress: &SyncProgress) {
        self.send(SyncEvent::Progress(progress.clone()));
    }

    async fn on_confirmation_required(&self, changed: usize) -> bool {
        let (reply, answer) = oneshot::channel();
        self.send(SyncEvent::ConfirmationRequired { changed, reply });
        answer.await.unwrap_or(false)
    }

    fn on_complete(&self, outcome: &SyncOutcome) {
        self.send(SyncEvent::Complete(outcome.clone()));
    }
}
