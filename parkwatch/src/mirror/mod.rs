//! Best-effort replication of ledger changes to a remote store.
//!
//! The ledger hands each committed [`LedgerChange`] to a
//! [`ReplicationSink`]. The [`ChannelSink`] returned by [`spawn_replication`]
//! queues changes for a background task that applies them to a [`Mirror`]
//! in order. Failures are logged and dropped; the local ledger stays
//! authoritative.

mod http;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::LedgerChange;

pub use http::HttpMirror;

/// Receives changes after they are durably stored.
pub trait ReplicationSink: Send {
    fn publish(&self, change: LedgerChange);
}

/// A remote copy of the ledger.
#[async_trait]
pub trait Mirror: Send + Sync + 'static {
    async fn apply(&self, change: &LedgerChange) -> anyhow::Result<()>;
}

/// Sink that forwards changes to the replication task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LedgerChange>,
}

impl ReplicationSink for ChannelSink {
    fn publish(&self, change: LedgerChange) {
        if self.tx.send(change).is_err() {
            warn!("replication task has stopped; change not mirrored");
        }
    }
}

/// Start the replication task for `mirror`.
///
/// The task ends once every [`ChannelSink`] clone is dropped and the queue
/// is drained, so awaiting the handle after dropping the ledger flushes
/// pending updates.
pub fn spawn_replication<M: Mirror>(mirror: M) -> (ChannelSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<LedgerChange>();

    let handle = tokio::spawn(async move {
        while let Some(change) = rx.recv().await {
            match mirror.apply(&change).await {
                Ok(()) => debug!(plate = change.plate(), slot = change.slot(), "mirrored"),
                Err(e) => warn!(
                    plate = change.plate(),
                    slot = change.slot(),
                    "mirror update failed: {e:#}"
                ),
            }
        }
        debug!("replication task stopped");
    });

    (ChannelSink { tx }, handle)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::models::parse_timestamp;

    /// Mirror that records what it applied and rejects one plate.
    #[derive(Default, Clone)]
    struct FakeMirror {
        applied: Arc<Mutex<Vec<LedgerChange>>>,
    }

    #[async_trait]
    impl Mirror for FakeMirror {
        async fn apply(&self, change: &LedgerChange) -> anyhow::Result<()> {
            if change.plate() == "BROKEN" {
                anyhow::bail!("remote refused");
            }
            self.applied.lock().unwrap().push(change.clone());
            Ok(())
        }
    }

    fn entered(plate: &str, slot: u32) -> LedgerChange {
        LedgerChange::Entered {
            plate: plate.to_string(),
            slot,
            entry_time: parse_timestamp("2024-03-01 08:00:00").unwrap(),
        }
    }

    #[tokio::test]
    async fn changes_are_applied_in_order() {
        let mirror = FakeMirror::default();
        let (sink, handle) = spawn_replication(mirror.clone());

        sink.publish(entered("ABC123", 1));
        sink.publish(entered("BROKEN", 2));
        sink.publish(entered("XYZ999", 3));
        drop(sink);
        handle.await.unwrap();

        let applied = mirror.applied.lock().unwrap();
        assert_eq!(*applied, vec![entered("ABC123", 1), entered("XYZ999", 3)]);
    }

    #[tokio::test]
    async fn publish_after_stop_does_not_panic() {
        let (sink, handle) = spawn_replication(FakeMirror::default());
        handle.abort();
        let _ = handle.await;

        sink.publish(entered("ABC123", 1));
    }
}
