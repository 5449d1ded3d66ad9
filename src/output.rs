//! Publication of status snapshots.

use std::path::PathBuf;

use dockwatch_types::StatusSnapshot;
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Where the scheduler delivers each [`StatusSnapshot`].
///
/// Every completed poll cycle, error polls included, is delivered once.
#[derive(Debug, Clone)]
pub enum SnapshotSink {
    /// Send every snapshot through a bounded channel.
    ///
    /// Use [`SnapshotSink::channel`] to create this variant with its receiver.
    /// A full channel drops the snapshot rather than stalling polling.
    Channel(mpsc::Sender<StatusSnapshot>),

    /// Keep only the latest snapshot in a watch channel.
    ///
    /// Use [`SnapshotSink::latest`] to create this variant.
    Latest(watch::Sender<Option<StatusSnapshot>>),

    /// Write each snapshot to a JSON file, overwriting the previous one.
    File(PathBuf),
}

impl SnapshotSink {
    /// Create a channel sink and return it with its receiver.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dockwatch::SnapshotSink;
    ///
    /// let (sink, mut rx) = SnapshotSink::channel(16);
    ///
    /// // Later, receive snapshots
    /// // while let Some(snapshot) = rx.recv().await {
    /// //     println!("healthy: {}", snapshot.aggregate_healthy());
    /// // }
    /// ```
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<StatusSnapshot>) {
        let (tx, rx) = mpsc::channel(buffer);
        (SnapshotSink::Channel(tx), rx)
    }

    /// Create a latest-only sink and return it with its receiver.
    pub fn latest() -> (Self, watch::Receiver<Option<StatusSnapshot>>) {
        let (tx, rx) = watch::channel(None);
        (SnapshotSink::Latest(tx), rx)
    }

    /// Create a file sink.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        SnapshotSink::File(path.into())
    }

    /// Deliver a snapshot. Failures are logged, never propagated.
    pub async fn publish(&self, snapshot: StatusSnapshot) {
        match self {
            SnapshotSink::Channel(tx) => {
                if let Err(e) = tx.try_send(snapshot) {
                    warn!("Dropping status snapshot: {}", e);
                }
            }
            SnapshotSink::Latest(tx) => {
                tx.send_replace(Some(snapshot));
            }
            SnapshotSink::File(path) => {
                let result = match serde_json::to_string_pretty(&snapshot) {
                    Ok(json) => tokio::fs::write(path, json).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = result {
                    warn!("Failed to write snapshot to {}: {}", path.display(), e);
                }
            }
        }
    }
}
