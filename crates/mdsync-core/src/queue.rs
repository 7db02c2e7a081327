//! Single-worker sync queue
//!
//! Watch events for the same file arriving while it is still pending are
//! coalesced, so a burst of saves produces one sync.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

type Pending = Arc<Mutex<HashSet<PathBuf>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashSet<PathBuf>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// Create a bounded queue holding at most `capacity` distinct paths
pub fn sync_queue(capacity: usize) -> (SyncQueue, SyncQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let pending = Pending::default();
    (
        SyncQueue {
            tx,
            pending: pending.clone(),
        },
        SyncQueueReceiver { rx, pending },
    )
}

/// Producer side; cheap to clone
#[derive(Debug, Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<PathBuf>,
    pending: Pending,
}

impl SyncQueue {
    /// Queue a path unless it is already pending
    ///
    /// Returns `true` if the path was added. Never blocks: a full queue
    /// drops the event with a warning.
    pub fn enqueue(&self, path: PathBuf) -> bool {
        let mut pending = lock(&self.pending);
        if pending.contains(&path) {
            return false;
        }

        match self.tx.try_send(path.clone()) {
            Ok(()) => {
                pending.insert(path);
                true
            }
            Err(TrySendError::Full(path)) => {
                warn!("Sync queue full; dropping {}", path.display());
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Consumer side, owned by the single sync worker
#[derive(Debug)]
pub struct SyncQueueReceiver {
    rx: mpsc::Receiver<PathBuf>,
    pending: Pending,
}

impl SyncQueueReceiver {
    /// Next path, immediately
    pub async fn recv(&mut self) -> Option<PathBuf> {
        let path = self.rx.recv().await?;
        lock(&self.pending).remove(&path);
        Some(path)
    }

    /// Next path after a quiet period
    ///
    /// The path stays pending during `delay`, so events for it in that
    /// window are absorbed.
    pub async fn recv_debounced(&mut self, delay: Duration) -> Option<PathBuf> {
        let path = self.rx.recv().await?;
        tokio::time::sleep(delay).await;
        lock(&self.pending).remove(&path);
        Some(path)
    }
}
