use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

const DEFAULT_PRUNE_THRESHOLD: usize = 1024;

/// Hands out one lease per user email so that operations on the same cart
/// run one at a time within this process.
pub struct UserLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    prune_threshold: usize,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }

    /// Idle entries are dropped once the map holds more than `prune_threshold` emails
    pub fn with_prune_threshold(prune_threshold: usize) -> Self {
        Self {
            locks: std::sync::Mutex::new(HashMap::new()),
            prune_threshold,
        }
    }

    /// Wait for the lease on `email`. The lease is released when the guard drops.
    pub async fn acquire(&self, email: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if locks.len() > self.prune_threshold {
                // Only the map holds a reference to an idle lock
                let before = locks.len();
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                debug!("Pruned {} idle user locks", before - locks.len());
            }

            locks
                .entry(email.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::new()
    }
}
