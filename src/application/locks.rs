use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::UserId;

/// Table size above which idle locks are dropped before handing out another.
const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per user, created on first use.
///
/// Holding a user's guard serializes that user's charges while leaving
/// every other user free to proceed. Entries nobody holds or waits on are
/// pruned once the table passes `PRUNE_THRESHOLD`.
#[derive(Default)]
pub struct UserLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock of `user_id`.
    pub async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune_idle();
        }
        // Clone the Arc out before awaiting so no shard lock is held.
        let lock = self.locks.entry(user_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop locks that only the table references. Returns how many went.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
