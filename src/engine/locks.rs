use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::{IssuerId, SecurityId, ShareholderId};

type PairKey = (IssuerId, ShareholderId, SecurityId);

/// Per-holding async locks.
///
/// Postings hold the lock of every (issuer, shareholder, security) they touch
/// from the balance check through the append, so two postings on one holding
/// in this process cannot both pass validation against the same balance.
#[derive(Clone, Default)]
pub struct PairLocks {
    locks: Arc<Mutex<HashMap<PairKey, Arc<AsyncMutex<()>>>>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        issuer_id: IssuerId,
        shareholder_id: ShareholderId,
        security_id: &str,
    ) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((issuer_id, shareholder_id, security_id.to_string()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    /// Lock several holdings at once.
    ///
    /// Keys are taken in sorted order so two multi-leg postings over the same
    /// holdings cannot deadlock.
    pub async fn acquire_all(
        &self,
        issuer_id: IssuerId,
        holdings: &[(ShareholderId, &str)],
    ) -> Vec<OwnedMutexGuard<()>> {
        let mut keys: Vec<(ShareholderId, &str)> = holdings.to_vec();
        keys.sort_unstable();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for (shareholder_id, security_id) in keys {
            guards.push(self.acquire(issuer_id, shareholder_id, security_id).await);
        }
        guards
    }

    /// Number of pairs currently tracked
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_pair_serializes() {
        let locks = PairLocks::new();
        let guard = locks.acquire(1, 10, "UNITS").await;

        let contender = locks.clone();
        let waiting = tokio::spawn(async move {
            let _guard = contender.acquire(1, 10, "UNITS").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_pairs_independent() {
        let locks = PairLocks::new();
        let _a = locks.acquire(1, 10, "UNITS").await;
        let _b = locks.acquire(1, 11, "UNITS").await;
        let _c = locks.acquire(1, 10, "CLASS-A").await;
        assert_eq!(locks.len(), 3);
    }

    #[tokio::test]
    async fn test_acquire_all_orders_and_dedups() {
        let locks = PairLocks::new();
        let guards = locks.acquire_all(1, &[(11, "UNITS"), (10, "UNITS"), (11, "UNITS")]).await;
        assert_eq!(guards.len(), 2);

        // Reversed order from another task waits instead of deadlocking
        let contender = locks.clone();
        let waiting = tokio::spawn(async move {
            contender.acquire_all(1, &[(10, "UNITS"), (11, "UNITS")]).await.len()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guards);
        assert_eq!(waiting.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_released_pairs_pruned() {
        let locks = PairLocks::new();
        drop(locks.acquire(1, 10, "UNITS").await);
        drop(locks.acquire(1, 11, "UNITS").await);
        // Acquiring prunes the released entries before adding its own
        let _held = locks.acquire(2, 20, "UNITS").await;
        assert_eq!(locks.len(), 1);
    }
}
