// Exclusive sections keyed by (domain, key).
//
// Two operations on the same record queue behind each other; operations on
// different records never contend. The guard is owned so it can be held
// across awaits (storage I/O, platform calls).

use super::state_store::Domain;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

// Idle entries are swept once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 4_096;

#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<(Domain, String), Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the exclusive section for one record.
    pub async fn acquire(&self, domain: Domain, key: &str) -> OwnedMutexGuard<()> {
        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune();
        }

        // Clone the Arc out so the map shard is released before we await.
        let lock = self
            .locks
            .entry((domain, key.to_string()))
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Drop lock entries nobody is holding or waiting on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.acquire(Domain::Warnings, "1-2").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(Domain::Warnings, "1-2").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire(Domain::Warnings, "1-2").await;
        let _b = locks.acquire(Domain::Warnings, "1-3").await;
        let _c = locks.acquire(Domain::Timeouts, "1-2").await;
        assert_eq!(locks.len(), 3);
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = KeyedLocks::new();
        let held = locks.acquire(Domain::Xp, "1-2").await;
        drop(locks.acquire(Domain::Xp, "1-3").await);

        locks.prune();
        assert_eq!(locks.len(), 1);
        drop(held);
    }
}
