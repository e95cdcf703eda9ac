//! Per-contact concurrency control.
//!
//! Only one writer per contact at a time: thread creation and run creation
//! both happen while holding the contact's permit.  Other contacts are
//! never blocked.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rd_domain::error::{Error, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Manages per-contact locks.
///
/// Each contact key maps to a `Semaphore(1)`.  Holding the returned
/// [`ContactGuard`] grants exclusive access; it releases on drop.
pub struct ContactLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for ContactLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &str) -> Result<ContactGuard> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        let permit = sem
            .acquire_owned()
            .await
            .map_err(|_| Error::Other(format!("contact lock for '{key}' was closed")))?;

        Ok(ContactGuard {
            key: key.to_owned(),
            _permit: permit,
        })
    }

    /// Number of tracked contacts (for monitoring).
    pub fn contact_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop locks for contacts nobody holds or waits on.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| Arc::strong_count(sem) > 1);
    }
}

/// Proof of exclusive access to one contact.
pub struct ContactGuard {
    key: String,
    _permit: OwnedSemaphorePermit,
}

impl ContactGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sequential_access() {
        let map = ContactLockMap::new();
        drop(map.acquire("c1").await.unwrap());
        let g = map.acquire("c1").await.unwrap();
        assert_eq!(g.key(), "c1");
    }

    #[tokio::test]
    async fn different_contacts_concurrent() {
        let map = ContactLockMap::new();
        let _a = map.acquire("c1").await.unwrap();
        let _b = map.acquire("c2").await.unwrap();
        assert_eq!(map.contact_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn same_contact_waits() {
        let map = Arc::new(ContactLockMap::new());
        let map2 = map.clone();

        let first = map.acquire("c1").await.unwrap();
        let handle = tokio::spawn(async move {
            let _g = map2.acquire("c1").await.unwrap();
            42
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        drop(first);
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let map = ContactLockMap::new();
        let held = map.acquire("c1").await.unwrap();
        drop(map.acquire("c2").await.unwrap());
        map.prune_idle();
        assert_eq!(map.contact_count(), 1);
        drop(held);
        map.prune_idle();
        assert_eq!(map.contact_count(), 0);
    }
}
