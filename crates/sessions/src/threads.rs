use std::sync::Arc;

use rd_assistant::AssistantApi;
use rd_domain::error::Result;

use crate::lock::{ContactGuard, ContactLockMap};
use crate::store::{session_key, SessionStore};

/// Resolves the assistant thread for a contact, creating it at most once.
pub struct ThreadManager {
    store: SessionStore,
    assistant: Arc<dyn AssistantApi>,
    locks: ContactLockMap,
}

impl ThreadManager {
    pub fn new(store: SessionStore, assistant: Arc<dyn AssistantApi>) -> Self {
        Self {
            store,
            assistant,
            locks: ContactLockMap::new(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Take the contact's single-writer lock.  Callers that go on to create
    /// a run hold this for the whole turn.
    pub async fn lock_contact(&self, tenant_id: &str, contact_id: &str) -> Result<ContactGuard> {
        self.locks.acquire(&session_key(tenant_id, contact_id)).await
    }

    /// Return the contact's thread id, creating and persisting a new thread
    /// if none is stored.
    pub async fn get_or_create_thread(&self, tenant_id: &str, contact_id: &str) -> Result<String> {
        let guard = self.lock_contact(tenant_id, contact_id).await?;
        self.get_or_create_locked(&guard, tenant_id, contact_id).await
    }

    /// As [`get_or_create_thread`](Self::get_or_create_thread), for a caller
    /// already holding the contact lock.
    pub async fn get_or_create_locked(
        &self,
        guard: &ContactGuard,
        tenant_id: &str,
        contact_id: &str,
    ) -> Result<String> {
        debug_assert_eq!(
            guard.key(),
            session_key(tenant_id, contact_id),
            "thread lookup under another contact's lock"
        );
        if let Some(thread_id) = self
            .store
            .get(tenant_id, contact_id)?
            .and_then(|r| r.thread_id)
        {
            return Ok(thread_id);
        }

        let thread_id = self.assistant.create_thread().await?;
        self.store.bind_thread(tenant_id, contact_id, &thread_id)?;
        tracing::info!(
            tenant = tenant_id,
            contact_id,
            thread_id = %thread_id,
            "created assistant thread"
        );
        Ok(thread_id)
    }

    /// Discard the stored thread so the next turn creates a new one.  A run
    /// still in flight on the old thread is left to finish on its own.
    pub fn reset(&self, tenant_id: &str, contact_id: &str) -> Result<bool> {
        let old = self.store.clear_thread(tenant_id, contact_id)?;
        tracing::info!(
            tenant = tenant_id,
            contact_id,
            old_thread = ?old,
            "session reset"
        );
        Ok(old.is_some())
    }

    pub fn prune_idle_locks(&self) {
        self.locks.prune_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rd_assistant::ScriptedAssistant;
    use rd_domain::clock::SystemClock;
    use rd_store::DocumentStore;
    use std::time::Duration;

    fn manager(assistant: Arc<ScriptedAssistant>) -> ThreadManager {
        let store = SessionStore::new(Arc::new(DocumentStore::in_memory()), Arc::new(SystemClock));
        ThreadManager::new(store, assistant)
    }

    #[tokio::test]
    async fn second_call_reuses_thread() {
        let assistant = Arc::new(ScriptedAssistant::new());
        let m = manager(assistant.clone());
        let a = m.get_or_create_thread("acme", "c1").await.unwrap();
        let b = m.get_or_create_thread("acme", "c1").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(assistant.threads_created(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_thread() {
        let assistant =
            Arc::new(ScriptedAssistant::new().with_thread_latency(Duration::from_millis(200)));
        let m = Arc::new(manager(assistant.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = m.clone();
                tokio::spawn(async move { m.get_or_create_thread("acme", "c1").await.unwrap() })
            })
            .collect();

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(assistant.threads_created(), 1);
    }

    #[tokio::test]
    async fn reset_forces_new_thread() {
        let assistant = Arc::new(ScriptedAssistant::new());
        let m = manager(assistant.clone());
        let first = m.get_or_create_thread("acme", "c1").await.unwrap();
        assert!(m.reset("acme", "c1").unwrap());
        let second = m.get_or_create_thread("acme", "c1").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(m.store().get("acme", "c1").unwrap().unwrap().resets, 1);
    }

    #[tokio::test]
    async fn failed_creation_persists_nothing() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.fail_next_thread();
        let m = manager(assistant.clone());
        assert!(m.get_or_create_thread("acme", "c1").await.is_err());
        assert!(m.store().get("acme", "c1").unwrap().is_none());
        assert!(m.get_or_create_thread("acme", "c1").await.is_ok());
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "another contact's lock")]
    async fn guard_must_cover_the_contact() {
        let m = manager(Arc::new(ScriptedAssistant::new()));
        let guard = m.lock_contact("acme", "c1").await.unwrap();
        let _ = m.get_or_create_locked(&guard, "acme", "c2").await;
    }
}
