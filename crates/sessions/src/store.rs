//! Session records.
//!
//! One document per (tenant, contact) in the `sessions` collection of the
//! document store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rd_domain::clock::Clock;
use rd_domain::error::Result;
use rd_store::DocumentStore;

pub const COLLECTION: &str = "sessions";

/// Store key for a contact's session.  Contacts are scoped by tenant so two
/// tenants talking to the same number never share a thread.
pub fn session_key(tenant_id: &str, contact_id: &str) -> String {
    format!("{tenant_id}:{contact_id}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub contact_id: String,
    pub tenant_id: String,
    /// Assistant thread id.  `None` after a reset until the next turn.
    #[serde(default)]
    pub thread_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// How many times the session was reset.
    #[serde(default)]
    pub resets: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionStore {
    docs: Arc<DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(docs: Arc<DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { docs, clock }
    }

    pub fn get(&self, tenant_id: &str, contact_id: &str) -> Result<Option<SessionRecord>> {
        self.docs
            .get_as(COLLECTION, &session_key(tenant_id, contact_id))
    }

    /// Record `thread_id` as the contact's current thread, creating the
    /// record if needed.
    pub fn bind_thread(
        &self,
        tenant_id: &str,
        contact_id: &str,
        thread_id: &str,
    ) -> Result<SessionRecord> {
        let key = session_key(tenant_id, contact_id);
        let now = self.clock.now();
        self.docs.transaction(|tx| {
            let record = match tx.get(COLLECTION, &key) {
                Some(raw) => {
                    let mut existing: SessionRecord = serde_json::from_value(raw)?;
                    existing.thread_id = Some(thread_id.to_owned());
                    existing.updated_at = now;
                    existing
                }
                None => SessionRecord {
                    contact_id: contact_id.to_owned(),
                    tenant_id: tenant_id.to_owned(),
                    thread_id: Some(thread_id.to_owned()),
                    created_at: now,
                    updated_at: now,
                    resets: 0,
                },
            };
            tx.set(COLLECTION, &key, serde_json::to_value(&record)?, false);
            Ok(record)
        })
    }

    /// Forget the contact's thread.  Returns the discarded thread id.
    pub fn clear_thread(&self, tenant_id: &str, contact_id: &str) -> Result<Option<String>> {
        let key = session_key(tenant_id, contact_id);
        let now = self.clock.now();
        self.docs.transaction(|tx| {
            let Some(raw) = tx.get(COLLECTION, &key) else {
                return Ok(None);
            };
            let mut record: SessionRecord = serde_json::from_value(raw)?;
            let old = record.thread_id.take();
            record.resets += 1;
            record.updated_at = now;
            tx.set(COLLECTION, &key, serde_json::to_value(&record)?, false);
            Ok(old)
        })
    }

    pub fn list(&self, tenant_id: &str) -> Vec<SessionRecord> {
        self.docs
            .query(
                COLLECTION,
                &[rd_store::Filter::eq("tenant_id", tenant_id)],
            )
            .into_iter()
            .filter_map(|d| d.parse().ok())
            .collect()
    }
}
