//! Contact records: tags and the current staff assignment.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use rd_domain::error::Result;
use rd_sessions::session_key;
use rd_store::DocumentStore;

pub const COLLECTION: &str = "contacts";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub tenant_id: String,
    pub contact_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Name of the staff member the contact is assigned to.
    #[serde(default)]
    pub assigned_to: Option<String>,
}

pub struct ContactStore {
    docs: Arc<DocumentStore>,
}

impl ContactStore {
    pub fn new(docs: Arc<DocumentStore>) -> Self {
        Self { docs }
    }

    pub fn get(&self, tenant_id: &str, contact_id: &str) -> Result<Option<ContactRecord>> {
        self.docs.get_as(COLLECTION, &session_key(tenant_id, contact_id))
    }

    /// Add `tag` to the contact.  Returns `false` if it was already present.
    pub fn add_tag(&self, tenant_id: &str, contact_id: &str, tag: &str) -> Result<bool> {
        self.update(tenant_id, contact_id, |rec| {
            if rec.tags.iter().any(|t| t == tag) {
                return false;
            }
            rec.tags.push(tag.to_owned());
            true
        })
    }

    /// Record the assignee and the `assigned_to:<name>` tag.
    pub fn assign(&self, tenant_id: &str, contact_id: &str, staff_name: &str) -> Result<()> {
        let tag = format!("assigned_to:{staff_name}");
        self.update(tenant_id, contact_id, |rec| {
            rec.tags.retain(|t| !t.starts_with("assigned_to:"));
            rec.tags.push(tag.clone());
            rec.assigned_to = Some(staff_name.to_owned());
            true
        })?;
        Ok(())
    }

    fn update<F>(&self, tenant_id: &str, contact_id: &str, mut f: F) -> Result<bool>
    where
        F: FnMut(&mut ContactRecord) -> bool,
    {
        let key = session_key(tenant_id, contact_id);
        self.docs.transaction(|tx| {
            let mut rec = match tx.get(COLLECTION, &key) {
                Some(v) => serde_json::from_value(v)?,
                None => ContactRecord {
                    tenant_id: tenant_id.to_owned(),
                    contact_id: contact_id.to_owned(),
                    ..ContactRecord::default()
                },
            };
            let changed = f(&mut rec);
            if changed {
                tx.set(COLLECTION, &key, serde_json::to_value(&rec)?, false);
            }
            Ok(changed)
        })
    }
}
