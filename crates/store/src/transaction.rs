use std::collections::HashMap;

use serde_json::Value;

use crate::store::{merge_values, DocumentStore};

pub(crate) enum StagedWrite {
    Set {
        collection: String,
        key: String,
        value: Value,
        merge: bool,
    },
    Delete {
        collection: String,
        key: String,
    },
}

/// Read/write handle passed to [`DocumentStore::transaction`].
///
/// Reads observe the transaction's own staged writes.  Writes become
/// visible to others only if the whole transaction commits.
pub struct Transaction<'a> {
    store: &'a DocumentStore,
    reads: HashMap<(String, String), u64>,
    writes: Vec<StagedWrite>,
    overlay: HashMap<(String, String), Option<Value>>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(store: &'a DocumentStore) -> Self {
        Self {
            store,
            reads: HashMap::new(),
            writes: Vec::new(),
            overlay: HashMap::new(),
        }
    }

    pub fn get(&mut self, collection: &str, key: &str) -> Option<Value> {
        let id = (collection.to_owned(), key.to_owned());
        if let Some(staged) = self.overlay.get(&id) {
            return staged.clone();
        }
        // Record the version before reading the value: if a writer lands
        // in between, the commit check sees a newer version and retries.
        let version = self.store.version_of(collection, key);
        self.reads.entry(id).or_insert(version);
        self.store.get(collection, key)
    }

    pub fn set(&mut self, collection: &str, key: &str, value: Value, merge: bool) {
        let id = (collection.to_owned(), key.to_owned());
        let visible = if merge {
            let base = match self.overlay.get(&id) {
                Some(staged) => staged.clone(),
                None => self.store.get(collection, key),
            };
            match base {
                Some(b) => merge_values(b, value.clone()),
                None => value.clone(),
            }
        } else {
            value.clone()
        };
        self.overlay.insert(id, Some(visible));
        self.writes.push(StagedWrite::Set {
            collection: collection.to_owned(),
            key: key.to_owned(),
            value,
            merge,
        });
    }

    pub fn delete(&mut self, collection: &str, key: &str) {
        self.overlay
            .insert((collection.to_owned(), key.to_owned()), None);
        self.writes.push(StagedWrite::Delete {
            collection: collection.to_owned(),
            key: key.to_owned(),
        });
    }

    pub(crate) fn into_parts(self) -> (HashMap<(String, String), u64>, Vec<StagedWrite>) {
        (self.reads, self.writes)
    }
}

#[cfg(test)]
mod tests {
    use crate::DocumentStore;
    use serde_json::json;

    #[test]
    fn reads_see_staged_writes() {
        let store = DocumentStore::in_memory();
        store.set("c", "k", json!({ "a": 1 }), false).unwrap();
        store
            .transaction(|tx| {
                tx.set("c", "k", json!({ "b": 2 }), true);
                assert_eq!(tx.get("c", "k"), Some(json!({ "a": 1, "b": 2 })));
                tx.delete("c", "k");
                assert_eq!(tx.get("c", "k"), None);
                Ok(())
            })
            .unwrap();
        assert_eq!(store.get("c", "k"), None);
    }
}
