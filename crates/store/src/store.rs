use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use rd_domain::config::StorageConfig;
use rd_domain::error::{Error, Result};

use crate::filter::Filter;
use crate::transaction::{StagedWrite, Transaction};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A document returned from a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub value: Value,
}

impl Document {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Versioned {
    pub(crate) version: u64,
    pub(crate) value: Value,
}

type Collection = BTreeMap<String, Versioned>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DocumentStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    /// `None` = memory only.
    dir: Option<PathBuf>,
    max_retries: u32,
}

impl DocumentStore {
    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            dir: None,
            max_retries: 5,
        }
    }

    /// Open (or create) a file-backed store under `state_path/store`.
    pub fn open(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("store");
        std::fs::create_dir_all(&dir)?;

        let mut collections = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path)?;
            let docs: BTreeMap<String, Value> = match serde_json::from_str(&raw) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable collection file");
                    continue;
                }
            };
            let collection: Collection = docs
                .into_iter()
                .map(|(k, value)| (k, Versioned { version: 1, value }))
                .collect();
            collections.insert(name.to_owned(), collection);
        }

        tracing::info!(
            collections = collections.len(),
            path = %dir.display(),
            "document store loaded"
        );

        Ok(Self {
            collections: RwLock::new(collections),
            dir: Some(dir),
            max_retries: 5,
        })
    }

    /// Build a store from the `[storage]` config section.
    pub fn from_config(cfg: &StorageConfig) -> Result<Self> {
        let store = if cfg.in_memory {
            Self::in_memory()
        } else {
            Self::open(&cfg.state_path)?
        };
        Ok(store.with_max_retries(cfg.transaction_retries))
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn get(&self, collection: &str, key: &str) -> Option<Value> {
        self.collections
            .read()
            .get(collection)
            .and_then(|c| c.get(key))
            .map(|d| d.value.clone())
    }

    /// Typed variant of [`get`](Self::get).
    pub fn get_as<T: DeserializeOwned>(&self, collection: &str, key: &str) -> Result<Option<T>> {
        match self.get(collection, key) {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// All documents in `collection` matching every filter, in key order.
    pub fn query(&self, collection: &str, filters: &[Filter]) -> Vec<Document> {
        let collections = self.collections.read();
        let Some(c) = collections.get(collection) else {
            return Vec::new();
        };
        c.iter()
            .filter(|(_, d)| filters.iter().all(|f| f.matches(&d.value)))
            .map(|(k, d)| Document {
                key: k.clone(),
                value: d.value.clone(),
            })
            .collect()
    }

    pub(crate) fn version_of(&self, collection: &str, key: &str) -> u64 {
        self.collections
            .read()
            .get(collection)
            .and_then(|c| c.get(key))
            .map(|d| d.version)
            .unwrap_or(0)
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Write a document.  With `merge`, top-level fields of an object value
    /// are merged into an existing object document instead of replacing it.
    pub fn set(&self, collection: &str, key: &str, value: Value, merge: bool) -> Result<()> {
        self.commit(
            &HashMap::new(),
            vec![StagedWrite::Set {
                collection: collection.to_owned(),
                key: key.to_owned(),
                value,
                merge,
            }],
        )
        .map(|_| ())
    }

    /// Serialize and write a document, replacing any previous value.
    pub fn put<T: Serialize>(&self, collection: &str, key: &str, value: &T) -> Result<()> {
        self.set(collection, key, serde_json::to_value(value)?, false)
    }

    /// Remove a document.  Returns whether it existed.
    pub fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        let existed = self.version_of(collection, key) > 0;
        self.commit(
            &HashMap::new(),
            vec![StagedWrite::Delete {
                collection: collection.to_owned(),
                key: key.to_owned(),
            }],
        )?;
        Ok(existed)
    }

    // ── Transactions ───────────────────────────────────────────────

    /// Run an optimistic read-modify-write.
    ///
    /// `f` reads and stages writes through the [`Transaction`].  At commit
    /// every document `f` read is checked against its current version; if
    /// any changed, all staged writes are discarded and `f` runs again.
    /// After the retry budget is spent the call fails with
    /// [`Error::Conflict`].  If `f` returns `Err`, nothing is written.
    pub fn transaction<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let mut tx = Transaction::new(self);
            let out = f(&mut tx)?;
            let (reads, writes) = tx.into_parts();
            match self.commit(&reads, writes) {
                Ok(()) => return Ok(out),
                Err(Error::Conflict(msg)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, %msg, "transaction conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Validate read versions and apply writes atomically.
    fn commit(
        &self,
        reads: &HashMap<(String, String), u64>,
        writes: Vec<StagedWrite>,
    ) -> Result<()> {
        let mut collections = self.collections.write();

        for ((collection, key), seen) in reads {
            let current = collections
                .get(collection)
                .and_then(|c| c.get(key))
                .map(|d| d.version)
                .unwrap_or(0);
            if current != *seen {
                return Err(Error::Conflict(format!(
                    "{collection}/{key} changed (expected v{seen}, found v{current})"
                )));
            }
        }

        let mut touched = HashSet::new();
        for write in writes {
            match write {
                StagedWrite::Set {
                    collection,
                    key,
                    value,
                    merge,
                } => {
                    let c = collections.entry(collection.clone()).or_default();
                    match c.get_mut(&key) {
                        Some(existing) => {
                            existing.value = if merge {
                                merge_values(existing.value.take(), value)
                            } else {
                                value
                            };
                            existing.version += 1;
                        }
                        None => {
                            c.insert(key, Versioned { version: 1, value });
                        }
                    }
                    touched.insert(collection);
                }
                StagedWrite::Delete { collection, key } => {
                    if let Some(c) = collections.get_mut(&collection) {
                        if c.remove(&key).is_some() {
                            touched.insert(collection);
                        }
                    }
                }
            }
        }

        if let Some(dir) = &self.dir {
            for name in touched {
                if let Some(c) = collections.get(&name) {
                    persist_collection(dir, &name, c);
                }
            }
        }
        Ok(())
    }
}

/// Shallow merge: object fields of `patch` overwrite those of `base`.
/// Anything other than object-into-object replaces `base`.
pub(crate) fn merge_values(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut b), Value::Object(p)) => {
            for (k, v) in p {
                b.insert(k, v);
            }
            Value::Object(b)
        }
        (_, p) => p,
    }
}

fn persist_collection(dir: &Path, name: &str, collection: &Collection) {
    let docs: BTreeMap<&String, &Value> = collection.iter().map(|(k, d)| (k, &d.value)).collect();
    let json = match serde_json::to_string_pretty(&docs) {
        Ok(j) => j,
        Err(e) => {
            tracing::warn!(collection = name, error = %e, "failed to serialize collection");
            return;
        }
    };
    let path = dir.join(format!("{name}.json"));
    let tmp = dir.join(format!(".{name}.json.tmp"));
    if let Err(e) = std::fs::write(&tmp, json).and_then(|_| std::fs::rename(&tmp, &path)) {
        tracing::warn!(collection = name, error = %e, "failed to persist collection");
    }
}
