use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the document store keeps its collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for persisted state (`<state_path>/store/*.json`).
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// Keep everything in memory and never touch the filesystem.
    #[serde(default)]
    pub in_memory: bool,
    /// How many times an optimistic transaction is retried on conflict.
    #[serde(default = "d_max_retries")]
    pub transaction_retries: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            in_memory: false,
            transaction_retries: d_max_retries(),
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}

fn d_max_retries() -> u32 {
    5
}
