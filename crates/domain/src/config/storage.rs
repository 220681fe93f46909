use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the turn & block store keeps its append-only JSONL logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "d_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: d_root() }
    }
}

fn d_root() -> PathBuf {
    PathBuf::from("./data/engine")
}
