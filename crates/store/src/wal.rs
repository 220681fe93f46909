//! Append-only JSONL write-ahead log, one file per entity kind.
//!
//! Mirrors the run-store ring-buffer-plus-index pattern used elsewhere in
//! the gateway, generalized to an unbounded durable log: turns and blocks
//! are never evicted by the store itself, only by the stream registry's
//! hub sweeper, so there's no bounded-ring trimming here — just append and
//! full replay on startup.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

pub struct Wal {
    path: PathBuf,
}

impl Wal {
    pub fn new(dir: &Path, file_name: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(file_name),
        })
    }

    /// Replay every record in the log, in append order.
    pub fn load<T: DeserializeOwned>(&self) -> Vec<T> {
        let mut records = Vec::new();
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return records;
        };
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = lineno,
                        error = %e,
                        "skipping unreadable WAL record"
                    );
                }
            }
        }
        records
    }

    /// Append one record. Best-effort: a write failure is logged, not
    /// propagated — the in-memory index is already the source of truth for
    /// the running process; only a restart would expose a gap.
    pub fn append<T: Serialize>(&self, record: &T) {
        let Ok(json) = serde_json::to_string(record) else {
            tracing::error!(path = %self.path.display(), "WAL record failed to serialize");
            return;
        };
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{json}") {
                    tracing::error!(path = %self.path.display(), error = %e, "WAL append failed");
                }
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to open WAL for append");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rec {
        n: u32,
    }

    #[test]
    fn append_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::new(dir.path(), "x.jsonl").unwrap();
        wal.append(&Rec { n: 1 });
        wal.append(&Rec { n: 2 });

        let loaded: Vec<Rec> = wal.load();
        assert_eq!(loaded, vec![Rec { n: 1 }, Rec { n: 2 }]);
    }

    #[test]
    fn load_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::new(dir.path(), "missing.jsonl").unwrap();
        let loaded: Vec<Rec> = wal.load();
        assert!(loaded.is_empty());
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::new(dir.path(), "x.jsonl").unwrap();
        wal.append(&Rec { n: 1 });
        std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("x.jsonl"))
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();
        wal.append(&Rec { n: 2 });

        let loaded: Vec<Rec> = wal.load();
        assert_eq!(loaded, vec![Rec { n: 1 }, Rec { n: 2 }]);
    }
}
