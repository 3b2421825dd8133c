//! `FsMemoryStore`: per-agent key/value memory on disk.
//!
//! Each key is one file, `<agents>/<agent>/memory/<key>.json`, holding
//! `{ key, value, timestamp, agent }`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use lemming_contracts::{
    agent::AgentId,
    error::{LemmingError, LemmingResult},
};
use lemming_core::{persist::write_json_atomic, traits::MemoryStore};

const MEMORY_DIR: &str = "memory";

/// On-disk form of one memory key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub key: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    pub agent: String,
}

/// Keys become file names, so they follow the same rules as agent ids.
pub fn validate_key(key: &str) -> LemmingResult<()> {
    let reason = if key.is_empty() {
        Some("memory key cannot be empty")
    } else if key.contains('/') || key.contains('\\') {
        Some("memory key contains a path separator")
    } else if key == "." || key == ".." {
        Some("memory key cannot be a directory reference")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(LemmingError::Memory { reason: format!("{}: '{}'", reason, key) }),
        None => Ok(()),
    }
}

pub struct FsMemoryStore {
    agents_dir: PathBuf,
}

impl FsMemoryStore {
    pub fn new(agents_dir: impl Into<PathBuf>) -> Self {
        Self { agents_dir: agents_dir.into() }
    }

    fn memory_dir(&self, agent: &AgentId) -> LemmingResult<PathBuf> {
        agent.validate()?;
        Ok(self.agents_dir.join(agent.as_str()).join(MEMORY_DIR))
    }

    fn key_path(&self, agent: &AgentId, key: &str) -> LemmingResult<PathBuf> {
        validate_key(key)?;
        Ok(self.memory_dir(agent)?.join(format!("{}.json", key)))
    }

    /// Read a full record. Malformed files read as absent.
    pub fn record(&self, agent: &AgentId, key: &str) -> LemmingResult<Option<MemoryRecord>> {
        let path = self.key_path(agent, key)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(memory_err(&path, e)),
        };
        match serde_json::from_str::<MemoryRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(agent = %agent, key, error = %e, "ignoring malformed memory file");
                Ok(None)
            }
        }
    }
}

fn memory_err(path: &Path, e: impl std::fmt::Display) -> LemmingError {
    LemmingError::Memory { reason: format!("{}: {}", path.display(), e) }
}

impl MemoryStore for FsMemoryStore {
    fn save(&self, agent: &AgentId, key: &str, value: &Value) -> LemmingResult<()> {
        let path = self.key_path(agent, key)?;
        let record = MemoryRecord {
            key: key.to_string(),
            value: value.clone(),
            timestamp: Utc::now(),
            agent: agent.to_string(),
        };
        write_json_atomic(&path, &record).map_err(|e| memory_err(&path, e))?;
        debug!(agent = %agent, key, "memory saved");
        Ok(())
    }

    fn load(&self, agent: &AgentId, key: &str) -> LemmingResult<Option<Value>> {
        Ok(self.record(agent, key)?.map(|record| record.value))
    }

    fn delete(&self, agent: &AgentId, key: &str) -> LemmingResult<bool> {
        let path = self.key_path(agent, key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(agent = %agent, key, "memory deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(memory_err(&path, e)),
        }
    }

    fn keys(&self, agent: &AgentId) -> LemmingResult<Vec<String>> {
        let dir = self.memory_dir(agent)?;
        let items = match fs::read_dir(&dir) {
            Ok(items) => items,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(memory_err(&dir, e)),
        };

        let mut keys: Vec<String> = items
            .filter_map(Result::ok)
            .filter_map(|item| {
                let name = item.file_name().to_str()?.to_string();
                name.strip_suffix(".json").map(str::to_string)
            })
            .filter(|key| validate_key(key).is_ok())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
