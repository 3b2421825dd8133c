//! The persisted logical clock.
//!
//! Stored as `{"current_tick": n}`. A missing or unreadable file means
//! tick 1; only writes can fail.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lemming_contracts::error::{LemmingError, LemmingResult};

use crate::persist::write_json_atomic;

/// Tick used when no valid clock state exists.
pub const DEFAULT_TICK: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ClockRecord {
    current_tick: u64,
}

/// File-backed current tick.
#[derive(Debug, Clone)]
pub struct TickClock {
    path: PathBuf,
}

impl TickClock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The persisted tick, or `DEFAULT_TICK` with a warning.
    pub fn load(&self) -> u64 {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "tick file missing, starting at tick {}", DEFAULT_TICK);
                return DEFAULT_TICK;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "tick file unreadable, starting at tick {}", DEFAULT_TICK);
                return DEFAULT_TICK;
            }
        };

        match serde_json::from_str::<ClockRecord>(&raw) {
            Ok(record) => record.current_tick,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "tick file invalid, starting at tick {}", DEFAULT_TICK);
                DEFAULT_TICK
            }
        }
    }

    /// Persist `tick` as the next tick to run.
    ///
    /// Written to a sibling temp file and renamed into place, so a crash
    /// leaves either the old or the new value.
    pub fn save(&self, tick: u64) -> LemmingResult<()> {
        write_json_atomic(&self.path, &ClockRecord { current_tick: tick }).map_err(|e| LemmingError::StateIo {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        debug!(path = %self.path.display(), tick, "tick persisted");
        Ok(())
    }
}
