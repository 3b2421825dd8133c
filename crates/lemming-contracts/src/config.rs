//! Engine configuration knobs.
//!
//! Owned by the hosting application and read by the engine. `lemming-config`
//! loads this from TOML; every field has a default so a partial file works.

use serde::{Deserialize, Serialize};

/// Timing, retention and context limits for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock pause between ticks in `run_forever`.
    pub base_turn_seconds: f64,
    /// Stop `run_forever` after this tick. `None` runs until stopped.
    pub max_ticks: Option<u64>,
    /// Retention runs on ticks where `tick % interval == 0`.
    pub outbox_cleanup_interval_ticks: u64,
    /// Entries with `current_tick - tick > max_outbox_age_ticks` are removed.
    pub max_outbox_age_ticks: u64,
    /// How many incoming entries are read into each agent's context.
    pub context_entry_limit: usize,
    /// Character budget for the incoming-message digest.
    pub context_max_chars: usize,
    /// Sampling temperature used when an agent does not override it.
    pub temperature: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_turn_seconds: 10.0,
            max_ticks: None,
            outbox_cleanup_interval_ticks: 10,
            max_outbox_age_ticks: 100,
            context_entry_limit: 50,
            context_max_chars: 8000,
            temperature: 0.2,
        }
    }
}

impl EngineConfig {
    /// The cleanup interval, never zero.
    pub fn cleanup_interval(&self) -> u64 {
        self.outbox_cleanup_interval_ticks.max(1)
    }

    /// True when retention should run at the end of `tick`.
    pub fn is_cleanup_tick(&self, tick: u64) -> bool {
        tick % self.cleanup_interval() == 0
    }
}
