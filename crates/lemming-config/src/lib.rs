//! # lemming-config
//!
//! TOML configuration and on-disk layout for a LeMMing organisation.
//!
//! ## Overview
//!
//! - [`settings`] loads [`EngineConfig`](lemming_contracts::config::EngineConfig)
//!   from `engine.toml` and rejects values the engine cannot run with.
//! - [`workspace`] names every path the runtime reads or writes.
//! - [`agents`] discovers agents from `agents/<name>/agent.toml` and exposes
//!   them through [`TomlAgentDirectory`], an
//!   [`AgentDirectory`](lemming_core::traits::AgentDirectory).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lemming_config::{settings, TomlAgentDirectory, Workspace};
//!
//! let ws = Workspace::new("./org");
//! let config = settings::load_or_default(&ws.engine_config_path())?;
//! let agents = TomlAgentDirectory::new(ws.agents_dir());
//! ```
//!
//! ## Agent descriptor
//!
//! ```toml
//! name = "scout"
//! title = "Scout"
//! instructions = "Look for leads and report them."
//!
//! [model]
//! key = "scripted"
//!
//! [schedule]
//! run_every_n_ticks = 2
//! phase_offset = 1
//!
//! [permissions]
//! read_outboxes = ["planner"]
//! send_outboxes = ["planner"]
//! tools = ["echo"]
//!
//! [credits]
//! max_credits = 50.0
//! cost_per_action = 0.5
//! ```

pub mod agents;
pub mod settings;
pub mod workspace;

pub use agents::{load_agents, parse_descriptor, TomlAgentDirectory};
pub use settings::{load_or_default, LoadToml};
pub use workspace::Workspace;

// ── Tests ─────────────────────────────────────────────────────────────────────
