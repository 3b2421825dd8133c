//! On-disk layout of a LeMMing organisation.
//!
//! ```text
//! <base>/
//!   agents/<agent>/agent.toml
//!   agents/<agent>/outbox/
//!   agents/<agent>/memory/
//!   agents/<agent>/logs/
//!   agents/agent_template/        scaffold, never an agent
//!   lemming/config/engine.toml
//!   lemming/config/tick.json
//!   lemming/config/credits.json
//! ```

use std::path::{Path, PathBuf};

use lemming_contracts::{
    agent::{AgentId, TEMPLATE_AGENT},
    error::LemmingResult,
};

pub const AGENTS_DIR: &str = "agents";
pub const DESCRIPTOR_FILE: &str = "agent.toml";
pub const OUTBOX_DIR: &str = "outbox";
pub const MEMORY_DIR: &str = "memory";
pub const LOGS_DIR: &str = "logs";

/// Paths for one organisation rooted at `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    base: PathBuf,
}

impl Workspace {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.base.join(AGENTS_DIR)
    }

    pub fn template_dir(&self) -> PathBuf {
        self.agents_dir().join(TEMPLATE_AGENT)
    }

    /// `agents/<agent>`, after checking the id is a safe path segment.
    pub fn agent_dir(&self, agent: &AgentId) -> LemmingResult<PathBuf> {
        agent.validate()?;
        Ok(self.agents_dir().join(agent.as_str()))
    }

    pub fn descriptor_path(&self, agent: &AgentId) -> LemmingResult<PathBuf> {
        Ok(self.agent_dir(agent)?.join(DESCRIPTOR_FILE))
    }

    pub fn outbox_dir(&self, agent: &AgentId) -> LemmingResult<PathBuf> {
        Ok(self.agent_dir(agent)?.join(OUTBOX_DIR))
    }

    pub fn memory_dir(&self, agent: &AgentId) -> LemmingResult<PathBuf> {
        Ok(self.agent_dir(agent)?.join(MEMORY_DIR))
    }

    pub fn logs_dir(&self, agent: &AgentId) -> LemmingResult<PathBuf> {
        Ok(self.agent_dir(agent)?.join(LOGS_DIR))
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base.join("lemming").join("config")
    }

    pub fn engine_config_path(&self) -> PathBuf {
        self.config_dir().join("engine.toml")
    }

    pub fn tick_path(&self) -> PathBuf {
        self.config_dir().join("tick.json")
    }

    pub fn credits_path(&self) -> PathBuf {
        self.config_dir().join("credits.json")
    }
}
