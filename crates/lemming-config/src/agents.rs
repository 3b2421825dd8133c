//! Agent discovery from `agents/<name>/agent.toml`.
//!
//! Discovery is forgiving: one broken agent never hides the others. Each
//! skipped folder is reported with a warning naming the reason.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use lemming_contracts::{
    agent::{AgentDescriptor, AgentId},
    error::{LemmingError, LemmingResult},
};
use lemming_core::traits::AgentDirectory;

use crate::workspace::DESCRIPTOR_FILE;

/// Parse one descriptor. `folder` supplies `name` when the file omits it.
pub fn parse_descriptor(s: &str, folder: &str) -> LemmingResult<AgentDescriptor> {
    let mut table: toml::Table = toml::from_str(s).map_err(|e| LemmingError::ConfigError {
        reason: format!("failed to parse agent TOML: {}", e),
    })?;

    if !table.contains_key("name") {
        table.insert("name".to_string(), toml::Value::String(folder.to_string()));
    }

    let descriptor: AgentDescriptor =
        toml::Value::Table(table).try_into().map_err(|e: toml::de::Error| LemmingError::ConfigError {
            reason: format!("invalid agent descriptor: {}", e),
        })?;
    descriptor.id.validate()?;
    Ok(descriptor)
}

/// Load every agent under `agents_dir`, sorted by folder name.
///
/// The template folder and hidden folders are never agents. A missing
/// `agents_dir` yields an empty list.
pub fn load_agents(agents_dir: &Path) -> LemmingResult<Vec<AgentDescriptor>> {
    let items = match fs::read_dir(agents_dir) {
        Ok(items) => items,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(dir = %agents_dir.display(), "agents directory missing");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(LemmingError::ConfigError {
                reason: format!("failed to list agents directory '{}': {}", agents_dir.display(), e),
            })
        }
    };

    let mut folders: Vec<(String, PathBuf)> = items
        .filter_map(Result::ok)
        .filter(|item| item.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|item| item.file_name().to_str().map(|name| (name.to_string(), item.path())))
        .filter(|(name, _)| !name.starts_with('.') && !AgentId::new(name.as_str()).is_template())
        .collect();
    folders.sort();

    let mut agents: Vec<AgentDescriptor> = Vec::with_capacity(folders.len());
    for (folder, path) in folders {
        let file = path.join(DESCRIPTOR_FILE);
        let raw = match fs::read_to_string(&file) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(folder = %folder, "skipping folder without {}", DESCRIPTOR_FILE);
                continue;
            }
            Err(e) => {
                warn!(path = %file.display(), error = %e, "skipping unreadable agent descriptor");
                continue;
            }
        };

        let descriptor = match parse_descriptor(&raw, &folder) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "skipping invalid agent descriptor");
                continue;
            }
        };

        if descriptor.id.as_str() != folder {
            warn!(folder = %folder, name = %descriptor.id, "agent name differs from its folder");
        }
        if agents.iter().any(|a| a.id == descriptor.id) {
            warn!(folder = %folder, name = %descriptor.id, "skipping duplicate agent name");
            continue;
        }
        agents.push(descriptor);
    }

    debug!(dir = %agents_dir.display(), count = agents.len(), "agents discovered");
    Ok(agents)
}

/// `AgentDirectory` that rescans the agents directory on every call, so
/// agents added or edited between ticks are picked up.
#[derive(Debug, Clone)]
pub struct TomlAgentDirectory {
    agents_dir: PathBuf,
}

impl TomlAgentDirectory {
    pub fn new(agents_dir: impl Into<PathBuf>) -> Self {
        Self { agents_dir: agents_dir.into() }
    }

    pub fn agents_dir(&self) -> &Path {
        &self.agents_dir
    }
}

impl AgentDirectory for TomlAgentDirectory {
    fn agents(&self) -> LemmingResult<Vec<AgentDescriptor>> {
        load_agents(&self.agents_dir)
    }
}
