//! `TracingActionLogger`: routes engine observations into `tracing` and
//! keeps a per-agent activity log.
//!
//! Agent actions are also appended as JSON lines to
//! `<agents>/<agent>/logs/activity.log`, so an agent's notes and turn history
//! can be read back without a log collector.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use lemming_contracts::agent::AgentId;
use lemming_core::traits::ActionLogger;

pub const ACTIVITY_LOG: &str = "activity.log";

/// Events that indicate something was dropped or rejected.
const WARN_EVENTS: &[&str] = &["contract_violation", "outbox_entry_dropped", "tick_aborted", "outbox_cleanup_failed"];

#[derive(Debug, Clone, Default)]
pub struct TracingActionLogger {
    agents_dir: Option<PathBuf>,
}

impl TracingActionLogger {
    /// A logger that only emits `tracing` events.
    pub fn new() -> Self {
        Self::default()
    }

    /// A logger that also appends to each agent's activity log.
    pub fn with_activity_logs(agents_dir: impl Into<PathBuf>) -> Self {
        Self { agents_dir: Some(agents_dir.into()) }
    }

    pub fn activity_log_path(&self, agent: &AgentId) -> Option<PathBuf> {
        let dir = self.agents_dir.as_ref()?;
        agent.validate().ok()?;
        Some(dir.join(agent.as_str()).join("logs").join(ACTIVITY_LOG))
    }

    fn append_activity(&self, agent: &AgentId, event: &str, fields: &Value) {
        let Some(path) = self.activity_log_path(agent) else {
            return;
        };
        let line = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "agent": agent,
            "event": event,
            "fields": fields,
        });

        let written = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| OpenOptions::new().create(true).append(true).open(&path))
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = written {
            warn!(agent = %agent, path = %path.display(), error = %e, "failed to append activity log");
        }
    }
}

impl ActionLogger for TracingActionLogger {
    fn log_agent_action(&self, agent: &AgentId, event: &str, fields: &Value) {
        if WARN_EVENTS.contains(&event) {
            warn!(target: "lemming::agent", agent = %agent, event, fields = %fields);
        } else {
            info!(target: "lemming::agent", agent = %agent, event, fields = %fields);
        }
        self.append_activity(agent, event, fields);
    }

    fn log_engine_event(&self, event: &str, fields: &Value) {
        if WARN_EVENTS.contains(&event) {
            warn!(target: "lemming::engine", event, fields = %fields);
        } else {
            info!(target: "lemming::engine", event, fields = %fields);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_actions_append_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TracingActionLogger::with_activity_logs(dir.path());
        let agent = AgentId::new("scout");

        logger.log_agent_action(&agent, "notes", &json!({ "tick": 3, "notes": "checked the inbox" }));
        logger.log_agent_action(&agent, "turn_completed", &json!({ "tick": 3 }));
        logger.log_engine_event("tick_completed", &json!({ "tick": 3 }));

        let raw = fs::read_to_string(dir.path().join("scout/logs/activity.log")).unwrap();
        let lines: Vec<Value> = raw.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "notes");
        assert_eq!(lines[0]["fields"]["notes"], "checked the inbox");
        assert_eq!(lines[1]["agent"], "scout");
    }

    #[test]
    fn plain_logger_writes_nothing() {
        let logger = TracingActionLogger::new();
        assert!(logger.activity_log_path(&AgentId::new("scout")).is_none());
        logger.log_agent_action(&AgentId::new("scout"), "notes", &json!({}));
    }
}
