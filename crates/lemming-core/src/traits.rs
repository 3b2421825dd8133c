//! Collaborator trait definitions for the LeMMing engine.
//!
//! The engine owns scheduling and the turn state machine. Everything else is
//! consumed through these seams:
//!
//! - `AgentDirectory`  : the current set of agent descriptors
//! - `OutboxStore`     : the durable message bus
//! - `Generator`       : the language-model call (untrusted output)
//! - `ResponseDecoder` : turns raw generator text into a `TurnResult`
//! - `ToolExecutor`, `MemoryStore`, `CreditLedger`, `ActionLogger`:
//!   small side-effecting functions invoked once per turn
//!
//! Reference implementations live in `lemming-outbox`, `lemming-verify`,
//! `lemming-config` and `lemming-local`.

use serde_json::{Map, Value};

use lemming_contracts::{
    agent::{AgentDescriptor, AgentId, Balance},
    error::LemmingResult,
    outbox::OutboxEntry,
    prompt::PromptMessage,
    turn::ToolResult,
    violation::DecodeReport,
};

/// Source of the agent set. Snapshotted once at the start of every tick.
pub trait AgentDirectory: Send + Sync {
    fn agents(&self) -> LemmingResult<Vec<AgentDescriptor>>;
}

impl AgentDirectory for Vec<AgentDescriptor> {
    fn agents(&self) -> LemmingResult<Vec<AgentDescriptor>> {
        Ok(self.clone())
    }
}

/// The per-agent, append-only outbox log.
///
/// Readers return entries newest first: `(tick, created_at, id)` descending.
/// A missing outbox is an empty outbox, never an error.
pub trait OutboxStore: Send + Sync {
    /// Persist one entry to `agent`'s outbox. The entry is fully written
    /// before it becomes visible to readers.
    fn append(&self, agent: &AgentId, entry: &OutboxEntry) -> LemmingResult<()>;

    /// At most `limit` entries from one outbox, excluding ticks below `since_tick`.
    fn read_recent(
        &self,
        agent: &AgentId,
        limit: usize,
        since_tick: Option<u64>,
    ) -> LemmingResult<Vec<OutboxEntry>>;

    /// The globally newest `limit` entries across several outboxes.
    ///
    /// Unreadable entries are skipped and do not count against `limit`, in
    /// this and in `read_recent`.
    fn read_recent_merged(
        &self,
        agents: &[AgentId],
        limit: usize,
        since_tick: Option<u64>,
    ) -> LemmingResult<Vec<OutboxEntry>>;

    /// Number of entries in one outbox, without parsing them.
    fn count(&self, agent: &AgentId) -> LemmingResult<usize>;

    /// Remove every entry with `current_tick - tick > max_age_ticks`.
    ///
    /// Returns how many were removed. A failure on one file is logged and the
    /// sweep continues.
    fn prune(&self, current_tick: u64, max_age_ticks: u64) -> LemmingResult<usize>;

    /// Every agent that has a directory in the store, excluding the template.
    /// Resolved at call time.
    fn known_agents(&self) -> LemmingResult<Vec<AgentId>>;
}

/// The language-model call. Retries and breakers belong in decorators around
/// an implementation; the engine only sees success or failure.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        model_key: &str,
        messages: &[PromptMessage],
        temperature: f64,
    ) -> LemmingResult<String>;
}

/// Decodes raw generator text. Never fails: malformed input yields a default
/// result plus violations.
pub trait ResponseDecoder: Send + Sync {
    fn decode(&self, raw: &str, agent: &AgentId, tick: u64) -> DecodeReport;
}

/// Runs a permitted tool. Permission checks happen in the engine before this
/// is called.
pub trait ToolExecutor: Send + Sync {
    fn execute(&self, agent: &AgentId, tool: &str, args: &Map<String, Value>) -> ToolResult;
}

/// Per-agent key/value memory.
pub trait MemoryStore: Send + Sync {
    fn save(&self, agent: &AgentId, key: &str, value: &Value) -> LemmingResult<()>;

    /// `Ok(None)` for a missing key.
    fn load(&self, agent: &AgentId, key: &str) -> LemmingResult<Option<Value>>;

    /// Returns `false` when the key did not exist.
    fn delete(&self, agent: &AgentId, key: &str) -> LemmingResult<bool>;

    /// Stored keys, sorted.
    fn keys(&self, agent: &AgentId) -> LemmingResult<Vec<String>>;
}

/// Tracks how many credits each agent has left.
pub trait CreditLedger: Send + Sync {
    fn balance(&self, agent: &AgentId) -> LemmingResult<Balance>;

    /// Subtract `amount` and return the new balance.
    fn deduct(&self, agent: &AgentId, amount: f64) -> LemmingResult<Balance>;
}

/// Structured observability sink. Never affects control flow.
pub trait ActionLogger: Send + Sync {
    fn log_agent_action(&self, agent: &AgentId, event: &str, fields: &Value);

    fn log_engine_event(&self, event: &str, fields: &Value);
}
