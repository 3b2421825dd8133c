//! Turn-level results and the reports the engine hands back to callers.
//!
//! `TurnResult` is what the decoder extracts from a generator response; it is
//! applied and then discarded. `TurnOutcome` and `TickReport` are what
//! `Engine::run_tick` returns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::AgentId;

/// An outbox entry the generator asked to publish, before routing checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxDraft {
    pub kind: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "to")]
    pub recipients: Option<Vec<AgentId>>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl OutboxDraft {
    /// A `message` draft with an empty payload.
    pub fn message() -> Self {
        Self {
            kind: "message".to_string(),
            payload: Map::new(),
            tags: Vec::new(),
            recipients: None,
            meta: Map::new(),
        }
    }
}

/// A request to run a named tool with JSON arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// What to do with a memory key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoryOp {
    Write,
    Delete,
    /// Anything else. Logged and ignored when applied.
    Other(String),
}

impl From<String> for MemoryOp {
    fn from(op: String) -> Self {
        match op.as_str() {
            "write" => MemoryOp::Write,
            "delete" => MemoryOp::Delete,
            _ => MemoryOp::Other(op),
        }
    }
}

impl From<MemoryOp> for String {
    fn from(op: MemoryOp) -> Self {
        match op {
            MemoryOp::Write => "write".to_string(),
            MemoryOp::Delete => "delete".to_string(),
            MemoryOp::Other(other) => other,
        }
    }
}

/// A single memory mutation requested by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_op")]
    pub op: MemoryOp,
}

fn default_op() -> MemoryOp {
    MemoryOp::Write
}

/// The structured result of one generator response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub outbox_entries: Vec<OutboxDraft>,
    pub tool_calls: Vec<ToolCall>,
    pub memory_updates: Vec<MemoryUpdate>,
    pub notes: String,
}

impl TurnResult {
    pub fn is_empty(&self) -> bool {
        self.outbox_entries.is_empty()
            && self.tool_calls.is_empty()
            && self.memory_updates.is_empty()
            && self.notes.is_empty()
    }
}

/// The outcome of a single tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into(), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, output: String::new(), error: Some(error.into()) }
    }
}

/// What one completed turn did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub tick: u64,
    /// Ids of the entries written to the agent's outbox, in write order.
    pub entries_written: Vec<String>,
    pub entries_dropped: usize,
    pub tool_results: Vec<ToolResult>,
    pub memory_applied: usize,
    pub memory_skipped: usize,
    pub violations: usize,
    pub notes: String,
    pub duration_ms: u64,
}

/// The outcome of one agent's turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TurnOutcome {
    /// The turn never ran; no generator call, no side effects.
    Skipped { reason: String },
    Completed(TurnSummary),
}

impl TurnOutcome {
    pub fn summary(&self) -> Option<&TurnSummary> {
        match self {
            TurnOutcome::Completed(summary) => Some(summary),
            TurnOutcome::Skipped { .. } => None,
        }
    }
}

/// Everything that happened in one tick, in firing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub turns: Vec<(AgentId, TurnOutcome)>,
    /// Entries removed by retention, when cleanup ran on this tick.
    pub cleaned: Option<usize>,
}

impl TickReport {
    pub fn new(tick: u64) -> Self {
        Self { tick, turns: Vec::new(), cleaned: None }
    }

    /// The agents that fired, in the order they ran.
    pub fn fired(&self) -> Vec<&AgentId> {
        self.turns.iter().map(|(id, _)| id).collect()
    }

    pub fn outcome(&self, agent: &AgentId) -> Option<&TurnOutcome> {
        self.turns.iter().find(|(id, _)| id == agent).map(|(_, outcome)| outcome)
    }
}
