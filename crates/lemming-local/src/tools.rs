//! Named tool functions and the registry that dispatches to them.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use lemming_contracts::{agent::AgentId, turn::ToolResult};
use lemming_core::traits::ToolExecutor;

/// One callable tool. Failures are reported in the `ToolResult`.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn execute(&self, agent: &AgentId, args: &Map<String, Value>) -> ToolResult;
}

/// Returns its `text` argument unchanged.
pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the `text` argument unchanged."
    }

    fn execute(&self, _agent: &AgentId, args: &Map<String, Value>) -> ToolResult {
        match args.get("text") {
            Some(Value::String(text)) => ToolResult::ok(text.clone()),
            Some(other) => ToolResult::ok(other.to_string()),
            None => ToolResult::failed("missing 'text' argument"),
        }
    }
}

/// Registry of tools keyed by name.
#[derive(Default)]
pub struct BuiltinTools {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl BuiltinTools {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in tools.
    pub fn with_defaults() -> Self {
        let mut tools = Self::new();
        tools.register(Box::new(EchoTool));
        tools
    }

    /// Add `tool`, replacing any tool of the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// `(name, description)` pairs in name order.
    pub fn list(&self) -> Vec<(&str, &str)> {
        self.tools.values().map(|t| (t.name(), t.description())).collect()
    }
}

impl ToolExecutor for BuiltinTools {
    fn execute(&self, agent: &AgentId, tool: &str, args: &Map<String, Value>) -> ToolResult {
        let Some(found) = self.tools.get(tool) else {
            return ToolResult::failed(format!("unknown tool '{}'", tool));
        };
        let result = found.execute(agent, args);
        debug!(agent = %agent, tool, success = result.success, "tool executed");
        result
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
