//! Agent identity and descriptor types.
//!
//! An `AgentDescriptor` is owned by whatever loads the organisation (see
//! `lemming-config`); the engine only ever reads it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LemmingError, LemmingResult};

/// Directory name reserved for the scaffold copied when creating new agents.
/// Never treated as a live agent or a readable outbox.
pub const TEMPLATE_AGENT: &str = "agent_template";

/// The wildcard accepted in permission lists.
pub const WILDCARD: &str = "*";

/// Stable identifier for an agent. Doubles as its directory name on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Build an id without validation. Use `parse` for untrusted input.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an id, rejecting values that are unsafe to use as a path segment.
    pub fn parse(id: impl Into<String>) -> LemmingResult<Self> {
        let id = Self(id.into());
        id.validate()?;
        Ok(id)
    }

    /// Reject empty ids, path separators, and `.` / `..`.
    pub fn validate(&self) -> LemmingResult<()> {
        let reason = if self.0.is_empty() {
            Some("agent id cannot be empty")
        } else if self.0.contains('/') || self.0.contains('\\') {
            Some("agent id contains a path separator")
        } else if self.0 == "." || self.0 == ".." {
            Some("agent id cannot be a directory reference")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(LemmingError::InvalidAgentId {
                id: self.0.clone(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the reserved scaffold directory name.
    pub fn is_template(&self) -> bool {
        self.0 == TEMPLATE_AGENT
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ── Schedule ──────────────────────────────────────────────────────────────────

/// When an agent fires, expressed as a period and a phase within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Period in ticks. Values `<= 0` are treated as 1 (fires every tick).
    #[serde(default = "default_every")]
    pub run_every_n_ticks: i64,
    /// Phase offset within the period. May be negative or exceed the period.
    #[serde(default)]
    pub phase_offset: i64,
}

fn default_every() -> i64 {
    1
}

impl Schedule {
    pub fn new(run_every_n_ticks: i64, phase_offset: i64) -> Self {
        Self { run_every_n_ticks, phase_offset }
    }

    /// The effective period `N = max(run_every_n_ticks, 1)`.
    pub fn period(&self) -> u64 {
        self.run_every_n_ticks.max(1) as u64
    }

    /// The phase offset reduced into `[0, N)`.
    pub fn phase(&self) -> u64 {
        self.phase_offset.rem_euclid(self.period() as i64) as u64
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

// ── Model ─────────────────────────────────────────────────────────────────────

/// Which model the generator should use for this agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub key: String,
    /// Overrides the engine-wide temperature when set.
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self { key: "default".to_string(), temperature: None }
    }
}

// ── Permissions ───────────────────────────────────────────────────────────────

/// Which outboxes an agent may read.
///
/// In TOML this is either the string `"all"` / `"*"` or a list of agent ids;
/// a list containing `"*"` also means every agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ScopeRepr", into = "ScopeRepr")]
pub enum ReadScope {
    /// Every known agent except the reader and the template.
    All,
    Agents(Vec<AgentId>),
}

impl Default for ReadScope {
    fn default() -> Self {
        ReadScope::Agents(Vec::new())
    }
}

impl ReadScope {
    /// Expand into concrete agent ids for `reader`.
    ///
    /// `known` is only consulted for the wildcard and must be resolved by the
    /// caller at call time. The reader never reads its own outbox.
    pub fn resolve(&self, reader: &AgentId, known: &[AgentId]) -> Vec<AgentId> {
        let candidates: &[AgentId] = match self {
            ReadScope::All => known,
            ReadScope::Agents(list) => list,
        };

        let mut resolved: Vec<AgentId> = Vec::with_capacity(candidates.len());
        for id in candidates {
            if id == reader || id.is_template() || resolved.contains(id) {
                continue;
            }
            resolved.push(id.clone());
        }
        resolved
    }
}

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum ScopeRepr {
    Single(String),
    List(Vec<String>),
}

fn is_wildcard(s: &str) -> bool {
    s == WILDCARD || s.eq_ignore_ascii_case("all")
}

impl From<ScopeRepr> for ReadScope {
    fn from(repr: ScopeRepr) -> Self {
        match repr {
            ScopeRepr::Single(s) if is_wildcard(&s) => ReadScope::All,
            ScopeRepr::Single(s) => ReadScope::Agents(vec![AgentId(s)]),
            ScopeRepr::List(list) if list.iter().any(|s| s == WILDCARD) => ReadScope::All,
            ScopeRepr::List(list) => ReadScope::Agents(list.into_iter().map(AgentId).collect()),
        }
    }
}

impl From<ReadScope> for ScopeRepr {
    fn from(scope: ReadScope) -> Self {
        match scope {
            ReadScope::All => ScopeRepr::Single("all".to_string()),
            ReadScope::Agents(list) => ScopeRepr::List(list.into_iter().map(|a| a.0).collect()),
        }
    }
}

/// Who an agent may address its outbox entries to.
///
/// An absent list means unrestricted; a list (even an empty one) is an
/// allow-list unless it contains `"*"`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<Vec<String>>", into = "Option<Vec<String>>")]
pub enum SendScope {
    #[default]
    Unrestricted,
    AllowList(Vec<AgentId>),
}

impl From<Option<Vec<String>>> for SendScope {
    fn from(value: Option<Vec<String>>) -> Self {
        match value {
            None => SendScope::Unrestricted,
            Some(list) if list.iter().any(|s| s == WILDCARD) => SendScope::Unrestricted,
            Some(list) => SendScope::AllowList(list.into_iter().map(AgentId).collect()),
        }
    }
}

impl From<SendScope> for Option<Vec<String>> {
    fn from(scope: SendScope) -> Self {
        match scope {
            SendScope::Unrestricted => None,
            SendScope::AllowList(list) => Some(list.into_iter().map(|a| a.0).collect()),
        }
    }
}

impl SendScope {
    /// Check an entry's declared recipients against this scope.
    ///
    /// Returns the rejection reason when the entry must be dropped. Under an
    /// allow-list an entry without recipients is rejected because its routing
    /// is ambiguous.
    pub fn check(&self, recipients: Option<&[AgentId]>) -> Result<(), String> {
        let SendScope::AllowList(allowed) = self else {
            return Ok(());
        };

        let recipients = match recipients {
            Some(r) if !r.is_empty() => r,
            _ => return Err("entry has no recipients but sending is restricted".to_string()),
        };

        match recipients.iter().find(|r| !allowed.contains(r)) {
            Some(denied) => Err(format!("recipient '{}' is not in the send allow-list", denied)),
            None => Ok(()),
        }
    }
}

/// Everything an agent is allowed to touch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub read_outboxes: ReadScope,
    #[serde(default)]
    pub send_outboxes: SendScope,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl Permissions {
    pub fn allows_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t == name)
    }
}

// ── Credits ───────────────────────────────────────────────────────────────────

/// The budget an agent is provisioned with and what each turn costs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditBudget {
    #[serde(default = "default_max_credits")]
    pub max_credits: f64,
    #[serde(default = "default_cost_per_action")]
    pub cost_per_action: f64,
}

fn default_max_credits() -> f64 {
    1000.0
}

fn default_cost_per_action() -> f64 {
    0.01
}

impl Default for CreditBudget {
    fn default() -> Self {
        Self { max_credits: default_max_credits(), cost_per_action: default_cost_per_action() }
    }
}

/// An agent's remaining credits as reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub credits_left: f64,
}

impl Balance {
    /// True when the agent may not take another turn.
    pub fn is_exhausted(&self) -> bool {
        self.credits_left <= 0.0
    }
}

// ── Descriptor ────────────────────────────────────────────────────────────────

/// The read-only description of one agent consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    #[serde(rename = "name")]
    pub id: AgentId,
    #[serde(default)]
    pub title: String,
    /// Role instructions placed after the system preamble in every prompt.
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub model: ModelSpec,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub credits: CreditBudget,
}

impl AgentDescriptor {
    /// A descriptor with default schedule (every tick) and no permissions.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(id),
            title: String::new(),
            instructions: String::new(),
            model: ModelSpec::default(),
            schedule: Schedule::default(),
            permissions: Permissions::default(),
            credits: CreditBudget::default(),
        }
    }

    pub fn with_schedule(mut self, run_every_n_ticks: i64, phase_offset: i64) -> Self {
        self.schedule = Schedule::new(run_every_n_ticks, phase_offset);
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}
