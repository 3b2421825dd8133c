//! The LeMMing engine: the tick driver and the per-agent turn state machine.
//!
//! One turn runs:
//!
//!   Credits → Context → Generate → Decode → Outbox → Tools → Memory → Deduct → Log
//!
//! Turns within a tick run strictly one after another in `firing_order`.
//! A later turn sees outbox entries written by earlier turns of the same tick.
//! The clock only advances after every turn of the tick has completed, so a
//! crash mid-tick re-runs that tick.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, error, info, warn};

use lemming_contracts::{
    agent::{AgentDescriptor, AgentId, ReadScope},
    config::EngineConfig,
    error::{LemmingError, LemmingResult},
    outbox::OutboxEntry,
    prompt::PromptMessage,
    turn::{MemoryOp, MemoryUpdate, OutboxDraft, TickReport, ToolCall, ToolResult, TurnOutcome, TurnSummary},
    violation::DecodeReport,
};

use crate::clock::TickClock;
use crate::context::{build_prompt, format_memory_context, format_outbox_context, MEMORY_CONTEXT_MAX_CHARS};
use crate::schedule::firing_order;
use crate::traits::{
    ActionLogger, AgentDirectory, CreditLedger, Generator, MemoryStore, OutboxStore, ResponseDecoder,
    ToolExecutor,
};

/// Longest slice of a raw response copied into violation logs.
const SNIPPET_CHARS: usize = 200;

/// Every collaborator the engine drives.
pub struct Collaborators {
    pub agents: Box<dyn AgentDirectory>,
    pub outbox: Box<dyn OutboxStore>,
    pub generator: Box<dyn Generator>,
    pub decoder: Box<dyn ResponseDecoder>,
    pub tools: Box<dyn ToolExecutor>,
    pub memory: Box<dyn MemoryStore>,
    pub credits: Box<dyn CreditLedger>,
    pub logger: Box<dyn ActionLogger>,
}

/// A cancellable stop flag for `Engine::run_forever`.
///
/// Cloning shares the flag. `stop` wakes a loop sleeping between ticks; a
/// tick that has started always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (flag, wake) = &*self.inner;
        let mut stopped = flag.lock().unwrap_or_else(|e| e.into_inner());
        *stopped = true;
        wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for up to `timeout`. Returns true if stopped before or during the wait.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, wake) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = wake
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

/// Drives ticks over a fixed set of collaborators.
pub struct Engine {
    agents: Box<dyn AgentDirectory>,
    outbox: Box<dyn OutboxStore>,
    generator: Box<dyn Generator>,
    decoder: Box<dyn ResponseDecoder>,
    tools: Box<dyn ToolExecutor>,
    memory: Box<dyn MemoryStore>,
    credits: Box<dyn CreditLedger>,
    logger: Box<dyn ActionLogger>,
    clock: TickClock,
    config: EngineConfig,
}

impl Engine {
    pub fn new(parts: Collaborators, clock: TickClock, config: EngineConfig) -> Self {
        Self {
            agents: parts.agents,
            outbox: parts.outbox,
            generator: parts.generator,
            decoder: parts.decoder,
            tools: parts.tools,
            memory: parts.memory,
            credits: parts.credits,
            logger: parts.logger,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// The next tick `run_once` would execute.
    pub fn current_tick(&self) -> u64 {
        self.clock.load()
    }

    // ── Tick driver ──────────────────────────────────────────────────────────

    /// Run every agent that fires at `tick`, then retention, then persist `tick + 1`.
    ///
    /// # Errors
    ///
    /// The first turn failure aborts the tick and is returned as
    /// `LemmingError::TurnFailed`. Turns that ran before it keep their side
    /// effects and the clock is not advanced.
    pub fn run_tick(&self, tick: u64) -> LemmingResult<TickReport> {
        let started = Instant::now();
        let agents = self.agents.agents()?;
        let order = firing_order(&agents, tick);

        let firing: Vec<&str> = order.iter().map(|a| a.id.as_str()).collect();
        info!(tick, agents = agents.len(), firing = order.len(), "tick starting");
        self.logger.log_engine_event("tick_started", &json!({ "tick": tick, "firing": firing }));

        let mut report = TickReport::new(tick);
        for agent in order {
            match self.run_turn(agent, tick) {
                Ok(outcome) => report.turns.push((agent.id.clone(), outcome)),
                Err(e) => {
                    error!(tick, agent = %agent.id, error = %e, "turn failed, aborting tick");
                    self.logger.log_engine_event(
                        "tick_aborted",
                        &json!({ "tick": tick, "agent": agent.id, "error": e.to_string() }),
                    );
                    return Err(e);
                }
            }
        }

        if self.config.is_cleanup_tick(tick) {
            report.cleaned = self.run_cleanup(tick);
        }

        self.clock.save(tick + 1)?;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(tick, turns = report.turns.len(), duration_ms, "tick completed");
        self.logger.log_engine_event(
            "tick_completed",
            &json!({
                "tick": tick,
                "turns": report.turns.len(),
                "cleaned": report.cleaned,
                "duration_ms": duration_ms,
            }),
        );
        Ok(report)
    }

    /// Run exactly one tick: `tick` if given, otherwise the persisted one.
    pub fn run_once(&self, tick: Option<u64>) -> LemmingResult<TickReport> {
        let tick = tick.unwrap_or_else(|| self.clock.load());
        self.run_tick(tick)
    }

    /// Run ticks from the persisted clock until `max_ticks` or `stop`.
    ///
    /// Sleeps `base_turn_seconds` between ticks; the sleep is cut short by
    /// `stop`. Returns the number of ticks run.
    pub fn run_forever(&self, stop: &StopSignal) -> LemmingResult<u64> {
        let pause = Duration::try_from_secs_f64(self.config.base_turn_seconds).unwrap_or(Duration::ZERO);
        let mut ran = 0u64;

        loop {
            if stop.is_stopped() {
                info!(ran, "stop requested");
                break;
            }

            let tick = self.clock.load();
            if let Some(max) = self.config.max_ticks {
                if tick > max {
                    info!(tick, max_ticks = max, "max ticks reached");
                    break;
                }
            }

            self.run_tick(tick)?;
            ran += 1;

            if self.config.max_ticks.is_some_and(|max| tick >= max) {
                info!(tick, "max ticks reached");
                break;
            }
            if stop.wait(pause) {
                info!(ran, "stop requested");
                break;
            }
        }
        Ok(ran)
    }

    fn run_cleanup(&self, tick: u64) -> Option<usize> {
        let max_age = self.config.max_outbox_age_ticks;
        match self.outbox.prune(tick, max_age) {
            Ok(removed) => {
                info!(tick, removed, max_age, "outbox cleanup");
                self.logger.log_engine_event(
                    "outbox_cleanup",
                    &json!({ "tick": tick, "removed": removed, "max_age_ticks": max_age }),
                );
                Some(removed)
            }
            Err(e) => {
                error!(tick, error = %e, "outbox cleanup failed");
                self.logger.log_engine_event(
                    "outbox_cleanup_failed",
                    &json!({ "tick": tick, "error": e.to_string() }),
                );
                None
            }
        }
    }

    // ── Turn state machine ───────────────────────────────────────────────────

    /// Run one agent's turn at `tick`.
    ///
    /// # Errors
    ///
    /// `TurnFailed` when the generator fails; in that case nothing from this
    /// turn has been applied. Storage errors from outbox reads, the ledger or
    /// the agent directory also propagate. A failed outbox write only drops
    /// that entry, and malformed generator output never fails the turn.
    pub fn run_turn(&self, agent: &AgentDescriptor, tick: u64) -> LemmingResult<TurnOutcome> {
        let started = Instant::now();
        let id = &agent.id;

        // ── Step 1: Credit check ─────────────────────────────────────────────
        let balance = self.credits.balance(id)?;
        if balance.is_exhausted() {
            warn!(agent = %id, tick, credits_left = balance.credits_left, "skipped: no credits");
            self.logger.log_agent_action(
                id,
                "turn_skipped",
                &json!({ "tick": tick, "reason": "no credits", "credits_left": balance.credits_left }),
            );
            return Ok(TurnOutcome::Skipped { reason: "no credits".to_string() });
        }

        debug!(agent = %id, tick, credits_left = balance.credits_left, "turn starting");

        // ── Step 2: Build context ────────────────────────────────────────────
        let prompt = self.build_context(agent, tick)?;

        // ── Step 3: Invoke the generator ─────────────────────────────────────
        //
        // No retries here; a failure aborts the turn before any side effect.
        let temperature = agent.model.temperature.unwrap_or(self.config.temperature);
        let raw = self.generator.generate(&agent.model.key, &prompt, temperature).map_err(|e| {
            warn!(agent = %id, tick, error = %e, "generator call failed");
            LemmingError::TurnFailed { agent: id.to_string(), tick, reason: e.to_string() }
        })?;

        // ── Step 4: Decode ───────────────────────────────────────────────────
        let DecodeReport { result, violations } = self.decoder.decode(&raw, id, tick);
        if !violations.is_empty() {
            self.logger.log_agent_action(
                id,
                "contract_violation",
                &json!({
                    "tick": tick,
                    "violations": violations,
                    "snippet": snippet(&raw),
                }),
            );
        }

        // ── Step 5: Outbox entries ───────────────────────────────────────────
        let (entries_written, entries_dropped) = self.apply_outbox_entries(agent, tick, result.outbox_entries);

        // ── Step 6: Tool calls ───────────────────────────────────────────────
        let tool_results = self.apply_tool_calls(agent, tick, &result.tool_calls);

        // ── Step 7: Memory updates ───────────────────────────────────────────
        let (memory_applied, memory_skipped) = self.apply_memory_updates(agent, tick, &result.memory_updates);

        // ── Step 8: Deduct credits ───────────────────────────────────────────
        let remaining = self.credits.deduct(id, agent.credits.cost_per_action)?;

        // ── Step 9: Notes and completion record ──────────────────────────────
        if !result.notes.is_empty() {
            self.logger.log_agent_action(id, "notes", &json!({ "tick": tick, "notes": result.notes }));
        }

        let summary = TurnSummary {
            tick,
            entries_written,
            entries_dropped,
            tool_results,
            memory_applied,
            memory_skipped,
            violations: violations.len(),
            notes: result.notes,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        self.logger.log_agent_action(
            id,
            "turn_completed",
            &json!({
                "tick": tick,
                "duration_ms": summary.duration_ms,
                "entries_written": summary.entries_written.len(),
                "entries_dropped": summary.entries_dropped,
                "tool_calls": summary.tool_results.len(),
                "memory_applied": summary.memory_applied,
                "memory_skipped": summary.memory_skipped,
                "violations": summary.violations,
                "credits_left": remaining.credits_left,
            }),
        );
        info!(
            agent = %id,
            tick,
            written = summary.entries_written.len(),
            duration_ms = summary.duration_ms,
            "turn completed"
        );

        Ok(TurnOutcome::Completed(summary))
    }

    fn build_context(&self, agent: &AgentDescriptor, tick: u64) -> LemmingResult<Vec<PromptMessage>> {
        let known = match agent.permissions.read_outboxes {
            ReadScope::All => self.outbox.known_agents()?,
            ReadScope::Agents(_) => Vec::new(),
        };
        let sources = agent.permissions.read_outboxes.resolve(&agent.id, &known);

        let incoming = if sources.is_empty() {
            Vec::new()
        } else {
            self.outbox.read_recent_merged(&sources, self.config.context_entry_limit, None)?
        };
        debug!(agent = %agent.id, tick, sources = sources.len(), incoming = incoming.len(), "context read");

        let memories = self.load_memories(&agent.id);
        Ok(build_prompt(
            agent,
            tick,
            &format_memory_context(&memories, MEMORY_CONTEXT_MAX_CHARS),
            &format_outbox_context(&incoming, self.config.context_max_chars),
        ))
    }

    /// Memory is advisory context, so a failing store yields an empty summary.
    fn load_memories(&self, agent: &AgentId) -> Vec<(String, serde_json::Value)> {
        let keys = match self.memory.keys(agent) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(agent = %agent, error = %e, "memory listing failed, continuing without memory");
                return Vec::new();
            }
        };

        let mut memories = Vec::with_capacity(keys.len());
        for key in keys {
            match self.memory.load(agent, &key) {
                Ok(Some(value)) => memories.push((key, value)),
                Ok(None) => {}
                Err(e) => warn!(agent = %agent, key = %key, error = %e, "memory load failed"),
            }
        }
        memories
    }

    fn apply_outbox_entries(
        &self,
        agent: &AgentDescriptor,
        tick: u64,
        drafts: Vec<OutboxDraft>,
    ) -> (Vec<String>, usize) {
        let mut written = Vec::with_capacity(drafts.len());
        let mut dropped = 0;

        for (index, draft) in drafts.into_iter().enumerate() {
            if let Err(reason) = agent.permissions.send_outboxes.check(draft.recipients.as_deref()) {
                warn!(agent = %agent.id, tick, index, reason = %reason, "outbox entry dropped");
                self.logger.log_agent_action(
                    &agent.id,
                    "outbox_entry_dropped",
                    &json!({ "tick": tick, "index": index, "reason": reason }),
                );
                dropped += 1;
                continue;
            }

            let entry = OutboxEntry::create(agent.id.clone(), tick, draft.kind, draft.payload)
                .with_tags(draft.tags)
                .with_recipients(draft.recipients)
                .with_meta(draft.meta);
            // A failed write loses the entry, not the turn.
            if let Err(e) = self.outbox.append(&agent.id, &entry) {
                warn!(agent = %agent.id, tick, index, error = %e, "outbox write failed");
                self.logger.log_agent_action(
                    &agent.id,
                    "outbox_write_failed",
                    &json!({ "tick": tick, "index": index, "error": e.to_string() }),
                );
                dropped += 1;
                continue;
            }
            debug!(agent = %agent.id, tick, entry = %entry.id, kind = %entry.kind, "outbox entry written");
            written.push(entry.id);
        }
        (written, dropped)
    }

    fn apply_tool_calls(&self, agent: &AgentDescriptor, tick: u64, calls: &[ToolCall]) -> Vec<ToolResult> {
        calls
            .iter()
            .map(|call| {
                let result = if agent.permissions.allows_tool(&call.tool) {
                    self.tools.execute(&agent.id, &call.tool, &call.args)
                } else {
                    warn!(agent = %agent.id, tick, tool = %call.tool, "tool not permitted");
                    ToolResult::failed(format!("tool '{}' is not permitted for agent '{}'", call.tool, agent.id))
                };

                self.logger.log_agent_action(
                    &agent.id,
                    "tool_call",
                    &json!({
                        "tick": tick,
                        "tool": call.tool,
                        "success": result.success,
                        "error": result.error,
                    }),
                );
                result
            })
            .collect()
    }

    fn apply_memory_updates(&self, agent: &AgentDescriptor, tick: u64, updates: &[MemoryUpdate]) -> (usize, usize) {
        let mut applied = 0;
        let mut skipped = 0;

        for update in updates {
            let outcome = match &update.op {
                MemoryOp::Write => self.memory.save(&agent.id, &update.key, &update.value).map(|_| true),
                MemoryOp::Delete => {
                    let existed = self.memory.delete(&agent.id, &update.key);
                    if let Ok(false) = existed {
                        info!(agent = %agent.id, tick, key = %update.key, "memory delete: key not present");
                    }
                    existed
                }
                MemoryOp::Other(op) => {
                    warn!(agent = %agent.id, tick, key = %update.key, op = %op, "unknown memory op ignored");
                    Ok(false)
                }
            };

            match outcome {
                Ok(true) => applied += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    warn!(agent = %agent.id, tick, key = %update.key, error = %e, "memory update failed");
                    skipped += 1;
                }
            }
        }

        if !updates.is_empty() {
            self.logger.log_agent_action(
                &agent.id,
                "memory_updates",
                &json!({ "tick": tick, "applied": applied, "skipped": skipped }),
            );
        }
        (applied, skipped)
    }
}

fn snippet(raw: &str) -> String {
    raw.chars().take(SNIPPET_CHARS).collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::{json, Map, Value};

    use lemming_contracts::{
        agent::{AgentDescriptor, AgentId, Balance, Permissions, ReadScope, SendScope},
        config::EngineConfig,
        error::{LemmingError, LemmingResult},
        outbox::OutboxEntry,
        prompt::PromptMessage,
        turn::{ToolResult, TurnOutcome, TurnResult},
        violation::{ContractViolation, DecodeReport},
    };

    use crate::clock::TickClock;
    use crate::traits::{
        ActionLogger, CreditLedger, Generator, MemoryStore, OutboxStore, ResponseDecoder, ToolExecutor,
    };

    use super::{Collaborators, Engine, StopSignal};

    // ── Mock helpers ─────────────────────────────────────────────────────────

    type Outboxes = Arc<Mutex<BTreeMap<AgentId, Vec<OutboxEntry>>>>;

    /// In-memory outbox that also counts reads.
    #[derive(Default)]
    struct MockOutbox {
        boxes: Outboxes,
        reads: Arc<Mutex<u32>>,
        pruned: Arc<Mutex<Vec<u64>>>,
        fail_append: bool,
    }

    impl OutboxStore for MockOutbox {
        fn append(&self, agent: &AgentId, entry: &OutboxEntry) -> LemmingResult<()> {
            if self.fail_append {
                return Err(LemmingError::OutboxWrite {
                    agent: agent.to_string(),
                    reason: "disk full".to_string(),
                });
            }
            self.boxes.lock().unwrap().entry(agent.clone()).or_default().push(entry.clone());
            Ok(())
        }

        fn read_recent(&self, agent: &AgentId, limit: usize, since: Option<u64>) -> LemmingResult<Vec<OutboxEntry>> {
            self.read_recent_merged(std::slice::from_ref(agent), limit, since)
        }

        fn read_recent_merged(
            &self,
            agents: &[AgentId],
            limit: usize,
            since: Option<u64>,
        ) -> LemmingResult<Vec<OutboxEntry>> {
            *self.reads.lock().unwrap() += 1;
            let boxes = self.boxes.lock().unwrap();
            let mut all: Vec<OutboxEntry> = agents
                .iter()
                .filter_map(|a| boxes.get(a))
                .flatten()
                .filter(|e| since.map_or(true, |s| e.tick >= s))
                .cloned()
                .collect();
            all.sort_by(|a, b| b.recency_cmp(a));
            all.truncate(limit);
            Ok(all)
        }

        fn count(&self, agent: &AgentId) -> LemmingResult<usize> {
            Ok(self.boxes.lock().unwrap().get(agent).map_or(0, Vec::len))
        }

        fn prune(&self, current_tick: u64, max_age: u64) -> LemmingResult<usize> {
            self.pruned.lock().unwrap().push(current_tick);
            let mut removed = 0;
            for entries in self.boxes.lock().unwrap().values_mut() {
                let before = entries.len();
                entries.retain(|e| current_tick.saturating_sub(e.tick) <= max_age);
                removed += before - entries.len();
            }
            Ok(removed)
        }

        fn known_agents(&self) -> LemmingResult<Vec<AgentId>> {
            Ok(self.boxes.lock().unwrap().keys().cloned().collect())
        }
    }

    /// Replies with a canned response per agent and records every prompt.
    #[derive(Default)]
    struct MockGenerator {
        responses: HashMap<String, String>,
        failing: Vec<String>,
        calls: Arc<Mutex<Vec<(String, Vec<PromptMessage>)>>>,
    }

    impl MockGenerator {
        fn respond(mut self, agent: &str, response: Value) -> Self {
            self.responses.insert(agent.to_string(), response.to_string());
            self
        }

        fn fail_for(mut self, agent: &str) -> Self {
            self.failing.push(agent.to_string());
            self
        }
    }

    impl Generator for MockGenerator {
        fn generate(&self, _model: &str, messages: &[PromptMessage], _t: f64) -> LemmingResult<String> {
            let agent = crate::context::prompt_agent(messages).unwrap_or_default().to_string();
            self.calls.lock().unwrap().push((agent.clone(), messages.to_vec()));
            if self.failing.contains(&agent) {
                return Err(LemmingError::Generation { reason: "provider unavailable".to_string() });
            }
            Ok(self.responses.get(&agent).cloned().unwrap_or_else(|| empty_response().to_string()))
        }
    }

    /// Strict serde decode; anything else is a single violation.
    struct StrictDecoder;

    impl ResponseDecoder for StrictDecoder {
        fn decode(&self, raw: &str, _agent: &AgentId, _tick: u64) -> DecodeReport {
            match serde_json::from_str::<TurnResult>(raw) {
                Ok(result) => DecodeReport { result, violations: vec![] },
                Err(e) => DecodeReport {
                    result: TurnResult::default(),
                    violations: vec![ContractViolation::new("$", e.to_string())],
                },
            }
        }
    }

    #[derive(Default)]
    struct MockTools {
        executed: Arc<Mutex<Vec<String>>>,
    }

    impl ToolExecutor for MockTools {
        fn execute(&self, _agent: &AgentId, tool: &str, _args: &Map<String, Value>) -> ToolResult {
            self.executed.lock().unwrap().push(tool.to_string());
            ToolResult::ok(format!("{} ran", tool))
        }
    }

    #[derive(Default)]
    struct MockMemory {
        store: Arc<Mutex<BTreeMap<(AgentId, String), Value>>>,
    }

    impl MemoryStore for MockMemory {
        fn save(&self, agent: &AgentId, key: &str, value: &Value) -> LemmingResult<()> {
            self.store.lock().unwrap().insert((agent.clone(), key.to_string()), value.clone());
            Ok(())
        }

        fn load(&self, agent: &AgentId, key: &str) -> LemmingResult<Option<Value>> {
            Ok(self.store.lock().unwrap().get(&(agent.clone(), key.to_string())).cloned())
        }

        fn delete(&self, agent: &AgentId, key: &str) -> LemmingResult<bool> {
            Ok(self.store.lock().unwrap().remove(&(agent.clone(), key.to_string())).is_some())
        }

        fn keys(&self, agent: &AgentId) -> LemmingResult<Vec<String>> {
            Ok(self
                .store
                .lock()
                .unwrap()
                .keys()
                .filter(|(a, _)| a == agent)
                .map(|(_, k)| k.clone())
                .collect())
        }
    }

    struct MockCredits {
        balances: Arc<Mutex<HashMap<AgentId, f64>>>,
    }

    impl MockCredits {
        fn with(balances: &[(&str, f64)]) -> Self {
            Self {
                balances: Arc::new(Mutex::new(
                    balances.iter().map(|(a, b)| (AgentId::new(*a), *b)).collect(),
                )),
            }
        }
    }

    impl CreditLedger for MockCredits {
        fn balance(&self, agent: &AgentId) -> LemmingResult<Balance> {
            let credits_left = self.balances.lock().unwrap().get(agent).copied().unwrap_or(0.0);
            Ok(Balance { credits_left })
        }

        fn deduct(&self, agent: &AgentId, amount: f64) -> LemmingResult<Balance> {
            let mut balances = self.balances.lock().unwrap();
            let left = balances.entry(agent.clone()).or_insert(0.0);
            *left -= amount;
            Ok(Balance { credits_left: *left })
        }
    }

    #[derive(Default)]
    struct MockLogger {
        events: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ActionLogger for MockLogger {
        fn log_agent_action(&self, agent: &AgentId, event: &str, _fields: &Value) {
            self.events.lock().unwrap().push((agent.to_string(), event.to_string()));
        }

        fn log_engine_event(&self, event: &str, _fields: &Value) {
            self.events.lock().unwrap().push(("engine".to_string(), event.to_string()));
        }
    }

    fn empty_response() -> Value {
        json!({ "outbox_entries": [], "tool_calls": [], "memory_updates": [], "notes": "" })
    }

    fn say(text: &str) -> Value {
        json!({
            "outbox_entries": [{ "kind": "message", "payload": { "text": text } }],
            "tool_calls": [],
            "memory_updates": [],
            "notes": ""
        })
    }

    fn reader(id: &str) -> AgentDescriptor {
        AgentDescriptor::new(id)
            .with_permissions(Permissions { read_outboxes: ReadScope::All, ..Default::default() })
    }

    /// Handles to mock state, captured before the mocks are boxed.
    struct Harness {
        engine: Engine,
        outbox: Outboxes,
        reads: Arc<Mutex<u32>>,
        pruned: Arc<Mutex<Vec<u64>>>,
        calls: Arc<Mutex<Vec<(String, Vec<PromptMessage>)>>>,
        executed: Arc<Mutex<Vec<String>>>,
        memory: Arc<Mutex<BTreeMap<(AgentId, String), Value>>>,
        balances: Arc<Mutex<HashMap<AgentId, f64>>>,
        events: Arc<Mutex<Vec<(String, String)>>>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn events_named(&self, event: &str) -> usize {
            self.events.lock().unwrap().iter().filter(|(_, e)| e == event).count()
        }

        fn called_agents(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(a, _)| a.clone()).collect()
        }
    }

    fn harness(
        agents: Vec<AgentDescriptor>,
        generator: MockGenerator,
        credits: MockCredits,
        config: EngineConfig,
    ) -> Harness {
        harness_with_outbox(agents, generator, credits, config, MockOutbox::default())
    }

    fn harness_with_outbox(
        agents: Vec<AgentDescriptor>,
        generator: MockGenerator,
        credits: MockCredits,
        config: EngineConfig,
        outbox: MockOutbox,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let tools = MockTools::default();
        let memory = MockMemory::default();
        let logger = MockLogger::default();

        let h_outbox = outbox.boxes.clone();
        let reads = outbox.reads.clone();
        let pruned = outbox.pruned.clone();
        let calls = generator.calls.clone();
        let executed = tools.executed.clone();
        let h_memory = memory.store.clone();
        let balances = credits.balances.clone();
        let events = logger.events.clone();

        let engine = Engine::new(
            Collaborators {
                agents: Box::new(agents),
                outbox: Box::new(outbox),
                generator: Box::new(generator),
                decoder: Box::new(StrictDecoder),
                tools: Box::new(tools),
                memory: Box::new(memory),
                credits: Box::new(credits),
                logger: Box::new(logger),
            },
            TickClock::new(dir.path().join("tick.json")),
            config,
        );

        Harness {
            engine,
            outbox: h_outbox,
            reads,
            pruned,
            calls,
            executed,
            memory: h_memory,
            balances,
            events,
            _dir: dir,
        }
    }

    // ── Test cases ────────────────────────────────────────────────────────────

    /// An agent with no credits never reaches the generator or the outbox.
    #[test]
    fn test_no_credits_skips_turn() {
        let h = harness(
            vec![reader("broke")],
            MockGenerator::default().respond("broke", say("hi")),
            MockCredits::with(&[("broke", 0.0)]),
            EngineConfig::default(),
        );

        let report = h.engine.run_tick(1).unwrap();

        assert!(matches!(
            report.outcome(&AgentId::new("broke")),
            Some(TurnOutcome::Skipped { reason }) if reason == "no credits"
        ));
        assert!(h.calls.lock().unwrap().is_empty(), "generator must not be called");
        assert_eq!(*h.reads.lock().unwrap(), 0, "outbox must not be read");
        assert!(h.outbox.lock().unwrap().is_empty(), "outbox must not be written");
        assert_eq!(h.balances.lock().unwrap()[&AgentId::new("broke")], 0.0);
        assert_eq!(h.events_named("turn_skipped"), 1);
    }

    /// A normal turn writes entries, runs tools, applies memory and deducts.
    #[test]
    fn test_successful_turn_applies_everything() {
        let agent = AgentDescriptor::new("worker")
            .with_permissions(Permissions { tools: vec!["echo".to_string()], ..Default::default() });
        let response = json!({
            "outbox_entries": [
                { "kind": "report", "payload": { "text": "done" }, "tags": ["weekly"] }
            ],
            "tool_calls": [
                { "tool": "echo", "args": { "text": "x" } },
                { "tool": "shell", "args": {} }
            ],
            "memory_updates": [
                { "key": "progress", "value": 3 },
                { "key": "ghost", "op": "delete" },
                { "key": "odd", "op": "append", "value": 1 }
            ],
            "notes": "all good"
        });

        let h = harness(
            vec![agent],
            MockGenerator::default().respond("worker", response),
            MockCredits::with(&[("worker", 1.0)]),
            EngineConfig::default(),
        );

        let report = h.engine.run_tick(3).unwrap();
        let summary = report.outcome(&AgentId::new("worker")).and_then(|o| o.summary()).unwrap();

        // Outbox
        assert_eq!(summary.entries_written.len(), 1);
        let boxes = h.outbox.lock().unwrap();
        let written = &boxes[&AgentId::new("worker")][0];
        assert_eq!(written.kind, "report");
        assert_eq!(written.tick, 3);
        assert_eq!(written.tags, vec!["weekly".to_string()]);
        assert_eq!(written.text(), Some("done"));

        // Tools: only the permitted one executed.
        assert_eq!(*h.executed.lock().unwrap(), vec!["echo".to_string()]);
        assert!(summary.tool_results[0].success);
        assert!(!summary.tool_results[1].success);
        assert!(summary.tool_results[1].error.as_deref().unwrap().contains("not permitted"));

        // Memory: write applied, missing delete and unknown op skipped.
        assert_eq!(summary.memory_applied, 1);
        assert_eq!(summary.memory_skipped, 2);
        assert_eq!(
            h.memory.lock().unwrap().get(&(AgentId::new("worker"), "progress".to_string())),
            Some(&json!(3))
        );

        // Credits
        let left = h.balances.lock().unwrap()[&AgentId::new("worker")];
        assert!((left - 0.99).abs() < 1e-9);

        assert_eq!(summary.notes, "all good");
        assert_eq!(h.events_named("notes"), 1);
        assert_eq!(h.events_named("turn_completed"), 1);
    }

    /// A generator failure aborts the tick with the failing agent's id, keeps
    /// earlier agents' writes, and does not advance the clock.
    #[test]
    fn test_generator_failure_propagates_turn_failed() {
        let h = harness(
            vec![AgentDescriptor::new("alpha"), AgentDescriptor::new("bravo"), AgentDescriptor::new("charlie")],
            MockGenerator::default().respond("alpha", say("first")).fail_for("bravo"),
            MockCredits::with(&[("alpha", 5.0), ("bravo", 5.0), ("charlie", 5.0)]),
            EngineConfig::default(),
        );

        match h.engine.run_tick(7) {
            Err(LemmingError::TurnFailed { agent, tick, reason }) => {
                assert_eq!(agent, "bravo");
                assert_eq!(tick, 7);
                assert!(reason.contains("provider unavailable"));
            }
            other => panic!("expected TurnFailed, got {:?}", other),
        }

        let boxes = h.outbox.lock().unwrap();
        assert_eq!(boxes[&AgentId::new("alpha")].len(), 1);
        assert!(!boxes.contains_key(&AgentId::new("bravo")));

        // bravo was not charged; charlie never ran.
        let balances = h.balances.lock().unwrap();
        assert_eq!(balances[&AgentId::new("bravo")], 5.0);
        assert_eq!(h.called_agents(), vec!["alpha", "bravo"]);

        assert_eq!(h.engine.current_tick(), 1, "clock must not advance");
    }

    /// Turns run in firing order and later agents see earlier output.
    #[test]
    fn test_same_tick_visibility_in_firing_order() {
        let h = harness(
            vec![reader("zulu"), reader("alpha"), reader("bravo")],
            MockGenerator::default().respond("alpha", say("alpha speaks")),
            MockCredits::with(&[("zulu", 1.0), ("alpha", 1.0), ("bravo", 1.0)]),
            EngineConfig::default(),
        );

        let report = h.engine.run_tick(1).unwrap();
        let fired: Vec<&str> = report.fired().iter().map(|a| a.as_str()).collect();
        assert_eq!(fired, vec!["alpha", "bravo", "zulu"]);
        assert_eq!(h.called_agents(), vec!["alpha", "bravo", "zulu"]);

        let calls = h.calls.lock().unwrap();
        let digest_for = |i: usize| calls[i].1[3].content.clone();
        assert_eq!(digest_for(0), "No incoming messages.");
        assert!(digest_for(1).contains("alpha speaks"));
        assert!(digest_for(2).contains("alpha speaks"));
    }

    /// Restricted senders lose entries addressed outside their allow-list or
    /// without recipients; the rest of the turn still applies.
    #[test]
    fn test_send_allow_list_drops_entries() {
        let agent = AgentDescriptor::new("courier").with_permissions(Permissions {
            send_outboxes: SendScope::AllowList(vec![AgentId::new("hq")]),
            ..Default::default()
        });
        let response = json!({
            "outbox_entries": [
                { "kind": "message", "payload": { "text": "to hq" }, "recipients": ["hq"] },
                { "kind": "message", "payload": { "text": "to rival" }, "recipients": ["rival"] },
                { "kind": "message", "payload": { "text": "to nobody" } }
            ],
            "tool_calls": [],
            "memory_updates": [],
            "notes": ""
        });

        let h = harness(
            vec![agent],
            MockGenerator::default().respond("courier", response),
            MockCredits::with(&[("courier", 1.0)]),
            EngineConfig::default(),
        );

        let report = h.engine.run_tick(1).unwrap();
        let summary = report.outcome(&AgentId::new("courier")).and_then(|o| o.summary()).unwrap();
        assert_eq!(summary.entries_written.len(), 1);
        assert_eq!(summary.entries_dropped, 2);
        assert_eq!(h.events_named("outbox_entry_dropped"), 2);

        let boxes = h.outbox.lock().unwrap();
        assert_eq!(boxes[&AgentId::new("courier")][0].text(), Some("to hq"));
    }

    /// A failed outbox write drops the entry; the rest of the turn applies.
    #[test]
    fn test_failed_outbox_write_is_dropped_and_credits_deducted() {
        let outbox = MockOutbox { fail_append: true, ..Default::default() };
        let h = harness_with_outbox(
            vec![AgentDescriptor::new("scribe")],
            MockGenerator::default().respond("scribe", say("lost words")),
            MockCredits::with(&[("scribe", 1.0)]),
            EngineConfig::default(),
            outbox,
        );

        let report = h.engine.run_once(None).unwrap();
        let summary = report.outcome(&AgentId::new("scribe")).and_then(|o| o.summary()).unwrap();
        assert!(summary.entries_written.is_empty());
        assert_eq!(summary.entries_dropped, 1);
        assert_eq!(h.events_named("outbox_write_failed"), 1);
        assert_eq!(h.events_named("turn_completed"), 1);

        let left = h.balances.lock().unwrap()[&AgentId::new("scribe")];
        assert!((left - 0.99).abs() < 1e-9);
        assert_eq!(h.engine.current_tick(), 2);
    }

    /// Garbage output is a violation, not a failure, and still costs credits.
    #[test]
    fn test_malformed_output_is_recoverable() {
        let h = harness(
            vec![AgentDescriptor::new("rambler")],
            MockGenerator { responses: HashMap::from([("rambler".to_string(), "I refuse".to_string())]), ..Default::default() },
            MockCredits::with(&[("rambler", 1.0)]),
            EngineConfig::default(),
        );

        let report = h.engine.run_tick(1).unwrap();
        let summary = report.outcome(&AgentId::new("rambler")).and_then(|o| o.summary()).unwrap();
        assert_eq!(summary.violations, 1);
        assert!(summary.entries_written.is_empty());
        assert_eq!(h.events_named("contract_violation"), 1);
        assert!(h.balances.lock().unwrap()[&AgentId::new("rambler")] < 1.0);
    }

    /// Retention only runs on cleanup ticks.
    #[test]
    fn test_cleanup_runs_on_interval() {
        let config = EngineConfig { outbox_cleanup_interval_ticks: 5, ..Default::default() };
        let h = harness(vec![], MockGenerator::default(), MockCredits::with(&[]), config);

        for tick in 1..=10 {
            let report = h.engine.run_tick(tick).unwrap();
            assert_eq!(report.cleaned.is_some(), tick % 5 == 0, "tick {}", tick);
        }
        assert_eq!(*h.pruned.lock().unwrap(), vec![5, 10]);
    }

    /// `run_once` without a tick uses and advances the persisted clock.
    #[test]
    fn test_run_once_advances_clock() {
        let h = harness(vec![], MockGenerator::default(), MockCredits::with(&[]), EngineConfig::default());

        assert_eq!(h.engine.run_once(None).unwrap().tick, 1);
        assert_eq!(h.engine.run_once(None).unwrap().tick, 2);
        assert_eq!(h.engine.run_once(Some(40)).unwrap().tick, 40);
        assert_eq!(h.engine.current_tick(), 41);
    }

    /// `run_forever` stops after `max_ticks`.
    #[test]
    fn test_run_forever_honours_max_ticks() {
        let config = EngineConfig { base_turn_seconds: 0.0, max_ticks: Some(3), ..Default::default() };
        let h = harness(
            vec![AgentDescriptor::new("steady")],
            MockGenerator::default(),
            MockCredits::with(&[("steady", 10.0)]),
            config,
        );

        let ran = h.engine.run_forever(&StopSignal::new()).unwrap();
        assert_eq!(ran, 3);
        assert_eq!(h.called_agents().len(), 3);
        assert_eq!(h.engine.current_tick(), 4);

        // Already past the bound: nothing more runs.
        assert_eq!(h.engine.run_forever(&StopSignal::new()).unwrap(), 0);
    }

    #[test]
    fn test_run_forever_respects_stop_signal() {
        let h = harness(vec![], MockGenerator::default(), MockCredits::with(&[]), EngineConfig::default());

        let stop = StopSignal::new();
        stop.stop();
        assert_eq!(h.engine.run_forever(&stop).unwrap(), 0);
        assert_eq!(h.engine.current_tick(), 1);
    }

    #[test]
    fn test_stop_signal_wakes_waiter() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let waiter = std::thread::spawn(move || remote.wait(Duration::from_secs(30)));
        stop.stop();
        assert!(waiter.join().unwrap());
        assert!(!StopSignal::new().wait(Duration::from_millis(1)));
    }

    /// Stored memories appear in the next turn's prompt.
    #[test]
    fn test_memory_reaches_prompt() {
        let response = json!({
            "outbox_entries": [],
            "tool_calls": [],
            "memory_updates": [{ "key": "plan", "value": "phase two" }],
            "notes": ""
        });
        let h = harness(
            vec![AgentDescriptor::new("planner")],
            MockGenerator::default().respond("planner", response),
            MockCredits::with(&[("planner", 1.0)]),
            EngineConfig::default(),
        );

        h.engine.run_tick(1).unwrap();
        h.engine.run_tick(2).unwrap();

        let calls = h.calls.lock().unwrap();
        assert!(!calls[0].1[2].content.contains("plan"));
        assert!(calls[1].1[2].content.contains("- plan: phase two"));
    }
}
