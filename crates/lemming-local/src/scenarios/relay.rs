//! Relay: three agents passing work through their outboxes.
//!
//! ```text
//!   planner  every tick        reads writer     sends anywhere
//!   scout    odd ticks         reads planner    tools: echo
//!   writer   every 3rd tick    reads all        sends to planner only
//! ```
//!
//! Over six ticks the run shows:
//!   1. same-tick visibility: the scout reads the planner's tick-1 task
//!   2. a tool call and memory write/delete from the scout
//!   3. a malformed scout response decoded into violations, not a failure
//!   4. the writer's message to `scout` dropped by its send allow-list
//!   5. retention at tick 5 removing entries older than 3 ticks
//!   6. the writer skipped at tick 6 once its credits run out

use std::fs;
use std::path::Path;
use std::time::Duration;

use lemming_config::Workspace;
use lemming_contracts::{
    agent::AgentId,
    error::{LemmingError, LemmingResult},
    turn::{TickReport, TurnOutcome},
};
use lemming_core::traits::OutboxStore;

use crate::generator::{RetryingGenerator, ScriptedGenerator};
use crate::runtime::LocalRuntime;

pub const AGENTS: [&str; 3] = ["planner", "scout", "writer"];

const ENGINE_TOML: &str = r#"
base_turn_seconds = 0.0
outbox_cleanup_interval_ticks = 5
max_outbox_age_ticks = 3
context_entry_limit = 20
"#;

const PLANNER_TOML: &str = r#"
title = "Planner"
instructions = "Break the survey into tasks and hand them to the scout."

[model]
key = "scripted"

[permissions]
read_outboxes = ["writer"]

[credits]
max_credits = 100.0
cost_per_action = 0.5
"#;

const SCOUT_TOML: &str = r#"
title = "Scout"
instructions = "Carry out survey tasks and report findings."

[model]
key = "scripted"

[schedule]
run_every_n_ticks = 2
phase_offset = 1

[permissions]
read_outboxes = ["planner"]
tools = ["echo"]

[credits]
max_credits = 100.0
cost_per_action = 0.5
"#;

const WRITER_TOML: &str = r#"
title = "Writer"
instructions = "Summarise findings for the planner."

[model]
key = "scripted"

[schedule]
run_every_n_ticks = 3

[permissions]
read_outboxes = "all"
send_outboxes = ["planner"]

[credits]
max_credits = 1.0
cost_per_action = 1.0
"#;

const TEMPLATE_TOML: &str = r#"
title = "Template"
instructions = "Copy this folder to create a new agent."
"#;

const SCRIPT: &str = r#"
[agents]
planner = [
  '''{"outbox_entries": [{"kind": "task", "payload": {"text": "Survey the north ridge"}, "recipients": ["scout"]}],
      "tool_calls": [], "memory_updates": [], "notes": "first task out"}''',
  '''{"outbox_entries": [{"kind": "task", "payload": {"text": "Survey the river delta"}, "recipients": ["scout"]}],
      "tool_calls": [], "memory_updates": [], "notes": ""}''',
]
scout = [
  '''```json
{"outbox_entries": [{"kind": "finding", "payload": {"text": "north ridge: nothing yet"}, "tags": ["survey"]}],
 "tool_calls": [{"tool": "echo", "args": {"text": "ridge checked"}}],
 "memory_updates": [{"key": "last_survey", "value": "north ridge", "op": "write"}],
 "notes": "ridge done"}
```''',
  '''{"outbox_entries": "oops"}''',
  '''{"outbox_entries": [{"kind": "finding", "payload": {"text": "river delta: two leads"}}],
      "tool_calls": [], "memory_updates": [{"key": "last_survey", "op": "delete"}], "notes": ""}''',
]
writer = [
  '''{"outbox_entries": [
        {"kind": "summary", "payload": {"text": "one finding so far"}, "recipients": ["planner"]},
        {"kind": "message", "payload": {"text": "keep going"}, "recipients": ["scout"]}],
      "tool_calls": [], "memory_updates": [], "notes": "summary sent"}''',
]
"#;

fn write_file(path: &Path, body: &str) -> LemmingResult<()> {
    let state_err = |e: std::io::Error| LemmingError::StateIo {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(state_err)?;
    }
    fs::write(path, body).map_err(state_err)
}

/// Lay out the relay agents and engine config under `base`.
pub fn prepare_workspace(base: &Path) -> LemmingResult<Workspace> {
    let workspace = Workspace::new(base);
    for (name, body) in AGENTS.iter().zip([PLANNER_TOML, SCOUT_TOML, WRITER_TOML]) {
        write_file(&workspace.descriptor_path(&AgentId::new(*name))?, body)?;
    }
    write_file(&workspace.template_dir().join("agent.toml"), TEMPLATE_TOML)?;
    write_file(&workspace.engine_config_path(), ENGINE_TOML)?;
    Ok(workspace)
}

/// The canned responses for the relay agents.
pub fn relay_generator() -> LemmingResult<ScriptedGenerator> {
    ScriptedGenerator::from_toml_str(SCRIPT)
}

/// Print one tick in the demo's report format.
pub fn print_report(report: &TickReport) {
    println!("  Tick {}", report.tick);
    if report.turns.is_empty() {
        println!("    (no agent fired)");
    }
    for (agent, outcome) in &report.turns {
        match outcome {
            TurnOutcome::Skipped { reason } => println!("    {:<8} skipped: {}", agent, reason),
            TurnOutcome::Completed(summary) => {
                println!(
                    "    {:<8} wrote {} | dropped {} | tools {} | memory {}/{} | violations {}",
                    agent,
                    summary.entries_written.len(),
                    summary.entries_dropped,
                    summary.tool_results.len(),
                    summary.memory_applied,
                    summary.memory_applied + summary.memory_skipped,
                    summary.violations,
                );
                if !summary.notes.is_empty() {
                    println!("             notes: {}", summary.notes);
                }
            }
        }
    }
    if let Some(removed) = report.cleaned {
        println!("    retention removed {} entr{}", removed, if removed == 1 { "y" } else { "ies" });
    }
}

/// Run the relay for `ticks` ticks in a fresh workspace at `base`.
pub fn run_scenario(base: &Path, ticks: u64) -> LemmingResult<Vec<TickReport>> {
    println!("=== Scenario: Relay ===");
    println!();
    println!("  Workspace: {}", base.display());
    println!("  Agents:    {}", AGENTS.join(", "));
    println!();

    prepare_workspace(base)?;
    let generator = RetryingGenerator::new(relay_generator()?, 2, Duration::ZERO);
    let runtime = LocalRuntime::open(base, Box::new(generator))?;

    let reports = runtime.run_ticks(ticks)?;
    for report in &reports {
        print_report(report);
    }
    println!();

    let outbox = runtime.outbox();
    for name in AGENTS {
        let count = outbox.count(&AgentId::new(name))?;
        println!("  {:<8} outbox holds {} entr{}", name, count, if count == 1 { "y" } else { "ies" });
    }
    println!("  Next tick: {}", runtime.engine().current_tick());
    println!();
    println!("  Relay complete.");
    println!();

    Ok(reports)
}
