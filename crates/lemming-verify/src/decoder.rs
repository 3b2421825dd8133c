//! Generator response decoder for the LeMMing runtime.
//!
//! `JsonResponseDecoder` implements the `ResponseDecoder` trait from
//! `lemming-core`. Decoding runs in two passes:
//!
//! 1. **Strict**: the fence-stripped text is deserialised straight into the
//!    typed contract. Unknown fields or any type mismatch fail this pass.
//! 2. **Lenient**: the text is walked field by field. Every value that cannot
//!    be used is replaced by its default or dropped, and one
//!    `ContractViolation` is recorded for it.
//!
//! Decoding never fails. The worst case is an empty `TurnResult` with a
//! violation explaining why.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use lemming_contracts::{
    agent::AgentId,
    turn::{MemoryOp, MemoryUpdate, OutboxDraft, ToolCall, TurnResult},
    violation::{ContractViolation, DecodeReport},
};
use lemming_core::traits::ResponseDecoder;

use crate::fence::strip_fences;

/// The four recognised top-level keys.
pub const TOP_LEVEL_KEYS: [&str; 4] = ["outbox_entries", "tool_calls", "memory_updates", "notes"];

/// Default number of response characters quoted in violation logs.
pub const DEFAULT_SNIPPET_CHARS: usize = 200;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictResponse {
    outbox_entries: Vec<OutboxDraft>,
    tool_calls: Vec<ToolCall>,
    memory_updates: Vec<MemoryUpdate>,
    notes: String,
}

impl StrictResponse {
    /// Values serde accepts but the lenient pass would reject.
    fn is_usable(&self) -> bool {
        self.outbox_entries.iter().all(|d| !d.kind.is_empty())
            && self.tool_calls.iter().all(|c| !c.tool.is_empty())
            && self.memory_updates.iter().all(|m| !m.key.is_empty())
    }
}

impl From<StrictResponse> for TurnResult {
    fn from(r: StrictResponse) -> Self {
        TurnResult {
            outbox_entries: r.outbox_entries,
            tool_calls: r.tool_calls,
            memory_updates: r.memory_updates,
            notes: r.notes,
        }
    }
}

/// Decodes generator text into a `TurnResult`, tolerating malformed output.
#[derive(Debug, Clone)]
pub struct JsonResponseDecoder {
    snippet_chars: usize,
}

impl JsonResponseDecoder {
    pub fn new() -> Self {
        Self { snippet_chars: DEFAULT_SNIPPET_CHARS }
    }

    /// Quote at most `chars` characters of the response in violation logs.
    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    /// Decode without logging.
    pub fn decode_str(&self, raw: &str) -> DecodeReport {
        let text = strip_fences(raw).trim();

        if let Ok(strict) = serde_json::from_str::<StrictResponse>(text) {
            if strict.is_usable() {
                return DecodeReport { result: strict.into(), violations: Vec::new() };
            }
        }
        decode_lenient(text)
    }

    fn snippet(&self, raw: &str) -> String {
        raw.chars().take(self.snippet_chars).collect()
    }
}

impl Default for JsonResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseDecoder for JsonResponseDecoder {
    /// Decode `raw` and log every violation with the agent, tick and a
    /// truncated snippet of the response.
    fn decode(&self, raw: &str, agent: &AgentId, tick: u64) -> DecodeReport {
        let report = self.decode_str(raw);

        if report.is_clean() {
            debug!(agent = %agent, tick, "response matched contract");
        } else {
            let snippet = self.snippet(raw);
            for violation in &report.violations {
                warn!(
                    agent = %agent,
                    tick,
                    field = %violation.field,
                    reason = %violation.reason,
                    snippet = %snippet,
                    "contract violation"
                );
            }
        }
        report
    }
}

// ── Lenient pass ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Violations(Vec<ContractViolation>);

impl Violations {
    fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.0.push(ContractViolation::new(field, reason));
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn decode_lenient(text: &str) -> DecodeReport {
    let mut violations = Violations::default();

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            violations.push("$", format!("response is not valid JSON: {}", e));
            return DecodeReport { result: TurnResult::default(), violations: violations.0 };
        }
    };

    let mut obj = match value {
        Value::Object(obj) => obj,
        other => {
            violations.push("$", format!("expected a JSON object, got {}", type_name(&other)));
            return DecodeReport { result: TurnResult::default(), violations: violations.0 };
        }
    };

    let missing: Vec<&str> = TOP_LEVEL_KEYS.iter().copied().filter(|k| !obj.contains_key(*k)).collect();
    if !missing.is_empty() {
        violations.push("$", format!("missing keys: {}", missing.join(", ")));
    }

    let mut unknown: Vec<&String> = obj.keys().filter(|k| !TOP_LEVEL_KEYS.contains(&k.as_str())).collect();
    unknown.sort();
    for key in unknown {
        violations.push(key.clone(), "unknown top-level field ignored");
    }

    let outbox_entries = take_list(&mut obj, "outbox_entries", &mut violations)
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| sanitize_draft(i, item, &mut violations))
        .collect();

    let tool_calls = take_list(&mut obj, "tool_calls", &mut violations)
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| sanitize_tool_call(i, item, &mut violations))
        .collect();

    let memory_updates = take_list(&mut obj, "memory_updates", &mut violations)
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| sanitize_memory_update(i, item, &mut violations))
        .collect();

    let notes = match obj.remove("notes") {
        None => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Null) => {
            violations.push("notes", "notes is null; using an empty string");
            String::new()
        }
        Some(other) => {
            violations.push("notes", format!("notes coerced to string from {}", type_name(&other)));
            other.to_string()
        }
    };

    DecodeReport {
        result: TurnResult { outbox_entries, tool_calls, memory_updates, notes },
        violations: violations.0,
    }
}

/// Remove a top-level list. Absent yields empty without a violation (the
/// missing-keys violation already covers it).
fn take_list(obj: &mut Map<String, Value>, key: &str, violations: &mut Violations) -> Vec<Value> {
    match obj.remove(key) {
        None => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            violations.push(key, format!("{} must be a list, got {}", key, type_name(&other)));
            Vec::new()
        }
    }
}

/// An optional object field: absent is empty, anything else is a violation.
fn take_object(obj: &mut Map<String, Value>, key: &str, field: &str, violations: &mut Violations) -> Map<String, Value> {
    match obj.remove(key) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            violations.push(
                format!("{}.{}", field, key),
                format!("{} must be an object, got {}; using empty", key, type_name(&other)),
            );
            Map::new()
        }
    }
}

fn sanitize_draft(index: usize, item: Value, violations: &mut Violations) -> Option<OutboxDraft> {
    let field = format!("outbox_entries[{}]", index);
    let mut obj = match item {
        Value::Object(obj) => obj,
        other => {
            violations.push(&field, format!("outbox entry must be an object, got {}; dropped", type_name(&other)));
            return None;
        }
    };

    let kind = match obj.remove("kind") {
        None => "message".to_string(),
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(other) => {
            violations.push(
                format!("{}.kind", field),
                format!("kind must be a non-empty string, got {}; using \"message\"", type_name(&other)),
            );
            "message".to_string()
        }
    };

    let payload = take_object(&mut obj, "payload", &field, violations);
    let meta = take_object(&mut obj, "meta", &field, violations);

    let tags = match obj.remove("tags") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let total = items.len();
            let tags: Vec<String> = items
                .into_iter()
                .filter_map(|t| match t {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect();
            if tags.len() != total {
                violations.push(format!("{}.tags", field), "non-string tags dropped");
            }
            tags
        }
        Some(other) => {
            violations.push(format!("{}.tags", field), format!("tags must be a list, got {}; using empty", type_name(&other)));
            Vec::new()
        }
    };

    let declared = match (obj.remove("recipients"), obj.remove("to")) {
        (Some(r), _) if !r.is_null() => Some(r),
        (_, Some(t)) if !t.is_null() => Some(t),
        _ => None,
    };
    let recipients = match declared {
        None => None,
        Some(Value::String(s)) => Some(vec![AgentId::new(s)]),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => Some(
            items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(AgentId::new(s)),
                    _ => None,
                })
                .collect(),
        ),
        Some(other) => {
            violations.push(
                format!("{}.recipients", field),
                format!("recipients must be a string or a list of strings, got {}; dropped", type_name(&other)),
            );
            None
        }
    };

    Some(OutboxDraft { kind, payload, tags, recipients, meta })
}

fn sanitize_tool_call(index: usize, item: Value, violations: &mut Violations) -> Option<ToolCall> {
    let field = format!("tool_calls[{}]", index);
    let mut obj = match item {
        Value::Object(obj) => obj,
        other => {
            violations.push(&field, format!("tool call must be an object, got {}; dropped", type_name(&other)));
            return None;
        }
    };

    let tool = match obj.remove("tool") {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => {
            violations.push(&field, "tool call without a tool name dropped");
            return None;
        }
    };
    let args = take_object(&mut obj, "args", &field, violations);

    Some(ToolCall { tool, args })
}

fn sanitize_memory_update(index: usize, item: Value, violations: &mut Violations) -> Option<MemoryUpdate> {
    let field = format!("memory_updates[{}]", index);
    let mut obj = match item {
        Value::Object(obj) => obj,
        other => {
            violations.push(&field, format!("memory update must be an object, got {}; dropped", type_name(&other)));
            return None;
        }
    };

    let key = match obj.remove("key") {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => {
            violations.push(&field, "memory update without a key dropped");
            return None;
        }
    };

    let op = match obj.remove("op") {
        None | Some(Value::Null) => MemoryOp::Write,
        Some(Value::String(s)) => MemoryOp::from(s),
        Some(other) => {
            violations.push(
                format!("{}.op", field),
                format!("op must be a string, got {}; using \"write\"", type_name(&other)),
            );
            MemoryOp::Write
        }
    };

    Some(MemoryUpdate { key, value: obj.remove("value").unwrap_or(Value::Null), op })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
