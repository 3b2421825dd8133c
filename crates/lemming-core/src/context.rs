//! Generator input assembly.
//!
//! A prompt is, in order: the fixed preamble, the agent's role, its memory
//! summary, the digest of visible outbox entries, and the tick footer.

use serde_json::Value;

use lemming_contracts::{
    agent::AgentDescriptor, outbox::OutboxEntry, prompt::PromptMessage,
};

/// Marker appended when a digest hits its character budget.
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Character budget for the memory section of a prompt.
pub const MEMORY_CONTEXT_MAX_CHARS: usize = 2000;

/// The fixed system preamble that describes the response contract.
pub const SYSTEM_PREAMBLE: &str = "\
You are an agent in a LeMMing organisation. You read messages from the outboxes \
of agents you are permitted to read and publish your own messages to your outbox.

Reply with exactly one JSON object and nothing else. It has four keys:
- \"outbox_entries\": list of {\"kind\": string, \"payload\": object, \"tags\": [string], \
\"recipients\": [agent] or null, \"meta\": object}
- \"tool_calls\": list of {\"tool\": string, \"args\": object}
- \"memory_updates\": list of {\"key\": string, \"value\": any, \"op\": \"write\" | \"delete\"}
- \"notes\": string

Use empty lists and an empty string when you have nothing to do.";

/// Render entries as a bounded digest, newest first as given.
///
/// Stops adding lines once `max_chars` would be exceeded and appends
/// `TRUNCATION_MARKER`. The budget counts characters, not bytes.
pub fn format_outbox_context(entries: &[OutboxEntry], max_chars: usize) -> String {
    if entries.is_empty() {
        return "No incoming messages.".to_string();
    }

    let mut out = String::from("INCOMING MESSAGES:");
    let mut used = out.chars().count();

    for entry in entries {
        let text = match entry.text() {
            Some(text) => text.to_string(),
            None => Value::Object(entry.payload.clone()).to_string(),
        };
        let line = format!(
            "\n[{}] From {} ({}): {}",
            entry.created_at.to_rfc3339(),
            entry.agent,
            entry.kind,
            text
        );

        let len = line.chars().count();
        if used + len > max_chars {
            out.push_str(TRUNCATION_MARKER);
            break;
        }
        used += len;
        out.push_str(&line);
    }
    out
}

/// Render stored memories as a bounded `MEMORY CONTEXT` section.
pub fn format_memory_context(memories: &[(String, Value)], max_chars: usize) -> String {
    if memories.is_empty() {
        return "MEMORY CONTEXT:\n(no stored memories)".to_string();
    }

    let mut out = String::from("MEMORY CONTEXT:");
    let mut used = out.chars().count();

    for (key, value) in memories {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let line = format!("\n- {}: {}", key, rendered);

        let len = line.chars().count();
        if used + len > max_chars {
            out.push_str(TRUNCATION_MARKER);
            break;
        }
        used += len;
        out.push_str(&line);
    }
    out
}

/// Build the full generator input for one turn.
pub fn build_prompt(
    agent: &AgentDescriptor,
    tick: u64,
    memory_context: &str,
    outbox_context: &str,
) -> Vec<PromptMessage> {
    let mut role = String::new();
    if !agent.title.is_empty() {
        role.push_str(&format!("ROLE: {} ({})\n\n", agent.title, agent.id));
    } else {
        role.push_str(&format!("AGENT: {}\n\n", agent.id));
    }
    if agent.instructions.trim().is_empty() {
        role.push_str("No role instructions provided.");
    } else {
        role.push_str(agent.instructions.trim());
    }

    let tools = if agent.permissions.tools.is_empty() {
        "none".to_string()
    } else {
        agent.permissions.tools.join(", ")
    };

    vec![
        PromptMessage::system(SYSTEM_PREAMBLE),
        PromptMessage::system(role),
        PromptMessage::user(memory_context),
        PromptMessage::user(outbox_context),
        PromptMessage::user(format!(
            "CURRENT TICK: {}\nAVAILABLE TOOLS: {}\nRespond with the JSON object now.",
            tick, tools
        )),
    ]
}

/// The agent id named by the role message of a prompt from `build_prompt`.
pub fn prompt_agent(messages: &[PromptMessage]) -> Option<&str> {
    let header = messages.get(1)?.content.lines().next()?;
    if let Some(id) = header.strip_prefix("AGENT: ") {
        return Some(id.trim());
    }
    let role = header.strip_prefix("ROLE: ")?.strip_suffix(')')?;
    let (_, id) = role.rsplit_once(" (")?;
    Some(id)
}
