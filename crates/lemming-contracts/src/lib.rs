//! # lemming-contracts
//!
//! Shared types, entry formats, and error contracts for the LeMMing runtime.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions, the on-disk naming contract, and the
//! error type.

pub mod agent;
pub mod config;
pub mod error;
pub mod outbox;
pub mod prompt;
pub mod turn;
pub mod violation;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use agent::{AgentDescriptor, AgentId, ReadScope, Schedule, SendScope};
    use error::LemmingError;
    use outbox::{entry_file_name, tick_from_file_name, OutboxEntry};
    use turn::{MemoryOp, MemoryUpdate, OutboxDraft};

    fn ids(names: &[&str]) -> Vec<AgentId> {
        names.iter().map(|n| AgentId::new(*n)).collect()
    }

    // ── AgentId ──────────────────────────────────────────────────────────────

    #[test]
    fn agent_id_rejects_unsafe_path_segments() {
        for bad in ["", ".", "..", "a/b", "a\\b", "../escape"] {
            match AgentId::parse(bad) {
                Err(LemmingError::InvalidAgentId { id, .. }) => assert_eq!(id, bad),
                other => panic!("expected InvalidAgentId for {:?}, got {:?}", bad, other),
            }
        }
        assert!(AgentId::parse("planner-01").is_ok());
    }

    // ── Schedule ─────────────────────────────────────────────────────────────

    #[test]
    fn schedule_period_defaults_non_positive_to_one() {
        assert_eq!(Schedule::new(0, 5).period(), 1);
        assert_eq!(Schedule::new(-3, 0).period(), 1);
        assert_eq!(Schedule::new(4, 0).period(), 4);
    }

    #[test]
    fn schedule_phase_is_reduced_into_period() {
        assert_eq!(Schedule::new(4, 6).phase(), 2);
        assert_eq!(Schedule::new(4, -1).phase(), 3);
        assert_eq!(Schedule::new(1, 7).phase(), 0);
    }

    // ── Permissions ──────────────────────────────────────────────────────────

    #[test]
    fn read_scope_accepts_wildcard_forms() {
        let all: ReadScope = serde_json::from_value(json!("all")).unwrap();
        assert_eq!(all, ReadScope::All);
        let star_list: ReadScope = serde_json::from_value(json!(["*"])).unwrap();
        assert_eq!(star_list, ReadScope::All);
        let explicit: ReadScope = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(explicit, ReadScope::Agents(ids(&["a", "b"])));
    }

    #[test]
    fn read_scope_resolve_excludes_reader_and_template() {
        let known = ids(&["alpha", "agent_template", "beta", "reader"]);
        let reader = AgentId::new("reader");

        assert_eq!(ReadScope::All.resolve(&reader, &known), ids(&["alpha", "beta"]));

        let explicit = ReadScope::Agents(ids(&["reader", "beta", "beta"]));
        assert_eq!(explicit.resolve(&reader, &known), ids(&["beta"]));
    }

    #[test]
    fn send_scope_unrestricted_allows_anything() {
        let scope: SendScope = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(scope, SendScope::Unrestricted);
        assert!(scope.check(None).is_ok());
        assert!(scope.check(Some(ids(&["anyone"]).as_slice())).is_ok());

        let star: SendScope = serde_json::from_value(json!(["*"])).unwrap();
        assert_eq!(star, SendScope::Unrestricted);
    }

    #[test]
    fn send_scope_allow_list_requires_every_recipient() {
        let scope = SendScope::AllowList(ids(&["friend", "ally"]));

        assert!(scope.check(Some(ids(&["friend"]).as_slice())).is_ok());
        assert!(scope.check(Some(ids(&["friend", "ally"]).as_slice())).is_ok());

        let err = scope.check(Some(ids(&["friend", "stranger"]).as_slice())).unwrap_err();
        assert!(err.contains("stranger"));

        // No recipients under an allow-list is ambiguous routing.
        assert!(scope.check(None).is_err());
        assert!(scope.check(Some(&[][..])).is_err());
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let descriptor: AgentDescriptor = serde_json::from_value(json!({
            "name": "scout",
            "schedule": { "run_every_n_ticks": 3 },
            "permissions": { "read_outboxes": "all", "tools": ["echo"] }
        }))
        .unwrap();

        assert_eq!(descriptor.id, AgentId::new("scout"));
        assert_eq!(descriptor.schedule, Schedule::new(3, 0));
        assert_eq!(descriptor.permissions.read_outboxes, ReadScope::All);
        assert_eq!(descriptor.permissions.send_outboxes, SendScope::Unrestricted);
        assert!(descriptor.permissions.allows_tool("echo"));
        assert!(!descriptor.permissions.allows_tool("shell"));
        assert_eq!(descriptor.credits.cost_per_action, 0.01);
    }

    // ── OutboxEntry ──────────────────────────────────────────────────────────

    #[test]
    fn outbox_entry_round_trips() {
        let mut payload = serde_json::Map::new();
        payload.insert("text".to_string(), json!("hello"));
        let entry = OutboxEntry::create(AgentId::new("scout"), 42, "report", payload)
            .with_tags(vec!["a".to_string(), "b".to_string()])
            .with_recipients(Some(ids(&["editor"])));

        let encoded = serde_json::to_string(&entry).unwrap();
        let decoded: OutboxEntry = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.text(), Some("hello"));
    }

    #[test]
    fn legacy_timestamp_field_is_accepted() {
        let legacy = json!({
            "id": "abc",
            "tick": 3,
            "agent": "scout",
            "kind": "message",
            "payload": { "text": "old" },
            "tags": [],
            "timestamp": "2024-05-01T12:00:00+00:00",
            "meta": {}
        });

        let entry: OutboxEntry = serde_json::from_value(legacy).unwrap();
        assert_eq!(entry.created_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(entry.recipients, None);
    }

    #[test]
    fn created_at_wins_over_legacy_timestamp() {
        let both = json!({
            "id": "abc",
            "tick": 3,
            "agent": "scout",
            "kind": "message",
            "created_at": "2024-05-02T08:30:00+00:00",
            "timestamp": "2024-05-01T12:00:00+00:00"
        });

        let entry: OutboxEntry = serde_json::from_value(both).unwrap();
        assert_eq!(entry.created_at.to_rfc3339(), "2024-05-02T08:30:00+00:00");

        let reread: OutboxEntry = serde_json::from_str(&serde_json::to_string(&entry).unwrap()).unwrap();
        assert_eq!(reread, entry);
    }

    #[test]
    fn entry_without_any_timestamp_is_rejected() {
        let bare = json!({ "id": "abc", "tick": 3, "agent": "scout", "kind": "message" });
        let err = serde_json::from_value::<OutboxEntry>(bare).unwrap_err();
        assert!(err.to_string().contains("created_at"));
    }

    #[test]
    fn entry_file_names_sort_by_tick_then_id() {
        let mut names = vec![
            entry_file_name(10, "aaa"),
            entry_file_name(9, "zzz"),
            entry_file_name(10, "0bc"),
            entry_file_name(100, "000"),
        ];
        names.sort();
        assert_eq!(
            names,
            vec![
                "00000009_zzz.json",
                "00000010_0bc.json",
                "00000010_aaa.json",
                "00000100_000.json"
            ]
        );
    }

    #[test]
    fn tick_from_file_name_rejects_garbage() {
        assert_eq!(tick_from_file_name("00000042_abc.json"), Some(42));
        assert_eq!(tick_from_file_name("00000042_abc.txt"), None);
        assert_eq!(tick_from_file_name("notes_abc.json"), None);
        assert_eq!(tick_from_file_name(".tmp-00000042_abc.json"), None);
        assert_eq!(tick_from_file_name("00000042.json"), None);
        assert_eq!(tick_from_file_name("_abc.json"), None);
    }

    #[test]
    fn recency_orders_by_tick_then_created_at() {
        let older = OutboxEntry::create(AgentId::new("a"), 5, "message", Default::default());
        let mut newer = older.clone();
        newer.id = "other".to_string();
        newer.created_at = older.created_at + chrono::Duration::seconds(1);
        let later_tick = OutboxEntry::create(AgentId::new("b"), 6, "message", Default::default());

        assert!(older.recency_cmp(&newer).is_lt());
        assert!(newer.recency_cmp(&later_tick).is_lt());
    }

    // ── Turn types ───────────────────────────────────────────────────────────

    #[test]
    fn memory_op_defaults_to_write_and_keeps_unknown_ops() {
        let update: MemoryUpdate = serde_json::from_value(json!({ "key": "k" })).unwrap();
        assert_eq!(update.op, MemoryOp::Write);

        let delete: MemoryUpdate =
            serde_json::from_value(json!({ "key": "k", "op": "delete" })).unwrap();
        assert_eq!(delete.op, MemoryOp::Delete);

        let odd: MemoryUpdate =
            serde_json::from_value(json!({ "key": "k", "op": "append" })).unwrap();
        assert_eq!(odd.op, MemoryOp::Other("append".to_string()));
    }

    #[test]
    fn outbox_draft_accepts_to_alias() {
        let draft: OutboxDraft =
            serde_json::from_value(json!({ "kind": "message", "to": ["friend"] })).unwrap();
        assert_eq!(draft.recipients, Some(ids(&["friend"])));
    }

    // ── LemmingError display messages ────────────────────────────────────────

    #[test]
    fn error_turn_failed_display_names_agent_and_tick() {
        let err = LemmingError::TurnFailed {
            agent: "scout".to_string(),
            tick: 7,
            reason: "upstream timeout".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("scout"));
        assert!(msg.contains("tick 7"));
        assert!(msg.contains("upstream timeout"));
    }

    #[test]
    fn error_config_error_display() {
        let err = LemmingError::ConfigError { reason: "interval must be positive".to_string() };
        let msg = err.to_string();
        assert!(msg.contains("configuration error"));
        assert!(msg.contains("interval must be positive"));
    }
}
