//! The outbox entry record and its on-disk naming contract.
//!
//! Entries are immutable once written. The file name sorts lexicographically
//! by `(tick, id)` so a directory listing is already in recency order without
//! opening any file. Changing `ENTRY_TICK_WIDTH` or the layout below breaks
//! every existing outbox and must be versioned.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::AgentId;

/// Zero-padding width of the tick prefix in entry file names.
pub const ENTRY_TICK_WIDTH: usize = 8;

/// Extension shared by every entry file.
pub const ENTRY_EXTENSION: &str = ".json";

/// One immutable message an agent published to its outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntryRecord")]
pub struct OutboxEntry {
    /// Unique within the producing agent's outbox.
    pub id: String,
    /// Logical tick the entry was produced at.
    pub tick: u64,
    /// The producing agent.
    pub agent: AgentId,
    /// Free-form tag such as "message", "report" or "status".
    pub kind: String,
    pub payload: Map<String, Value>,
    pub tags: Vec<String>,
    /// Wall-clock creation time. Older files call this `timestamp`.
    pub created_at: DateTime<Utc>,
    /// Explicit addressees; `None` means visible to every permitted reader.
    pub recipients: Option<Vec<AgentId>>,
    /// Side-channel data. Never affects ordering or routing.
    pub meta: Map<String, Value>,
}

/// On-disk form accepted on read. `created_at` wins over the legacy
/// `timestamp` when a file carries both.
#[derive(Deserialize)]
struct EntryRecord {
    id: String,
    tick: u64,
    agent: AgentId,
    kind: String,
    #[serde(default)]
    payload: Map<String, Value>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    recipients: Option<Vec<AgentId>>,
    #[serde(default)]
    meta: Map<String, Value>,
}

impl TryFrom<EntryRecord> for OutboxEntry {
    type Error = String;

    fn try_from(record: EntryRecord) -> Result<Self, Self::Error> {
        let created_at = record
            .created_at
            .or(record.timestamp)
            .ok_or_else(|| "missing field `created_at`".to_string())?;
        Ok(Self {
            id: record.id,
            tick: record.tick,
            agent: record.agent,
            kind: record.kind,
            payload: record.payload,
            tags: record.tags,
            created_at,
            recipients: record.recipients,
            meta: record.meta,
        })
    }
}

impl OutboxEntry {
    /// Create a fresh entry with a new random id stamped with the current time.
    pub fn create(
        agent: AgentId,
        tick: u64,
        kind: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            tick,
            agent,
            kind: kind.into(),
            payload,
            tags: Vec::new(),
            created_at: Utc::now(),
            recipients: None,
            meta: Map::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_recipients(mut self, recipients: Option<Vec<AgentId>>) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    /// The persisted file name: `<zero-padded tick>_<id>.json`.
    pub fn file_name(&self) -> String {
        entry_file_name(self.tick, &self.id)
    }

    /// The human-readable body, if the payload carries one.
    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }

    /// Ascending recency order: tick, then creation time, then id.
    ///
    /// Readers sort with the reverse of this so the newest entry comes first.
    pub fn recency_cmp(&self, other: &Self) -> Ordering {
        self.tick
            .cmp(&other.tick)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Build the file name for an entry produced at `tick` with id `id`.
pub fn entry_file_name(tick: u64, id: &str) -> String {
    format!("{:0width$}_{}{}", tick, id, ENTRY_EXTENSION, width = ENTRY_TICK_WIDTH)
}

/// Extract the tick prefix from an entry file name.
///
/// Returns `None` for anything that is not an entry file: wrong extension,
/// hidden temp files, or a non-numeric prefix.
pub fn tick_from_file_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(ENTRY_EXTENSION)?;
    let (prefix, id) = stem.split_once('_')?;
    if prefix.is_empty() || id.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}
