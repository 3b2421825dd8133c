//! # lemming-outbox
//!
//! The file-backed outbox message bus for the LeMMing runtime.
//!
//! ## Overview
//!
//! Each agent owns `agents/<name>/outbox/`, a directory of immutable JSON
//! entry files named `<tick:08>_<id>.json`. Only the owning agent's turn
//! appends; any permitted agent reads. Because names sort by `(tick, id)`,
//! recency is decided from directory listings, which are cached per
//! directory and keyed by mtime.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lemming_outbox::FsOutboxStore;
//! use lemming_core::traits::OutboxStore;
//!
//! let store = FsOutboxStore::new("agents");
//! store.append(&agent, &entry)?;
//! let inbox = store.read_recent_merged(&sources, 50, None)?;
//! ```

pub mod cache;
pub mod merge;
pub mod store;

pub use cache::{ClearAtCapacity, EntryName, EvictionPolicy, ListingCache};
pub use lemming_core::context::format_outbox_context;
pub use store::FsOutboxStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
