//! # lemming-core
//!
//! The deterministic tick scheduler and turn engine for LeMMing agents.
//!
//! This crate provides:
//! - The collaborator traits the engine drives (`OutboxStore`, `Generator`, ...)
//! - The firing predicate and same-tick ordering (`schedule`)
//! - Generator context assembly (`context`)
//! - The persisted `TickClock`
//! - Crash-safe file writes (`persist`)
//! - The `Engine` that runs ticks and turns
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lemming_core::{Collaborators, Engine, TickClock};
//! ```

pub mod clock;
pub mod context;
pub mod engine;
pub mod persist;
pub mod schedule;
pub mod traits;

pub use clock::TickClock;
pub use context::{format_outbox_context, prompt_agent};
pub use engine::{Collaborators, Engine, StopSignal};
pub use schedule::{fire_point, firing_order, should_run, FirePoint};
