//! # lemming-local
//!
//! File-backed collaborators and a ready-wired runtime for running a LeMMing
//! organisation on one machine.
//!
//! ## Overview
//!
//! | Collaborator | Implementation |
//! |---|---|
//! | `MemoryStore` | [`FsMemoryStore`]: one JSON file per key under `agents/<name>/memory/` |
//! | `CreditLedger` | [`JsonCreditLedger`]: `lemming/config/credits.json` |
//! | `ActionLogger` | [`TracingActionLogger`]: `tracing` events plus `agents/<name>/logs/activity.log` |
//! | `ToolExecutor` | [`BuiltinTools`]: named tool registry with `echo` |
//! | `Generator` | [`ScriptedGenerator`], wrapped by [`RetryingGenerator`] |
//!
//! [`LocalRuntime`] ties these to `FsOutboxStore`, `JsonResponseDecoder` and
//! `TomlAgentDirectory` for one workspace directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lemming_local::{LocalRuntime, ScriptedGenerator};
//!
//! let generator = ScriptedGenerator::from_file(Path::new("script.toml"))?;
//! let runtime = LocalRuntime::open("./org", Box::new(generator))?;
//! let report = runtime.run_once()?;
//! ```
//!
//! No network provider is included; `scenarios::relay` shows a complete run.

pub mod credits;
pub mod generator;
pub mod logger;
pub mod memory;
pub mod runtime;
pub mod scenarios;
pub mod tools;

pub use credits::JsonCreditLedger;
pub use generator::{RetryingGenerator, ScriptedGenerator, IDLE_RESPONSE};
pub use logger::TracingActionLogger;
pub use memory::FsMemoryStore;
pub use runtime::LocalRuntime;
pub use tools::{BuiltinTools, EchoTool, Tool};
