//! Runtime error types for the LeMMing engine.
//!
//! All fallible operations return `LemmingResult<T>`. Only generator failures
//! and storage I/O escape a turn; malformed generator output never does.

use thiserror::Error;

/// The unified error type for the LeMMing crates.
#[derive(Debug, Error)]
pub enum LemmingError {
    /// An agent id cannot be used as a path segment.
    #[error("invalid agent id '{id}': {reason}")]
    InvalidAgentId { id: String, reason: String },

    /// A turn aborted because the generator call failed.
    ///
    /// Carries the triggering agent so the tick driver can report it.
    #[error("turn failed for agent '{agent}' at tick {tick}: {reason}")]
    TurnFailed { agent: String, tick: u64, reason: String },

    /// A generator implementation could not produce a response.
    #[error("generation failed: {reason}")]
    Generation { reason: String },

    /// An outbox entry could not be persisted.
    #[error("outbox write failed for agent '{agent}': {reason}")]
    OutboxWrite { agent: String, reason: String },

    /// An outbox directory could not be listed or pruned.
    #[error("outbox read failed: {reason}")]
    OutboxRead { reason: String },

    /// Persisted engine state (the tick clock) could not be written.
    #[error("state i/o failed for '{path}': {reason}")]
    StateIo { path: String, reason: String },

    /// A configuration file is malformed or holds an invalid value.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The credit ledger could not be read or updated.
    #[error("credit ledger error: {reason}")]
    CreditLedger { reason: String },

    /// The memory store could not complete an operation.
    #[error("memory store error: {reason}")]
    Memory { reason: String },
}

/// Convenience alias used throughout the LeMMing crates.
pub type LemmingResult<T> = Result<T, LemmingError>;
