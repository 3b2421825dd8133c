//! Contract violation and decode report types.
//!
//! The decoder never fails: it always yields a `TurnResult`, plus one
//! `ContractViolation` for every field it had to reject or default.

use serde::{Deserialize, Serialize};

use crate::turn::TurnResult;

/// One rejected or defaulted part of a generator response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractViolation {
    /// Dotted location of the offending value, e.g. `outbox_entries[2].payload`.
    pub field: String,
    /// Human-readable explanation, written to the action log.
    pub reason: String,
}

impl ContractViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

/// The result of decoding one generator response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodeReport {
    /// The sanitised result. Always usable, even when `violations` is non-empty.
    pub result: TurnResult,
    /// Every violation found, in the order the decoder met them.
    pub violations: Vec<ContractViolation>,
}

impl DecodeReport {
    /// True when the response matched the contract exactly.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}
