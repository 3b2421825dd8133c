//! # lemming-verify
//!
//! Decoding of generator responses for the LeMMing runtime.
//!
//! This crate provides [`decoder::JsonResponseDecoder`], which implements the
//! [`lemming_core::traits::ResponseDecoder`] trait. A response is expected to
//! be one JSON object with the keys `outbox_entries`, `tool_calls`,
//! `memory_updates` and `notes`, optionally wrapped in a fenced code block.
//! Anything else is repaired field by field and reported as a
//! `ContractViolation`, never as an error.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use lemming_verify::JsonResponseDecoder;
//!
//! let report = JsonResponseDecoder::new().decode_str(raw);
//! for v in &report.violations {
//!     eprintln!("{}: {}", v.field, v.reason);
//! }
//! ```

pub mod decoder;
pub mod fence;

pub use decoder::JsonResponseDecoder;
pub use fence::strip_fences;
