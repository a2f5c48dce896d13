//! Storage backends for audit events.
//!
//! In-memory and no-op loggers live in [`crate::traits`]; this module holds
//! the persistent ones.

mod json_file;

pub use json_file::{read_events, JsonlAuditLogger, RotationConfig, RotationPolicy};
