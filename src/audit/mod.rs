//! Audit sinks
//!
//! Implementations of [`AuditSink`](crate::core::traits::AuditSink):
//! - `memory` - in-process trail, used by tests and when no audit file is configured
//! - `jsonl` - append-only JSON-lines file

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlAuditSink;
pub use memory::MemoryAuditSink;
