//! Core business logic module
//!
//! This module contains the approval pipeline components:
//! - `traits` - Store abstractions the engine is written against
//! - `ledger_store` / `request_store` - DashMap-backed store implementations
//! - `guard` - Per-request idempotency guard with expiring leases
//! - `fee` - Fee assessment at approval time
//! - `config` - Engine tuning knobs
//! - `engine` - Approve/reject orchestration and stalled-approval recovery
//! - `batch_processor` - Command execution with user-based partitioning

pub mod batch_processor;
pub mod config;
pub mod engine;
pub mod fee;
pub mod guard;
pub mod ledger_store;
pub mod request_store;
pub mod traits;

pub use batch_processor::{BatchProcessor, CommandOutcome, ProcessingResult};
pub use config::EngineConfig;
pub use engine::{ReconciliationEngine, RecoveryReport};
pub use fee::FeeSchedule;
pub use guard::{IdempotencyGuard, LeaseGuard};
pub use ledger_store::InMemoryLedgerStore;
pub use request_store::InMemoryRequestStore;
pub use traits::{AuditSink, LedgerStore, RequestStore};
