//! Rust Reconciliation Engine Library
//! # Overview
//!
//! This library decides pending deposit and withdrawal requests and applies
//! approved ones to a versioned ledger exactly once, even when approvals race
//! or a previous attempt stopped halfway.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (requests, ledger accounts, audit entries, errors)
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Approve/reject orchestration and stalled-approval recovery
//!   - [`core::guard`] - Per-request idempotency guard with expiring leases
//!   - [`core::ledger_store`] - Versioned balances with compare-and-swap updates
//!   - [`core::request_store`] - Request status with atomic terminal transitions
//! - [`audit`] - Audit sinks (in-memory, JSON lines)
//! - [`notify`] - Notification channels and the background dispatcher
//! - [`io`] - CSV command input and ledger output
//! - [`strategy`] - Sync and async processing pipelines
//! - [`logging`] - tracing subscriber setup
//!
//! # Approval Flow
//!
//! 1. Claim the request's lease; a second concurrent caller gets `AlreadyProcessing`
//! 2. Reject anything not `Pending`
//! 3. Apply the fee-adjusted delta with a version-checked ledger write, tagged
//!    with the request id so it can never be applied twice
//! 4. Move the request to `Approved` and append the audit entry
//! 5. Queue notifications without waiting for delivery
//!
//! A request whose ledger write landed but whose status write did not is
//! completed from the recorded mutation, never re-applied.

// Module declarations
pub mod audit;
pub mod cli;
pub mod core;
pub mod io;
pub mod logging;
pub mod notify;
pub mod strategy;
pub mod types;

pub use core::{EngineConfig, FeeSchedule, ReconciliationEngine, RecoveryReport};
pub use io::write_accounts_csv;
pub use types::{
    AuditEntry, AuditQuery, Decision, EngineError, LedgerAccount, NewRequest, RequestKind,
    RequestStatus, StoreError, TransactionRequest,
};
