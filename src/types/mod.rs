//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `request`: Transaction requests, their status and fee assessment
//! - `account`: Ledger accounts and applied-mutation tokens
//! - `command`: Operator commands read from the command pipeline
//! - `audit`: Audit entries and audit queries
//! - `decision`: Outcome of approve/reject calls
//! - `error`: Error types for the engine, stores and notifications

pub mod account;
pub mod audit;
pub mod command;
pub mod decision;
pub mod error;
pub mod request;

pub use account::{AppliedMutation, LedgerAccount};
pub use audit::{AuditAction, AuditEntry, AuditQuery, TRANSACTION_REQUEST_ENTITY};
pub use command::Command;
pub use decision::Decision;
pub use error::{EngineError, FeeError, InvalidRequestReason, NotifyError, StoreError};
pub use request::{
    ActorId, FeeAssessment, Finalization, NewRequest, RequestId, RequestKind, RequestStatus,
    TransactionRequest, UserId,
};
