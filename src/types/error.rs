//! Error types for the Reconciliation Engine
//!
//! Errors are structured: every variant carries the ids and state needed for the
//! caller to decide what to do next. Operator-facing wording is left to the
//! calling layer.
//!
//! # Error Categories
//!
//! - **Engine errors** (`EngineError`): outcomes of approve/reject/submit calls
//! - **Store errors** (`StoreError`): failures reported by ledger, request and audit stores
//! - **Notification errors** (`NotifyError`): delivery failures, never fatal to a decision

use super::decision::Decision;
use super::request::{RequestKind, RequestStatus, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Error returned by the Reconciliation Engine
///
/// Only `AlreadyProcessing` and `Conflict` are safe for automatic bounded retry
/// (see [`EngineError::is_retryable`]). `AlreadyDecided` is a no-op from the
/// point of view of a caller that retries a decision it already made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// No request exists with this id
    #[error("Request {request_id} not found")]
    NotFound {
        /// Request id that was looked up
        request_id: String,
    },

    /// The request already reached a terminal status
    #[error("Request {request_id} is already {status}")]
    AlreadyDecided {
        /// Request id
        request_id: String,
        /// Current terminal status
        status: RequestStatus,
    },

    /// Another caller currently holds the guard for this request
    #[error("Request {request_id} is already being processed")]
    AlreadyProcessing {
        /// Request id
        request_id: String,
    },

    /// Approving the withdrawal would drive the balance negative
    ///
    /// Nothing was mutated; the request stays `Pending`.
    #[error("Insufficient balance for request {request_id} (user {user_id}): balance {balance}, requested {requested}")]
    InsufficientBalance {
        /// Request id
        request_id: String,
        /// Owning user
        user_id: UserId,
        /// Balance observed at decision time
        balance: Decimal,
        /// Gross amount the withdrawal would debit
        requested: Decimal,
    },

    /// Ledger compare-and-swap kept losing to concurrent writers
    #[error("Ledger conflict for request {request_id} (user {user_id}) after {attempts} attempts")]
    Conflict {
        /// Request id
        request_id: String,
        /// Owning user
        user_id: UserId,
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Ledger and status were updated but the audit entry could not be recorded
    ///
    /// The decision stands; the audit trail must be reconciled manually.
    #[error("Request {} decided as {} but audit recording failed: {source}", .decision.request_id, .decision.status)]
    PartialSuccess {
        /// The decision that was applied
        decision: Box<Decision>,
        /// Last audit failure
        source: StoreError,
    },

    /// A store call failed and could not be completed within its retry budget
    #[error("Storage failure for request {request_id}: {source}")]
    Storage {
        /// Request id
        request_id: String,
        /// Underlying store error
        source: StoreError,
    },

    /// Intake data failed validation
    #[error("Invalid request {request_id}: {reason}")]
    InvalidRequest {
        /// Request id
        request_id: String,
        /// Which rule was violated
        reason: InvalidRequestReason,
    },

    /// Decimal arithmetic would overflow
    #[error("Arithmetic overflow applying request {request_id} to user {user_id}")]
    ArithmeticOverflow {
        /// Request id
        request_id: String,
        /// Owning user
        user_id: UserId,
    },

    /// The configured fee rate for the request's kind is outside `[0, 1)`
    ///
    /// Nothing was mutated; the request stays `Pending`.
    #[error("Fee rate {rate} for request {request_id} is outside [0, 1)")]
    InvalidFeeRate {
        /// Request id
        request_id: String,
        /// Offending rate
        rate: Decimal,
    },
}

/// Intake validation rule that a request violated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidRequestReason {
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("amount is finer than the smallest currency unit")]
    ExcessPrecision,
    #[error("user id is empty")]
    MissingUser,
    #[error("request id is empty")]
    MissingId,
    #[error("request id already exists")]
    DuplicateId,
}

impl EngineError {
    /// Whether the caller may retry automatically after a short delay
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::AlreadyProcessing { .. } | EngineError::Conflict { .. }
        )
    }

    /// Request id the error refers to
    pub fn request_id(&self) -> &str {
        match self {
            EngineError::NotFound { request_id }
            | EngineError::AlreadyDecided { request_id, .. }
            | EngineError::AlreadyProcessing { request_id }
            | EngineError::InsufficientBalance { request_id, .. }
            | EngineError::Conflict { request_id, .. }
            | EngineError::Storage { request_id, .. }
            | EngineError::InvalidRequest { request_id, .. }
            | EngineError::ArithmeticOverflow { request_id, .. }
            | EngineError::InvalidFeeRate { request_id, .. } => request_id,
            EngineError::PartialSuccess { decision, .. } => &decision.request_id,
        }
    }

    /// Create a NotFound error
    pub fn not_found(request_id: &str) -> Self {
        EngineError::NotFound {
            request_id: request_id.to_string(),
        }
    }

    /// Create an AlreadyDecided error
    pub fn already_decided(request_id: &str, status: RequestStatus) -> Self {
        EngineError::AlreadyDecided {
            request_id: request_id.to_string(),
            status,
        }
    }

    /// Create an AlreadyProcessing error
    pub fn already_processing(request_id: &str) -> Self {
        EngineError::AlreadyProcessing {
            request_id: request_id.to_string(),
        }
    }

    /// Create an InsufficientBalance error
    pub fn insufficient_balance(
        request_id: &str,
        user_id: &str,
        balance: Decimal,
        requested: Decimal,
    ) -> Self {
        EngineError::InsufficientBalance {
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            balance,
            requested,
        }
    }

    /// Create a Conflict error
    pub fn conflict(request_id: &str, user_id: &str, attempts: u32) -> Self {
        EngineError::Conflict {
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            attempts,
        }
    }

    /// Create a Storage error
    pub fn storage(request_id: &str, source: StoreError) -> Self {
        EngineError::Storage {
            request_id: request_id.to_string(),
            source,
        }
    }

    /// Create an InvalidRequest error
    pub fn invalid_request(request_id: &str, reason: InvalidRequestReason) -> Self {
        EngineError::InvalidRequest {
            request_id: request_id.to_string(),
            reason,
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(request_id: &str, user_id: &str) -> Self {
        EngineError::ArithmeticOverflow {
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
        }
    }

    /// Create an InvalidFeeRate error
    pub fn invalid_fee_rate(request_id: &str, rate: Decimal) -> Self {
        EngineError::InvalidFeeRate {
            request_id: request_id.to_string(),
            rate,
        }
    }
}

/// Error assessing a fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FeeError {
    /// The rate for this kind is outside `[0, 1)`
    #[error("{kind} fee rate {rate} is outside [0, 1)")]
    InvalidRate { kind: RequestKind, rate: Decimal },

    #[error("fee computation overflowed")]
    Overflow,
}

/// Error reported by a ledger, request or audit store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// No record under this key
    #[error("Record {key} not found")]
    NotFound {
        /// Key that was looked up
        key: String,
    },

    /// Insert refused because the key is taken
    #[error("Record {key} already exists")]
    DuplicateKey {
        /// Key that already exists
        key: String,
    },

    /// Compare-and-swap saw a different version than expected
    #[error("Version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Key of the contended record
        key: String,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// The idempotency token was already applied to this account
    #[error("Mutation {token} already applied to {key}")]
    TokenAlreadyApplied {
        /// Account key
        key: String,
        /// Request id used as the token
        token: String,
    },

    /// Write refused because the balance would be negative
    #[error("Balance of {key} would become negative ({balance})")]
    NegativeBalance {
        /// Account key
        key: String,
        /// Balance the write attempted to store
        balance: Decimal,
    },

    /// Status write refused because the record is no longer Pending
    #[error("Record {key} cannot transition from {current}")]
    InvalidTransition {
        /// Request key
        key: String,
        /// Status currently stored
        current: RequestStatus,
    },

    /// Transient backend failure; the call may be retried
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of the failure
        message: String,
    },

    /// I/O failure in a file-backed store
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },
}

impl StoreError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. } | StoreError::Io { .. })
    }

    /// Create an Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
        }
    }
}

// Conversion from io::Error to StoreError
impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        StoreError::Io {
            message: error.to_string(),
        }
    }
}

// Conversion from serde_json::Error to StoreError
impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Io {
            message: format!("malformed record: {}", error),
        }
    }
}

/// Error delivering a notification to an external channel
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The request never reached the endpoint or the connection failed
    #[error("Transport error on channel {channel}: {message}")]
    Transport {
        /// Channel name
        channel: String,
        /// Description of the failure
        message: String,
    },

    /// The endpoint answered with a non-success status
    #[error("Channel {channel} rejected notification with status {status}")]
    Rejected {
        /// Channel name
        channel: String,
        /// HTTP status code
        status: u16,
    },

    /// The event could not be encoded for the channel
    #[error("Failed to encode notification for channel {channel}: {message}")]
    Serialization {
        /// Channel name
        channel: String,
        /// Description of the failure
        message: String,
    },
}

impl NotifyError {
    /// Name of the channel that failed
    pub fn channel(&self) -> &str {
        match self {
            NotifyError::Transport { channel, .. }
            | NotifyError::Rejected { channel, .. }
            | NotifyError::Serialization { channel, .. } => channel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::not_found(EngineError::not_found("r1"), "Request r1 not found")]
    #[case::already_decided(
        EngineError::already_decided("r1", RequestStatus::Approved),
        "Request r1 is already approved"
    )]
    #[case::already_processing(
        EngineError::already_processing("r1"),
        "Request r1 is already being processed"
    )]
    #[case::insufficient_balance(
        EngineError::insufficient_balance("r1", "alice", Decimal::new(100_000, 0), Decimal::new(120_000, 0)),
        "Insufficient balance for request r1 (user alice): balance 100000, requested 120000"
    )]
    #[case::conflict(
        EngineError::conflict("r1", "alice", 5),
        "Ledger conflict for request r1 (user alice) after 5 attempts"
    )]
    #[case::storage(
        EngineError::storage("r1", StoreError::unavailable("timeout")),
        "Storage failure for request r1: Store unavailable: timeout"
    )]
    #[case::invalid_request(
        EngineError::invalid_request("r1", InvalidRequestReason::NonPositiveAmount),
        "Invalid request r1: amount must be positive"
    )]
    #[case::excess_precision(
        EngineError::invalid_request("r1", InvalidRequestReason::ExcessPrecision),
        "Invalid request r1: amount is finer than the smallest currency unit"
    )]
    #[case::invalid_fee_rate(
        EngineError::invalid_fee_rate("r1", Decimal::new(15, 1)),
        "Fee rate 1.5 for request r1 is outside [0, 1)"
    )]
    fn test_error_display(#[case] error: EngineError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::already_processing(EngineError::already_processing("r1"), true)]
    #[case::conflict(EngineError::conflict("r1", "alice", 5), true)]
    #[case::not_found(EngineError::not_found("r1"), false)]
    #[case::already_decided(EngineError::already_decided("r1", RequestStatus::Rejected), false)]
    #[case::insufficient_balance(
        EngineError::insufficient_balance("r1", "alice", Decimal::ZERO, Decimal::ONE),
        false
    )]
    #[case::invalid_fee_rate(EngineError::invalid_fee_rate("r1", Decimal::ONE), false)]
    fn test_retryable_kinds(#[case] error: EngineError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
        assert_eq!(error.request_id(), "r1");
    }

    #[rstest]
    #[case::version_conflict(
        StoreError::VersionConflict { key: "alice".to_string(), expected: 1, actual: 2 },
        "Version conflict on alice: expected 1, found 2",
        false
    )]
    #[case::token_applied(
        StoreError::TokenAlreadyApplied { key: "alice".to_string(), token: "r1".to_string() },
        "Mutation r1 already applied to alice",
        false
    )]
    #[case::invalid_transition(
        StoreError::InvalidTransition { key: "r1".to_string(), current: RequestStatus::Rejected },
        "Record r1 cannot transition from rejected",
        false
    )]
    #[case::unavailable(StoreError::unavailable("down"), "Store unavailable: down", true)]
    fn test_store_error_display(
        #[case] error: StoreError,
        #[case] expected: &str,
        #[case] transient: bool,
    ) {
        assert_eq!(error.to_string(), expected);
        assert_eq!(error.is_transient(), transient);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: StoreError = io_error.into();
        assert!(matches!(error, StoreError::Io { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}
