//! Storage traits for ledger accounts, transaction requests and the audit trail
//!
//! These are the seams between the Reconciliation Engine and whatever durable
//! store backs it. The engine only needs simple get/set/list operations plus two
//! atomic primitives: a versioned compare-and-swap on a ledger account and a
//! guarded `Pending -> terminal` write on a request.
//!
//! All traits are object safe so the engine can hold `Arc<dyn ...>` and tests can
//! substitute failing implementations.

use crate::types::{
    AppliedMutation, AuditEntry, AuditQuery, Finalization, LedgerAccount, RequestStatus,
    StoreError, TransactionRequest,
};
use rust_decimal::Decimal;

/// Durable storage of user balances
pub trait LedgerStore: Send + Sync {
    /// Get the account for a user, if one exists
    fn get(&self, user_id: &str) -> Result<Option<LedgerAccount>, StoreError>;

    /// Get the account for a user, creating a zero-balance account if absent
    fn get_or_create(&self, user_id: &str) -> Result<LedgerAccount, StoreError>;

    /// Atomically replace the balance if the stored version still matches
    ///
    /// The mutation's `request_id` is the idempotency token: it is recorded with
    /// the new balance in the same atomic step, and a second write carrying the
    /// same token fails with `TokenAlreadyApplied`.
    ///
    /// # Errors
    ///
    /// * `VersionConflict` - another writer got there first; re-read and retry
    /// * `TokenAlreadyApplied` - this request's delta is already in the balance
    /// * `NegativeBalance` - `new_balance` is below zero
    fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: u64,
        new_balance: Decimal,
        mutation: AppliedMutation,
    ) -> Result<LedgerAccount, StoreError>;

    /// Look up the mutation recorded for a request id, if it was applied
    fn applied_mutation(
        &self,
        user_id: &str,
        request_id: &str,
    ) -> Result<Option<AppliedMutation>, StoreError>;

    /// Snapshot of all accounts
    fn list(&self) -> Result<Vec<LedgerAccount>, StoreError>;
}

/// Durable storage of transaction requests
pub trait RequestStore: Send + Sync {
    /// Store a new request; fails with `DuplicateKey` if the id is taken
    fn insert(&self, request: TransactionRequest) -> Result<(), StoreError>;

    /// Get a request by id
    fn get(&self, request_id: &str) -> Result<Option<TransactionRequest>, StoreError>;

    /// Move a `Pending` request to a terminal status
    ///
    /// # Errors
    ///
    /// * `NotFound` - no request with this id
    /// * `InvalidTransition` - the request is no longer `Pending`
    fn finalize(
        &self,
        request_id: &str,
        finalization: Finalization,
    ) -> Result<TransactionRequest, StoreError>;

    /// Snapshot of all requests
    fn list(&self) -> Result<Vec<TransactionRequest>, StoreError>;

    /// Snapshot of requests currently in `status`
    fn list_by_status(&self, status: RequestStatus) -> Result<Vec<TransactionRequest>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|request| request.status == status)
            .collect())
    }
}

/// Append-only audit trail
pub trait AuditSink: Send + Sync {
    /// Append an entry
    fn record(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Read back entries matching `query`, oldest first
    fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError>;
}
