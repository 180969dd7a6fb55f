//! Thread-safe in-memory ledger store
//!
//! This module provides the `InMemoryLedgerStore` struct, which keeps ledger
//! accounts in a `DashMap` so concurrent approvals for different users never
//! contend, while writes to the same account are serialized by the map's shard
//! lock.
//!
//! # Design
//!
//! Each account is stored together with the set of mutations already applied to
//! it, keyed by request id. `compare_and_swap` checks the idempotency token, the
//! expected version and the non-negativity invariant, then applies the new
//! balance and records the token, all while holding the entry lock. A reader can
//! therefore never observe a balance change without its token, or the reverse.

use crate::core::traits::LedgerStore;
use crate::types::{AppliedMutation, LedgerAccount, RequestId, StoreError, UserId};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Account state plus the idempotency tokens applied to it
#[derive(Debug, Clone)]
struct LedgerRecord {
    account: LedgerAccount,
    applied: HashMap<RequestId, AppliedMutation>,
}

impl LedgerRecord {
    fn new(user_id: &str) -> Self {
        Self {
            account: LedgerAccount::new(user_id),
            applied: HashMap::new(),
        }
    }
}

/// Thread-safe ledger store backed by `DashMap`
///
/// Concurrent reads and writes to different accounts proceed in parallel;
/// operations on the same account are serialized.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    /// Accounts keyed by canonical user id
    accounts: DashMap<UserId, LedgerRecord>,
}

impl InMemoryLedgerStore {
    /// Create a new empty store
    ///
    /// Accounts are created on demand by the first balance-affecting event.
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn get(&self, user_id: &str) -> Result<Option<LedgerAccount>, StoreError> {
        Ok(self
            .accounts
            .get(user_id)
            .map(|record| record.account.clone()))
    }

    fn get_or_create(&self, user_id: &str) -> Result<LedgerAccount, StoreError> {
        Ok(self
            .accounts
            .entry(user_id.to_string())
            .or_insert_with(|| LedgerRecord::new(user_id))
            .account
            .clone())
    }

    fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: u64,
        new_balance: Decimal,
        mutation: AppliedMutation,
    ) -> Result<LedgerAccount, StoreError> {
        let mut record = self
            .accounts
            .entry(user_id.to_string())
            .or_insert_with(|| LedgerRecord::new(user_id));

        // Token check comes first so a replayed mutation is reported as such
        // even when the version has moved on since.
        if record.applied.contains_key(&mutation.request_id) {
            return Err(StoreError::TokenAlreadyApplied {
                key: user_id.to_string(),
                token: mutation.request_id,
            });
        }

        if record.account.version != expected_version {
            return Err(StoreError::VersionConflict {
                key: user_id.to_string(),
                expected: expected_version,
                actual: record.account.version,
            });
        }

        if new_balance < Decimal::ZERO {
            return Err(StoreError::NegativeBalance {
                key: user_id.to_string(),
                balance: new_balance,
            });
        }

        let version = expected_version + 1;
        record.account.balance = new_balance;
        record.account.version = version;
        record.account.last_modified_at = Some(Utc::now());
        record.applied.insert(
            mutation.request_id.clone(),
            AppliedMutation { version, ..mutation },
        );

        Ok(record.account.clone())
    }

    fn applied_mutation(
        &self,
        user_id: &str,
        request_id: &str,
    ) -> Result<Option<AppliedMutation>, StoreError> {
        Ok(self
            .accounts
            .get(user_id)
            .and_then(|record| record.applied.get(request_id).cloned()))
    }

    fn list(&self) -> Result<Vec<LedgerAccount>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .map(|entry| entry.value().account.clone())
            .collect())
    }
}
