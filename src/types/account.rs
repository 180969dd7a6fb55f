//! Ledger account types for the Reconciliation Engine
//!
//! This module defines the per-user balance record and the idempotency record
//! stored alongside every balance mutation.

use super::request::{ActorId, FeeAssessment, RequestId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A user's monetary balance
///
/// Created implicitly on the first balance-affecting event and never deleted.
/// Only the Reconciliation Engine mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAccount {
    /// Canonical user identifier (primary key)
    pub user_id: UserId,

    /// Current balance
    ///
    /// Invariant: never negative.
    pub balance: Decimal,

    /// Monotonic write counter used for compare-and-swap
    ///
    /// Starts at 0 for a fresh account and increases by one per mutation.
    pub version: u64,

    pub last_modified_at: Option<DateTime<Utc>>,
}

impl LedgerAccount {
    /// Create a new account with zero balance
    ///
    /// # Arguments
    ///
    /// * `user_id` - The user this account belongs to
    pub fn new(user_id: impl Into<UserId>) -> Self {
        LedgerAccount {
            user_id: user_id.into(),
            balance: Decimal::ZERO,
            version: 0,
            last_modified_at: None,
        }
    }
}

/// Proof that a request's delta has been applied to a ledger account
///
/// Written atomically with the balance change, keyed by request id. Its
/// presence is what prevents a retried approval from applying the delta twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMutation {
    /// Request id used as the idempotency token
    pub request_id: RequestId,

    /// Operator whose approval applied the delta
    pub actor_id: ActorId,

    /// Signed change to the balance
    pub delta: Decimal,

    pub previous_balance: Decimal,
    pub new_balance: Decimal,

    /// Fee breakdown computed when the delta was applied
    pub fee: FeeAssessment,

    /// Account version after the mutation
    pub version: u64,

    pub applied_at: DateTime<Utc>,
}
