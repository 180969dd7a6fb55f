//! Transaction request types for the Reconciliation Engine
//!
//! This module defines the deposit/withdrawal requests that operators decide on,
//! their lifecycle status, and the fee assessment computed when one is approved.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request identifier
///
/// Assigned by the intake flow and immutable once the request exists.
pub type RequestId = String;

/// Canonical user identifier
///
/// The single key that indexes a user's ledger account.
pub type UserId = String;

/// Identity of the operator making a decision
pub type ActorId = String;

/// Kind of balance-affecting request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Top-up: credits the user's balance when approved
    Deposit,

    /// Payout: debits the gross amount from the user's balance when approved
    Withdrawal,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Deposit => "deposit",
            RequestKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a request
///
/// `Approved` and `Rejected` are terminal. The only legal transitions are
/// `Pending -> Approved` and `Pending -> Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// Whether no further transition is permitted from this status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fee assessed on a request at approval time
///
/// Captures the rate in force when the decision was made so the numbers stay
/// reproducible after the configured rate changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAssessment {
    /// Fee rate applied (0.05 = 5%)
    pub rate: Decimal,

    /// Fee retained by the platform, `gross - net`
    pub fee: Decimal,

    /// Amount received by the user (payout for withdrawals, credit for deposits)
    pub net_amount: Decimal,
}

impl FeeAssessment {
    /// Assessment with no fee: the whole amount goes through
    pub fn none(amount: Decimal) -> Self {
        Self {
            rate: Decimal::ZERO,
            fee: Decimal::ZERO,
            net_amount: amount,
        }
    }
}

/// A request as produced by the intake flow, before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    pub user_id: UserId,
    pub amount: Decimal,
    pub method: String,
}

/// A deposit or withdrawal request awaiting, or carrying, an operator decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub id: RequestId,
    pub kind: RequestKind,

    /// Owning user. The engine never manages the identity lifecycle.
    pub user_id: UserId,

    /// Gross requested amount, always positive
    pub amount: Decimal,

    pub status: RequestStatus,

    /// Payment channel tag (bank transfer, e-wallet, ...), informational only
    pub method: String,

    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<ActorId>,

    /// Operator-supplied reason, set on rejection
    pub rejection_reason: Option<String>,

    /// Fee breakdown, set on approval
    pub fee: Option<FeeAssessment>,
}

impl TransactionRequest {
    /// Create a pending request from intake data
    pub fn pending(new: NewRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            kind: new.kind,
            user_id: new.user_id,
            amount: new.amount,
            status: RequestStatus::Pending,
            method: new.method,
            created_at,
            decided_at: None,
            decided_by: None,
            rejection_reason: None,
            fee: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// Terminal write applied to a pending request
///
/// Handed to `RequestStore::finalize`, which applies it only if the stored
/// request is still `Pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalization {
    pub status: RequestStatus,
    pub decided_at: DateTime<Utc>,
    pub decided_by: ActorId,
    pub rejection_reason: Option<String>,
    pub fee: Option<FeeAssessment>,
}
