//! Outcome of an approve or reject call

use super::request::{ActorId, FeeAssessment, RequestId, RequestKind, RequestStatus, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Result of a successful decision
///
/// For rejections `previous_balance == new_balance`: the ledger is untouched
/// and both fields carry the balance observed at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub user_id: UserId,

    /// Terminal status the request moved to
    pub status: RequestStatus,

    pub previous_balance: Decimal,
    pub new_balance: Decimal,

    /// Gross requested amount
    pub amount: Decimal,

    /// Fee breakdown, `None` for rejections
    pub fee: Option<FeeAssessment>,

    pub decided_at: DateTime<Utc>,
    pub decided_by: ActorId,

    /// Rejection reason, if any
    pub reason: Option<String>,

    /// Id of the audit entry recording this decision
    ///
    /// `None` only when the audit sink was unavailable (see
    /// `EngineError::PartialSuccess`).
    pub audit_entry_id: Option<String>,
}

impl Decision {
    /// Signed change applied to the ledger
    pub fn delta(&self) -> Decimal {
        self.new_balance - self.previous_balance
    }

    pub fn is_approved(&self) -> bool {
        self.status == RequestStatus::Approved
    }
}
