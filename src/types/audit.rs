//! Audit trail types
//!
//! Every terminal decision produces exactly one `AuditEntry`. Entries are
//! append-only; nothing in the crate mutates or deletes one after recording.

use super::request::{ActorId, FeeAssessment, RequestId, RequestKind, RequestStatus, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Entity type recorded for request decisions
pub const TRANSACTION_REQUEST_ENTITY: &str = "transaction_request";

/// Decision recorded by an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    DepositApproved,
    DepositRejected,
    WithdrawalApproved,
    WithdrawalRejected,
}

impl AuditAction {
    /// Map a request kind and its terminal status to an action
    ///
    /// Returns `None` for `Pending`, which is never audited.
    pub fn for_transition(kind: RequestKind, status: RequestStatus) -> Option<Self> {
        match (kind, status) {
            (RequestKind::Deposit, RequestStatus::Approved) => Some(AuditAction::DepositApproved),
            (RequestKind::Deposit, RequestStatus::Rejected) => Some(AuditAction::DepositRejected),
            (RequestKind::Withdrawal, RequestStatus::Approved) => {
                Some(AuditAction::WithdrawalApproved)
            }
            (RequestKind::Withdrawal, RequestStatus::Rejected) => {
                Some(AuditAction::WithdrawalRejected)
            }
            (_, RequestStatus::Pending) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DepositApproved => "deposit_approved",
            AuditAction::DepositRejected => "deposit_rejected",
            AuditAction::WithdrawalApproved => "withdrawal_approved",
            AuditAction::WithdrawalRejected => "withdrawal_rejected",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub entry_id: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: RequestId,
    pub user_id: UserId,
    pub actor_id: ActorId,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,

    /// Gross requested amount
    pub amount: Decimal,

    /// Fee breakdown for approvals, `None` for rejections
    pub fee: Option<FeeAssessment>,

    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Allocate a fresh entry id
    pub fn next_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Filter for reading the audit trail back
///
/// All set fields must match. The time range is half-open: `from <= t < to`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditQuery {
    pub entity_id: Option<RequestId>,
    pub user_id: Option<UserId>,
    pub action: Option<AuditAction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AuditQuery {
    /// Entries for a single request
    pub fn for_entity(entity_id: impl Into<RequestId>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    /// Entries touching a single user's ledger
    pub fn for_user(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.entity_id
            .as_ref()
            .map_or(true, |id| *id == entry.entity_id)
            && self.user_id.as_ref().map_or(true, |id| *id == entry.user_id)
            && self.action.map_or(true, |action| action == entry.action)
            && self.from.map_or(true, |from| entry.timestamp >= from)
            && self.to.map_or(true, |to| entry.timestamp < to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn entry(entity_id: &str, user_id: &str, action: AuditAction) -> AuditEntry {
        AuditEntry {
            entry_id: AuditEntry::next_id(),
            action,
            entity_type: TRANSACTION_REQUEST_ENTITY.to_string(),
            entity_id: entity_id.to_string(),
            user_id: user_id.to_string(),
            actor_id: "admin".to_string(),
            previous_balance: Decimal::ZERO,
            new_balance: Decimal::new(100, 0),
            amount: Decimal::new(100, 0),
            fee: None,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    #[rstest]
    #[case(RequestKind::Deposit, RequestStatus::Approved, Some(AuditAction::DepositApproved))]
    #[case(RequestKind::Deposit, RequestStatus::Rejected, Some(AuditAction::DepositRejected))]
    #[case(RequestKind::Withdrawal, RequestStatus::Approved, Some(AuditAction::WithdrawalApproved))]
    #[case(RequestKind::Withdrawal, RequestStatus::Rejected, Some(AuditAction::WithdrawalRejected))]
    #[case(RequestKind::Deposit, RequestStatus::Pending, None)]
    fn test_action_for_transition(
        #[case] kind: RequestKind,
        #[case] status: RequestStatus,
        #[case] expected: Option<AuditAction>,
    ) {
        assert_eq!(AuditAction::for_transition(kind, status), expected);
    }

    #[test]
    fn test_action_serializes_snake_case() {
        let json = serde_json::to_string(&AuditAction::WithdrawalApproved).unwrap();
        assert_eq!(json, "\"withdrawal_approved\"");
    }

    #[test]
    fn test_query_filters_by_entity_and_user() {
        let e = entry("req-1", "alice", AuditAction::DepositApproved);

        assert!(AuditQuery::default().matches(&e));
        assert!(AuditQuery::for_entity("req-1").matches(&e));
        assert!(!AuditQuery::for_entity("req-2").matches(&e));
        assert!(AuditQuery::for_user("alice").matches(&e));
        assert!(!AuditQuery::for_user("bob").matches(&e));
    }

    #[test]
    fn test_query_time_range_is_half_open() {
        let e = entry("req-1", "alice", AuditAction::DepositApproved);

        let inclusive_start =
            AuditQuery::default().between(e.timestamp, e.timestamp + Duration::seconds(1));
        assert!(inclusive_start.matches(&e));

        let exclusive_end =
            AuditQuery::default().between(e.timestamp - Duration::seconds(1), e.timestamp);
        assert!(!exclusive_end.matches(&e));
    }
}
