//! Notification payload sent to external channels

use crate::types::{AuditAction, Decision, RequestKind, RequestStatus};
use serde::{Deserialize, Serialize};

/// Message describing a decided request
///
/// Serialized as the webhook JSON body:
/// `{"type": ..., "title": ..., "message": ..., "recipientRef": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Event type, the audit action name (`deposit_approved`, ...)
    #[serde(rename = "type")]
    pub event_type: String,

    pub title: String,
    pub message: String,

    /// Recipient reference, the owning user id
    pub recipient_ref: String,
}

impl NotificationEvent {
    /// Render the event for a decision
    pub fn from_decision(decision: &Decision) -> Self {
        let event_type = AuditAction::for_transition(decision.kind, decision.status)
            .map(|action| action.as_str().to_string())
            .unwrap_or_else(|| format!("{}_{}", decision.kind, decision.status));

        let title = match (decision.kind, decision.status) {
            (RequestKind::Deposit, RequestStatus::Approved) => "Deposit approved",
            (RequestKind::Deposit, _) => "Deposit rejected",
            (RequestKind::Withdrawal, RequestStatus::Approved) => "Withdrawal approved",
            (RequestKind::Withdrawal, _) => "Withdrawal rejected",
        }
        .to_string();

        let message = match (decision.status, &decision.fee, &decision.reason) {
            (RequestStatus::Approved, Some(fee), _) if !fee.fee.is_zero() => format!(
                "Request {} for {} approved: fee {}, net {}, balance {}",
                decision.request_id, decision.amount, fee.fee, fee.net_amount, decision.new_balance
            ),
            (RequestStatus::Approved, _, _) => format!(
                "Request {} for {} approved, balance {}",
                decision.request_id, decision.amount, decision.new_balance
            ),
            (_, _, Some(reason)) => format!(
                "Request {} for {} rejected: {}",
                decision.request_id, decision.amount, reason
            ),
            (_, _, None) => format!(
                "Request {} for {} rejected",
                decision.request_id, decision.amount
            ),
        };

        Self {
            event_type,
            title,
            message,
            recipient_ref: decision.user_id.clone(),
        }
    }
}
