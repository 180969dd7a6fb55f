//! Operator commands read from the command pipeline

use super::request::{ActorId, NewRequest, RequestId};

/// A single row of the command pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Intake of a new pending request
    Submit(NewRequest),

    /// Operator approval
    Approve {
        request_id: RequestId,
        actor_id: ActorId,
    },

    /// Operator rejection
    Reject {
        request_id: RequestId,
        actor_id: ActorId,
        reason: Option<String>,
    },
}

impl Command {
    /// Request the command refers to
    pub fn request_id(&self) -> &str {
        match self {
            Command::Submit(new) => &new.id,
            Command::Approve { request_id, .. } | Command::Reject { request_id, .. } => request_id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Command::Submit(_) => "submit",
            Command::Approve { .. } => "approve",
            Command::Reject { .. } => "reject",
        }
    }
}
