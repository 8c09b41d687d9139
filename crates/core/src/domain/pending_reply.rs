use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{LeadId, OutboundMessageId, PendingReplyId, WorkspaceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReplyType {
    HandoverConfirmation,
    OutcomeFollowup,
}

impl PendingReplyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HandoverConfirmation => "handover_confirmation",
            Self::OutcomeFollowup => "outcome_followup",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "handover_confirmation" => Some(Self::HandoverConfirmation),
            "outcome_followup" => Some(Self::OutcomeFollowup),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingReplyStatus {
    Pending,
    Replied,
    Expired,
}

impl PendingReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Replied => "REPLIED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "REPLIED" => Some(Self::Replied),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Outstanding prompt sent to an agent. Replies are consumed outside this crate family.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAgentReply {
    pub id: PendingReplyId,
    pub lead_id: LeadId,
    pub workspace_id: WorkspaceId,
    pub user_id: String,
    pub reply_type: PendingReplyType,
    pub status: PendingReplyStatus,
    pub outbound_message_id: Option<OutboundMessageId>,
    pub expires_at: DateTime<Utc>,
    pub reply_value: Option<String>,
    pub created_at: DateTime<Utc>,
}
