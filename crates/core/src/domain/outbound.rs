use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{LeadId, OutboundMessageId, WorkspaceId};
use crate::domain::proof::Channel;

pub const FAIL_REASON_MISSING_PHONE: &str = "missing_toPhone";
pub const FAIL_REASON_PROVIDER_ERROR: &str = "provider_error";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Queued,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "SENT" => Some(Self::Sent),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Who the message is for. Only lead-bound sends count as contact proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Audience {
    Lead,
    Agent,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "LEAD",
            Self::Agent => "AGENT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LEAD" => Some(Self::Lead),
            "AGENT" => Some(Self::Agent),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: OutboundMessageId,
    pub lead_id: LeadId,
    pub workspace_id: WorkspaceId,
    pub audience: Audience,
    pub channel: Channel,
    pub status: MessageStatus,
    pub to_phone: Option<String>,
    pub text: String,
    pub provider: Option<String>,
    pub provider_message_id: Option<String>,
    pub fail_reason: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn queued(
        lead_id: LeadId,
        workspace_id: WorkspaceId,
        audience: Audience,
        to_phone: Option<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OutboundMessageId::generate(),
            lead_id,
            workspace_id,
            audience,
            channel: Channel::Sms,
            status: MessageStatus::Queued,
            to_phone,
            text: text.into(),
            provider: None,
            provider_message_id: None,
            fail_reason: None,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            created_at,
        }
    }

    pub fn destination(&self) -> Option<&str> {
        self.to_phone.as_deref().map(str::trim).filter(|phone| !phone.is_empty())
    }
}

/// Counts reported by one dispatch pass; `processed = sent + failed + skipped`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub processed: u32,
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Audience, MessageStatus, OutboundMessage};
    use crate::domain::ids::{LeadId, WorkspaceId};

    #[test]
    fn blank_destination_is_treated_as_missing() {
        let message = OutboundMessage::queued(
            LeadId::from("L-1"),
            WorkspaceId::from("W-1"),
            Audience::Lead,
            Some("   ".to_owned()),
            "hello",
            Utc::now(),
        );

        assert_eq!(message.status, MessageStatus::Queued);
        assert_eq!(message.destination(), None);
    }

    #[test]
    fn audience_parses_storage_values() {
        assert_eq!(Audience::parse("agent"), Some(Audience::Agent));
        assert_eq!(MessageStatus::parse("sent"), Some(MessageStatus::Sent));
    }
}
