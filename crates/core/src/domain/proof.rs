use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{LeadId, ProofEventId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Whatsapp,
    Email,
    Call,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
            Self::Email => "email",
            Self::Call => "call",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sms" => Some(Self::Sms),
            "whatsapp" => Some(Self::Whatsapp),
            "email" => Some(Self::Email),
            "call" | "phone" => Some(Self::Call),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofType {
    Sent,
    Delivered,
    Read,
}

impl ProofType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Read => "READ",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SENT" => Some(Self::Sent),
            "DELIVERED" => Some(Self::Delivered),
            "READ" => Some(Self::Read),
            _ => None,
        }
    }
}

/// Idempotency key of a proof: a repeated provider notification maps to the same row.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProofKey {
    pub lead_id: LeadId,
    pub channel: Channel,
    pub provider_message_id: String,
    pub proof_type: ProofType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEvent {
    pub id: ProofEventId,
    pub lead_id: LeadId,
    pub channel: Channel,
    pub provider: String,
    pub provider_message_id: String,
    pub proof_type: ProofType,
    pub occurred_at: DateTime<Utc>,
    pub is_manual: bool,
}

impl ProofEvent {
    pub fn key(&self) -> ProofKey {
        ProofKey {
            lead_id: self.lead_id.clone(),
            channel: self.channel,
            provider_message_id: self.provider_message_id.clone(),
            proof_type: self.proof_type,
        }
    }
}

/// Result of recording a proof; `reused` marks a duplicate notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    pub proof_event_id: ProofEventId,
    pub reused: bool,
}
