use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{LeadId, ProofEventId, SlaStateId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MessageSent,
    ManualContact,
    DeliveryConfirmed,
    LeadClosed,
    Other(String),
}

impl StopReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::MessageSent => "message_sent",
            Self::ManualContact => "manual_contact",
            Self::DeliveryConfirmed => "delivery_confirmed",
            Self::LeadClosed => "lead_closed",
            Self::Other(value) => value.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "message_sent" => Self::MessageSent,
            "manual_contact" => Self::ManualContact,
            "delivery_confirmed" => Self::DeliveryConfirmed,
            "lead_closed" => Self::LeadClosed,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// The single deadline-tracking record of a lead.
///
/// `stopped_at` and `breached_at` are write-once; a stopped clock never breaches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaState {
    pub id: SlaStateId,
    pub lead_id: LeadId,
    pub started_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    pub stop_proof_event_id: Option<ProofEventId>,
    pub breached_at: Option<DateTime<Utc>>,
}

impl SlaState {
    pub fn start(
        lead_id: LeadId,
        started_at: DateTime<Utc>,
        deadline_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if deadline_at <= started_at {
            return Err(DomainError::Validation(format!(
                "sla deadline {deadline_at} must be after start {started_at}"
            )));
        }

        Ok(Self {
            id: SlaStateId::generate(),
            lead_id,
            started_at,
            deadline_at,
            stopped_at: None,
            stop_reason: None,
            stop_proof_event_id: None,
            breached_at: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.stopped_at.is_none() && self.breached_at.is_none()
    }

    /// Breach is inclusive at the boundary: a deadline equal to `now` is due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_running() && self.deadline_at <= now
    }

    /// Fraction of the response window consumed at `now`, clamped at zero.
    pub fn elapsed_ratio(&self, now: DateTime<Utc>) -> f64 {
        let window = (self.deadline_at - self.started_at).num_milliseconds();
        if window <= 0 {
            return 1.0;
        }
        let elapsed = (now - self.started_at).num_milliseconds().max(0);
        elapsed as f64 / window as f64
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOutcome {
    pub already_stopped: bool,
    pub stopped_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachSweep {
    pub processed: u32,
    pub breached: u32,
}
