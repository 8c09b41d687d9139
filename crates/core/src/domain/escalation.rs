use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{EscalationEventId, LeadId};

/// Alert severity; the derived ordering is the only legal progression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationLevel {
    Reminder,
    Reassign,
    ManagerAlert,
}

impl EscalationLevel {
    pub const ALL: [Self; 3] = [Self::Reminder, Self::Reassign, Self::ManagerAlert];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reminder => "REMINDER",
            Self::Reassign => "REASSIGN",
            Self::ManagerAlert => "MANAGER_ALERT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "REMINDER" => Some(Self::Reminder),
            "REASSIGN" => Some(Self::Reassign),
            "MANAGER_ALERT" => Some(Self::ManagerAlert),
            _ => None,
        }
    }

    /// Level that follows `highest`, or the first level when nothing was raised yet.
    pub fn after(highest: Option<Self>) -> Option<Self> {
        match highest {
            None => Some(Self::Reminder),
            Some(Self::Reminder) => Some(Self::Reassign),
            Some(Self::Reassign) => Some(Self::ManagerAlert),
            Some(Self::ManagerAlert) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub id: EscalationEventId,
    pub lead_id: LeadId,
    pub level: EscalationLevel,
    pub reason: String,
    pub elapsed_ratio: f64,
    pub target_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationSweep {
    pub evaluated: u32,
    pub raised: u32,
    pub notifications_queued: u32,
}
