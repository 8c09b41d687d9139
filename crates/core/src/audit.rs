use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ids::{LeadEventId, LeadId, WorkspaceId};

pub mod event_types {
    pub const LEAD_CREATED: &str = "lead_created";
    pub const SLA_STARTED: &str = "sla_started";
    pub const SLA_STOPPED: &str = "sla_stopped";
    pub const SLA_BREACHED: &str = "sla_breached";
    pub const ESCALATION_RAISED: &str = "escalation_raised";
    pub const LEAD_REASSIGNED: &str = "lead_reassigned";
    pub const PROOF_RECORDED: &str = "proof_recorded";
    pub const MESSAGE_QUEUED: &str = "message_queued";
    pub const MESSAGE_SENT: &str = "message_sent";
    pub const MESSAGE_FAILED: &str = "message_failed";
    pub const MESSAGE_DELIVERED: &str = "message_delivered";
    pub const MESSAGE_READ: &str = "message_read";
    pub const AUTOPILOT_STARTED: &str = "autopilot_started";
    pub const AUTOPILOT_STEP: &str = "autopilot_step";
    pub const AUTOPILOT_HANDOVER: &str = "autopilot_handover";
    pub const AUTOPILOT_AI_FAILED: &str = "autopilot_ai_failed";
    pub const AUTOPILOT_MESSAGE_BLOCKED: &str = "autopilot_message_blocked";
    pub const AUTOPILOT_SCENARIO_SWITCHED: &str = "autopilot_scenario_switched";
    pub const AUTOPILOT_DEFAULT_CHANGED: &str = "autopilot_default_scenario_changed";
}

/// Who caused an event to be appended.
pub mod actors {
    pub const SYSTEM: &str = "system";
    pub const AUTOPILOT: &str = "autopilot";
    pub const DISPATCHER: &str = "dispatcher";
    pub const PROVIDER: &str = "provider";
}

/// Append-only audit entry in a lead's timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadEvent {
    pub id: LeadEventId,
    pub lead_id: LeadId,
    pub workspace_id: WorkspaceId,
    pub event_type: String,
    pub actor: String,
    pub payload: BTreeMap<String, Value>,
    pub occurred_at: DateTime<Utc>,
}

impl LeadEvent {
    pub fn new(
        lead_id: LeadId,
        workspace_id: WorkspaceId,
        event_type: impl Into<String>,
        actor: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LeadEventId::generate(),
            lead_id,
            workspace_id,
            event_type: event_type.into(),
            actor: actor.into(),
            payload: BTreeMap::new(),
            occurred_at,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn payload_json(&self) -> String {
        serde_json::to_string(&self.payload).unwrap_or_else(|_| "{}".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::audit::{actors, event_types, LeadEvent};
    use crate::domain::ids::{LeadId, WorkspaceId};

    #[test]
    fn builder_collects_payload_fields() {
        let event = LeadEvent::new(
            LeadId::from("L-1"),
            WorkspaceId::from("W-1"),
            event_types::SLA_STOPPED,
            actors::DISPATCHER,
            Utc::now(),
        )
        .with_metadata("reason", "message_sent")
        .with_metadata("alreadyStopped", false);

        assert_eq!(event.event_type, "sla_stopped");
        assert_eq!(event.payload.len(), 2);
        assert_eq!(event.payload_json(), r#"{"alreadyStopped":false,"reason":"message_sent"}"#);
    }
}
