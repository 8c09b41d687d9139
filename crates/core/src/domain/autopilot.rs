use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{AutopilotRunId, LeadId, ScenarioId, WorkspaceId};
use crate::errors::DomainError;

pub const HANDOVER_NODE: &str = "handover";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Active,
    HandedOver,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::HandedOver => "HANDED_OVER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(Self::Active),
            "HANDED_OVER" => Some(Self::HandedOver),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    Qualification,
    Appointment,
    Custom,
}

impl ScenarioType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qualification => "QUALIFICATION",
            Self::Appointment => "APPOINTMENT",
            Self::Custom => "CUSTOM",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "QUALIFICATION" => Some(Self::Qualification),
            "APPOINTMENT" => Some(Self::Appointment),
            "CUSTOM" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn initial_node(&self) -> &'static str {
        match self {
            Self::Qualification => "qualify_start",
            Self::Appointment => "booking_start",
            Self::Custom => "start",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutopilotMode {
    /// Decisions come from the chat-completion service.
    Ai,
    /// Decisions follow the scenario's fixed question list.
    Scripted,
}

impl AutopilotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "AI",
            Self::Scripted => "SCRIPTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AI" => Some(Self::Ai),
            "SCRIPTED" => Some(Self::Scripted),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutopilotScenario {
    pub id: ScenarioId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub scenario_type: ScenarioType,
    pub mode: AutopilotMode,
    pub max_questions: u32,
    pub is_default: bool,
    pub ai_prompt: String,
    pub questions: Vec<String>,
}

impl AutopilotScenario {
    pub fn initial_node(&self) -> &'static str {
        self.scenario_type.initial_node()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_questions == 0 {
            return Err(DomainError::Validation(format!(
                "scenario `{}` must allow at least one question",
                self.id
            )));
        }
        if self.mode == AutopilotMode::Scripted && self.questions.is_empty() {
            return Err(DomainError::Validation(format!(
                "scripted scenario `{}` needs at least one question",
                self.id
            )));
        }
        if self.mode == AutopilotMode::Ai && self.ai_prompt.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "ai scenario `{}` needs a prompt template",
                self.id
            )));
        }
        Ok(())
    }
}

/// Working memory of a run, persisted as `state_json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotState {
    pub node: String,
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    #[serde(default)]
    pub question_index: u32,
}

impl AutopilotState {
    pub fn initial(scenario: &AutopilotScenario) -> Self {
        Self { node: scenario.initial_node().to_owned(), answers: BTreeMap::new(), question_index: 0 }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{{\"node\":\"{}\",\"answers\":{{}},\"questionIndex\":0}}", self.node)
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, DomainError> {
        serde_json::from_str(raw).map_err(|error| {
            DomainError::InvariantViolation(format!("autopilot state is not decodable: {error}"))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutopilotRun {
    pub id: AutopilotRunId,
    pub lead_id: LeadId,
    pub scenario_id: ScenarioId,
    pub status: RunStatus,
    pub current_step: String,
    pub state: AutopilotState,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutopilotRun {
    pub fn start(lead_id: LeadId, scenario: &AutopilotScenario, now: DateTime<Utc>) -> Self {
        let state = AutopilotState::initial(scenario);
        Self {
            id: AutopilotRunId::generate(),
            lead_id,
            scenario_id: scenario.id.clone(),
            status: RunStatus::Active,
            current_step: state.node.clone(),
            state,
            state_version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
