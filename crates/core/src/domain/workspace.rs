use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::WorkspaceId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub company_name: String,
    pub sla_minutes: u32,
    pub autopilot_enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Owner,
    Admin,
    Manager,
    Agent,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Admin => "ADMIN",
            Self::Manager => "MANAGER",
            Self::Agent => "AGENT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OWNER" => Some(Self::Owner),
            "ADMIN" => Some(Self::Admin),
            "MANAGER" => Some(Self::Manager),
            "AGENT" => Some(Self::Agent),
            _ => None,
        }
    }

    pub fn can_manage_scenarios(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin | Self::Manager)
    }

    pub fn receives_manager_alerts(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin | Self::Manager)
    }

    pub fn takes_leads(&self) -> bool {
        matches!(self, Self::Agent | Self::Manager)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub workspace_id: WorkspaceId,
    pub user_id: String,
    pub display_name: String,
    pub role: MemberRole,
    pub phone: Option<String>,
    pub is_available: bool,
}

impl WorkspaceMember {
    pub fn contact_phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|phone| !phone.is_empty())
    }
}

/// Identity supplied by the upstream permission resolver; trusted as-is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub workspace_id: WorkspaceId,
    pub user_id: String,
    pub role: MemberRole,
}

impl RequestContext {
    pub fn new(workspace_id: WorkspaceId, user_id: impl Into<String>, role: MemberRole) -> Self {
        Self { workspace_id, user_id: user_id.into(), role }
    }
}
