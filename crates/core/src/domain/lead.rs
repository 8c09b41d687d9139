use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{LeadId, WorkspaceId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Open,
    Qualified,
    NotQualified,
    Spam,
    Archived,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Open => "OPEN",
            Self::Qualified => "QUALIFIED",
            Self::NotQualified => "NOT_QUALIFIED",
            Self::Spam => "SPAM",
            Self::Archived => "ARCHIVED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEW" => Some(Self::New),
            "OPEN" => Some(Self::Open),
            "QUALIFIED" => Some(Self::Qualified),
            "NOT_QUALIFIED" => Some(Self::NotQualified),
            "SPAM" => Some(Self::Spam),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: String,
    pub status: LeadStatus,
    pub owner_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Phone number usable as an SMS destination, if any.
    pub fn contact_phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|phone| !phone.is_empty())
    }
}

/// Inbound lead payload as received from webhooks, manual entry or integrations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadIntake {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub owner_user_id: Option<String>,
}

impl LeadIntake {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("lead name is required".to_owned()));
        }

        let has_phone = self.phone.as_deref().is_some_and(|phone| !phone.trim().is_empty());
        let has_email = self.email.as_deref().is_some_and(|email| !email.trim().is_empty());
        if !has_phone && !has_email {
            return Err(DomainError::Validation(
                "lead needs at least one of phone or email".to_owned(),
            ));
        }

        if let Some(phone) = self.phone.as_deref().filter(|phone| !phone.trim().is_empty()) {
            let digits = phone.chars().filter(char::is_ascii_digit).count();
            let allowed =
                phone.chars().all(|ch| ch.is_ascii_digit() || matches!(ch, '+' | ' ' | '-' | '(' | ')'));
            if !allowed || digits < 7 {
                return Err(DomainError::Validation(format!("phone `{phone}` is not dialable")));
            }
        }

        Ok(())
    }
}
