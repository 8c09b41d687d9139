use thiserror::Error;

use crate::domain::ids::{LeadId, WorkspaceId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("{entity} belongs to workspace `{actual}`, expected `{expected}`")]
    WorkspaceMismatch { entity: &'static str, expected: WorkspaceId, actual: WorkspaceId },
    #[error("sla clock already running for lead `{0}`")]
    ClockAlreadyRunning(LeadId),
    #[error("autopilot already started for lead `{0}`")]
    AutopilotAlreadyStarted(LeadId),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Stable machine-readable code used in API payloads and event metadata.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::NotFound { entity: "lead", .. } => "LEAD_NOT_FOUND",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AccessDenied(_) => "ACCESS_DENIED",
            Self::WorkspaceMismatch { .. } => "WORKSPACE_MISMATCH",
            Self::ClockAlreadyRunning(_) => "ALREADY_RUNNING",
            Self::AutopilotAlreadyStarted(_) => "AUTOPILOT_ALREADY_STARTED",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { code: &'static str, message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { code: &'static str, message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { code: &'static str, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist in this workspace.",
            Self::Forbidden { .. } => "You do not have permission to perform this action.",
            Self::Conflict { .. } => "The record is already in the requested state.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { code, .. }
            | Self::NotFound { code, .. }
            | Self::Forbidden { code, .. }
            | Self::Conflict { code, .. } => code,
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                let code = error.code();
                let message = error.to_string();
                match error {
                    DomainError::Validation(_) | DomainError::InvariantViolation(_) => {
                        Self::BadRequest { code, message, correlation_id: unassigned() }
                    }
                    DomainError::NotFound { .. } => {
                        Self::NotFound { code, message, correlation_id: unassigned() }
                    }
                    DomainError::AccessDenied(_) | DomainError::WorkspaceMismatch { .. } => {
                        Self::Forbidden { code, message, correlation_id: unassigned() }
                    }
                    DomainError::ClockAlreadyRunning(_)
                    | DomainError::AutopilotAlreadyStarted(_) => {
                        Self::Conflict { code, message, correlation_id: unassigned() }
                    }
                }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
