pub mod audit;
pub mod autopilot;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod escalation_policy;
pub mod signature;

pub use audit::LeadEvent;
pub use dispatch::{DeliveryError, MessageProvider, ProviderReceipt};
pub use domain::autopilot::{
    AutopilotMode, AutopilotRun, AutopilotScenario, AutopilotState, RunStatus, ScenarioType,
};
pub use domain::escalation::{EscalationEvent, EscalationLevel, EscalationSweep};
pub use domain::ids::{
    AutopilotRunId, EscalationEventId, LeadEventId, LeadId, OutboundMessageId, PendingReplyId,
    ProofEventId, ScenarioId, SlaStateId, WorkspaceId,
};
pub use domain::lead::{Lead, LeadIntake, LeadStatus};
pub use domain::outbound::{Audience, DispatchSummary, MessageStatus, OutboundMessage};
pub use domain::pending_reply::{PendingAgentReply, PendingReplyStatus, PendingReplyType};
pub use domain::proof::{Channel, ProofEvent, ProofKey, ProofRecord, ProofType};
pub use domain::sla::{BreachSweep, SlaState, StopOutcome, StopReason};
pub use domain::workspace::{MemberRole, RequestContext, Workspace, WorkspaceMember};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use escalation_policy::{EscalationDecision, EscalationInput, EscalationThresholds};
