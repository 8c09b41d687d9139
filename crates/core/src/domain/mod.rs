pub mod autopilot;
pub mod escalation;
pub mod ids;
pub mod lead;
pub mod outbound;
pub mod pending_reply;
pub mod proof;
pub mod sla;
pub mod workspace;
