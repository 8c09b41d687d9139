//! Lead intake and the workspace-scoped lead operations built on the engines.

use chrono::{DateTime, Duration, Utc};
use leadline_core::audit::{event_types, LeadEvent};
use leadline_core::domain::autopilot::AutopilotRun;
use leadline_core::domain::ids::{LeadId, ProofEventId, WorkspaceId};
use leadline_core::domain::lead::{Lead, LeadIntake, LeadStatus};
use leadline_core::domain::proof::{Channel, ProofEvent, ProofType};
use leadline_core::domain::sla::{SlaState, StopOutcome, StopReason};
use leadline_core::domain::workspace::RequestContext;
use leadline_core::errors::{ApplicationError, DomainError};
use leadline_db::repositories::{
    SqlAutopilotRepository, SqlLeadEventRepository, SqlLeadRepository, SqlProofRepository,
    SqlWorkspaceRepository,
};
use leadline_db::DbPool;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::autopilot::AutopilotEngine;
use crate::escalation::EscalationEngine;
use crate::sla::SlaClock;
use crate::store::{begin, commit};

pub const MANUAL_PROVIDER: &str = "manual";
pub const DEFAULT_LIST_LIMIT: u32 = 100;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeOutcome {
    pub lead: Lead,
    pub sla: SlaState,
    pub autopilot_run: Option<AutopilotRun>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualProofOutcome {
    pub proof_event_id: ProofEventId,
    pub clock_stopped: bool,
}

#[derive(Clone)]
pub struct LeadService {
    pool: DbPool,
    escalation: EscalationEngine,
    default_sla_minutes: u32,
}

impl LeadService {
    pub fn new(pool: DbPool, escalation: EscalationEngine, default_sla_minutes: u32) -> Self {
        Self { pool, escalation, default_sla_minutes }
    }

    /// Creates the lead, its SLA clock and, when the workspace runs autopilot with a default
    /// scenario, its autopilot run. All of it commits or none of it does.
    pub async fn intake_lead(
        &self,
        ctx: &RequestContext,
        intake: LeadIntake,
        now: DateTime<Utc>,
    ) -> Result<IntakeOutcome, ApplicationError> {
        intake.validate()?;
        let workspace = SqlWorkspaceRepository::new(self.pool.clone())
            .find(&ctx.workspace_id)
            .await?
            .ok_or_else(|| DomainError::not_found("workspace", ctx.workspace_id.as_str()))?;
        let scenario = if workspace.autopilot_enabled {
            SqlAutopilotRepository::new(self.pool.clone()).find_default_scenario(&workspace.id).await?
        } else {
            None
        };

        let lead = Lead {
            id: LeadId::generate(),
            workspace_id: workspace.id.clone(),
            name: intake.name.trim().to_owned(),
            phone: non_blank(intake.phone),
            email: non_blank(intake.email),
            source: non_blank(intake.source).unwrap_or_else(|| "manual".to_owned()),
            status: LeadStatus::New,
            owner_user_id: non_blank(intake.owner_user_id),
            created_at: now,
            updated_at: now,
        };
        let minutes =
            if workspace.sla_minutes > 0 { workspace.sla_minutes } else { self.default_sla_minutes };
        let deadline_at = now + Duration::minutes(i64::from(minutes));

        let mut tx = begin(&self.pool).await?;
        SqlLeadRepository::insert(&mut tx, &lead).await?;
        let created = LeadEvent::new(
            lead.id.clone(),
            lead.workspace_id.clone(),
            event_types::LEAD_CREATED,
            ctx.user_id.clone(),
            now,
        )
        .with_metadata("source", lead.source.clone())
        .with_metadata("hasPhone", lead.contact_phone().is_some());
        SqlLeadEventRepository::append(&mut tx, &created).await?;
        let sla = SlaClock::start_in(&mut tx, &lead, now, deadline_at).await?;
        let autopilot_run = match &scenario {
            Some(scenario) => Some(AutopilotEngine::start_in(&mut tx, &lead, scenario, now).await?),
            None => None,
        };
        commit(tx).await?;

        info!(
            event_name = "leads.intake_completed",
            lead_id = %lead.id,
            workspace_id = %lead.workspace_id,
            sla_minutes = minutes,
            autopilot = autopilot_run.is_some(),
            "lead created"
        );
        Ok(IntakeOutcome { lead, sla, autopilot_run })
    }

    pub async fn get_lead(
        &self,
        ctx: &RequestContext,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<Lead, ApplicationError> {
        self.refresh_escalations(&ctx.workspace_id, now).await;
        self.lead_in_scope(&ctx.workspace_id, lead_id).await
    }

    pub async fn list_leads(
        &self,
        ctx: &RequestContext,
        status: Option<LeadStatus>,
        limit: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Lead>, ApplicationError> {
        self.refresh_escalations(&ctx.workspace_id, now).await;
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
        Ok(SqlLeadRepository::new(self.pool.clone())
            .list_for_workspace(&ctx.workspace_id, status, limit)
            .await?)
    }

    /// Event log of one lead, oldest first.
    pub async fn list_lead_events(
        &self,
        ctx: &RequestContext,
        lead_id: &LeadId,
    ) -> Result<Vec<LeadEvent>, ApplicationError> {
        let lead = self.lead_in_scope(&ctx.workspace_id, lead_id).await?;
        Ok(SqlLeadEventRepository::new(self.pool.clone()).list_for_lead(&lead.id).await?)
    }

    /// Records contact made outside the dispatch queue and stops the clock with it.
    pub async fn record_manual_proof(
        &self,
        ctx: &RequestContext,
        lead_id: &LeadId,
        channel: Channel,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ManualProofOutcome, ApplicationError> {
        let lead = self.lead_in_scope(&ctx.workspace_id, lead_id).await?;
        let proof = ProofEvent {
            id: ProofEventId::generate(),
            lead_id: lead.id.clone(),
            channel,
            provider: MANUAL_PROVIDER.to_owned(),
            provider_message_id: format!("manual-{}", Uuid::new_v4().simple()),
            proof_type: ProofType::Sent,
            occurred_at: now,
            is_manual: true,
        };

        let mut tx = begin(&self.pool).await?;
        let record = SqlProofRepository::record(&mut tx, &proof).await?;
        let mut event = LeadEvent::new(
            lead.id.clone(),
            lead.workspace_id.clone(),
            event_types::PROOF_RECORDED,
            ctx.user_id.clone(),
            now,
        )
        .with_metadata("proofEventId", record.proof_event_id.as_str())
        .with_metadata("channel", channel.as_str())
        .with_metadata("manual", true);
        if let Some(note) = note.map(str::trim).filter(|note| !note.is_empty()) {
            event = event.with_metadata("note", note);
        }
        SqlLeadEventRepository::append(&mut tx, &event).await?;

        let clock_stopped = SlaClock::stop_in(
            &mut tx,
            &lead.id,
            &lead.workspace_id,
            &StopReason::ManualContact,
            Some(&record.proof_event_id),
            now,
            &ctx.user_id,
        )
        .await?;
        SqlLeadRepository::transition_status(&mut tx, &lead.id, LeadStatus::New, LeadStatus::Open, now)
            .await?;
        commit(tx).await?;

        Ok(ManualProofOutcome { proof_event_id: record.proof_event_id, clock_stopped })
    }

    pub async fn stop_clock(
        &self,
        ctx: &RequestContext,
        lead_id: &LeadId,
        reason: StopReason,
        now: DateTime<Utc>,
    ) -> Result<StopOutcome, ApplicationError> {
        let lead = self.lead_in_scope(&ctx.workspace_id, lead_id).await?;
        SlaClock::new(self.pool.clone()).stop_clock(&lead.id, reason, None, now).await
    }

    /// Read paths double as an escalation trigger; a failure here never fails the read.
    async fn refresh_escalations(&self, workspace_id: &WorkspaceId, now: DateTime<Utc>) {
        if let Err(error) = self.escalation.detect_escalations(workspace_id, now).await {
            warn!(
                event_name = "leads.escalation_refresh_failed",
                workspace_id = %workspace_id,
                error = %error,
                "opportunistic escalation check failed"
            );
        }
    }

    async fn lead_in_scope(
        &self,
        workspace_id: &WorkspaceId,
        lead_id: &LeadId,
    ) -> Result<Lead, ApplicationError> {
        SqlLeadRepository::new(self.pool.clone())
            .find_in_workspace(workspace_id, lead_id)
            .await?
            .ok_or_else(|| DomainError::not_found("lead", lead_id.as_str()).into())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use leadline_core::audit::event_types;
    use leadline_core::domain::autopilot::AutopilotMode;
    use leadline_core::domain::escalation::EscalationLevel;
    use leadline_core::domain::ids::{LeadId, WorkspaceId};
    use leadline_core::domain::lead::{LeadIntake, LeadStatus};
    use leadline_core::domain::proof::Channel;
    use leadline_core::domain::sla::StopReason;
    use leadline_core::domain::workspace::{MemberRole, RequestContext};
    use leadline_core::errors::{ApplicationError, DomainError};
    use leadline_core::escalation_policy::EscalationThresholds;
    use leadline_db::repositories::{
        SqlEscalationRepository, SqlLeadEventRepository, SqlLeadRepository, SqlSlaRepository,
    };
    use leadline_db::DbPool;

    use super::LeadService;
    use crate::escalation::EscalationEngine;
    use crate::test_support::{at, seed_lead, seed_member, seed_scenario, seed_workspace, setup_pool};

    fn service(pool: &DbPool) -> LeadService {
        LeadService::new(pool.clone(), EscalationEngine::new(pool.clone(), EscalationThresholds::default()), 15)
    }

    fn agent(workspace: &str) -> RequestContext {
        RequestContext::new(WorkspaceId::from(workspace), "agent-1", MemberRole::Agent)
    }

    fn intake(name: &str, phone: Option<&str>) -> LeadIntake {
        LeadIntake {
            name: name.to_owned(),
            phone: phone.map(str::to_owned),
            email: Some("dana@example.com".to_owned()),
            source: Some("website".to_owned()),
            owner_user_id: None,
        }
    }

    #[tokio::test]
    async fn intake_starts_clock_and_default_autopilot() {
        let pool = setup_pool().await;
        seed_workspace(&pool, "W-1").await;
        seed_scenario(&pool, "W-1", "SCN-1", AutopilotMode::Scripted, 3, true).await;
        let now = at("2026-03-02T09:00:00Z");

        let outcome = service(&pool)
            .intake_lead(&agent("W-1"), intake("  Dana Buyer ", Some("+1 555 0100")), now)
            .await
            .expect("intake");

        assert_eq!(outcome.lead.name, "Dana Buyer");
        assert_eq!(outcome.lead.status, LeadStatus::New);
        assert_eq!(outcome.sla.deadline_at, now + Duration::minutes(15));
        let run = outcome.autopilot_run.expect("autopilot started");
        assert_eq!(run.current_step, "qualify_start");

        let events = SqlLeadEventRepository::new(pool.clone())
            .list_for_lead(&outcome.lead.id)
            .await
            .expect("events");
        let types: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec![event_types::LEAD_CREATED, event_types::SLA_STARTED, event_types::AUTOPILOT_STARTED]
        );
    }

    #[tokio::test]
    async fn invalid_intake_writes_nothing() {
        let pool = setup_pool().await;
        seed_workspace(&pool, "W-1").await;
        let service = service(&pool);

        let mut nameless = intake("   ", Some("+15550100"));
        nameless.email = None;
        let result = service.intake_lead(&agent("W-1"), nameless, at("2026-03-02T09:00:00Z")).await;

        assert!(matches!(result, Err(ApplicationError::Domain(DomainError::Validation(_)))));
        let leads = SqlLeadRepository::new(pool.clone())
            .list_for_workspace(&WorkspaceId::from("W-1"), None, 10)
            .await
            .expect("list");
        assert!(leads.is_empty());
    }

    #[tokio::test]
    async fn manual_proof_stops_clock_once() {
        let pool = setup_pool().await;
        seed_workspace(&pool, "W-1").await;
        let service = service(&pool);
        let created = service
            .intake_lead(&agent("W-1"), intake("Dana", Some("+15550100")), at("2026-03-02T09:00:00Z"))
            .await
            .expect("intake");
        let lead_id = created.lead.id;

        let first = service
            .record_manual_proof(&agent("W-1"), &lead_id, Channel::Call, Some("called back"), at("2026-03-02T09:04:00Z"))
            .await
            .expect("first proof");
        let second = service
            .record_manual_proof(&agent("W-1"), &lead_id, Channel::Call, None, at("2026-03-02T09:05:00Z"))
            .await
            .expect("second proof");

        assert!(first.clock_stopped);
        assert!(!second.clock_stopped);
        let state = SqlSlaRepository::new(pool.clone())
            .find_by_lead(&lead_id)
            .await
            .expect("find")
            .expect("state");
        assert_eq!(state.stop_reason, Some(StopReason::ManualContact));
        assert_eq!(state.stop_proof_event_id, Some(first.proof_event_id));
        let lead = SqlLeadRepository::new(pool.clone()).find(&lead_id).await.expect("find").expect("lead");
        assert_eq!(lead.status, LeadStatus::Open);
    }

    #[tokio::test]
    async fn other_workspaces_leads_read_as_missing() {
        let pool = setup_pool().await;
        seed_workspace(&pool, "W-1").await;
        seed_workspace(&pool, "W-2").await;
        seed_lead(&pool, "W-1", "L-1", Some("+15550100"), None).await;
        let service = service(&pool);

        let result = service.get_lead(&agent("W-2"), &LeadId::from("L-1"), at("2026-03-02T09:00:00Z")).await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::NotFound { entity: "lead", .. }))
        ));
        let events = service.list_lead_events(&agent("W-2"), &LeadId::from("L-1")).await;
        assert!(events.is_err());
    }

    #[tokio::test]
    async fn reads_raise_due_escalations() {
        let pool = setup_pool().await;
        seed_workspace(&pool, "W-1").await;
        seed_member(&pool, "W-1", "agent-1", MemberRole::Agent, Some("+15550200"), true).await;
        let service = service(&pool);
        let mut payload = intake("Dana", Some("+15550100"));
        payload.owner_user_id = Some("agent-1".to_owned());
        let created = service
            .intake_lead(&agent("W-1"), payload, at("2026-03-02T09:00:00Z"))
            .await
            .expect("intake");

        let listed = service
            .list_leads(&agent("W-1"), None, None, at("2026-03-02T09:09:00Z"))
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);

        let level = SqlEscalationRepository::new(pool.clone())
            .highest_level(&created.lead.id)
            .await
            .expect("highest level");
        assert_eq!(level, Some(EscalationLevel::Reminder));
    }
}
