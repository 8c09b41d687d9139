//! Autopilot conversations over the datastore.
//!
//! The reply state machine itself lives in `leadline_core::autopilot`; this module loads a
//! run, obtains a decision (scripted or from the model), and persists the next state with a
//! guarded update on `state_version`. A run that reaches `HANDED_OVER` stays there until a
//! scenario switch or default change resets it.

use chrono::{DateTime, Duration, Utc};
use leadline_agent::{DecisionRuntime, OutboundTextDecision, OutboundTextPolicy};
use leadline_core::audit::{actors, event_types, LeadEvent};
use leadline_core::autopilot::{
    advance, build_decision_messages, scripted_decision, AutopilotDecision, PromptVariables,
    StepOutcome, MIGRATION_AUDIT_LIMIT,
};
use leadline_core::domain::autopilot::{
    AutopilotMode, AutopilotRun, AutopilotScenario, RunStatus,
};
use leadline_core::domain::ids::{AutopilotRunId, LeadId, OutboundMessageId, ScenarioId, WorkspaceId};
use leadline_core::domain::lead::Lead;
use leadline_core::domain::outbound::{Audience, OutboundMessage};
use leadline_core::domain::workspace::{RequestContext, WorkspaceMember};
use leadline_core::errors::{ApplicationError, DomainError};
use leadline_db::repositories::{
    SqlAutopilotRepository, SqlLeadEventRepository, SqlLeadRepository, SqlWorkspaceRepository,
};
use leadline_db::DbPool;
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::notify::notify_handover_in;
use crate::outbox::Outbox;
use crate::routing::handover_target;
use crate::store::{begin, commit};

pub const BLOCK_REASON_MISSING_PHONE: &str = "missing_phone";

/// Result of feeding one inbound reply to a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyOutcome {
    pub run: AutopilotRun,
    /// The run was already handed over; nothing changed.
    pub ignored: bool,
    /// `false` when a concurrent reply advanced the run first.
    pub applied: bool,
    pub handed_over: bool,
    pub forced_handover: bool,
    pub handover_reason: Option<String>,
    pub handover_target: Option<String>,
    pub queued_message_id: Option<OutboundMessageId>,
    pub message_blocked: bool,
    pub block_reason: Option<String>,
}

impl ReplyOutcome {
    fn unchanged(run: AutopilotRun, ignored: bool) -> Self {
        Self {
            run,
            ignored,
            applied: false,
            handed_over: false,
            forced_handover: false,
            handover_reason: None,
            handover_target: None,
            queued_message_id: None,
            message_blocked: false,
            block_reason: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultScenarioChange {
    pub scenario_id: ScenarioId,
    pub migrated_runs: u64,
    /// Per-run audit events are written only up to the audit limit.
    pub audited: bool,
}

#[derive(Clone)]
pub struct AutopilotEngine {
    pool: DbPool,
    runtime: Option<DecisionRuntime>,
    confirmation_window: Duration,
    policy: OutboundTextPolicy,
}

impl AutopilotEngine {
    pub fn new(
        pool: DbPool,
        runtime: Option<DecisionRuntime>,
        confirmation_window: Duration,
        policy: OutboundTextPolicy,
    ) -> Self {
        Self { pool, runtime, confirmation_window, policy }
    }

    /// Starts a run on `scenario_id`, or on the workspace default when none is given.
    pub async fn start_autopilot(
        &self,
        ctx: &RequestContext,
        lead_id: &LeadId,
        scenario_id: Option<&ScenarioId>,
        now: DateTime<Utc>,
    ) -> Result<AutopilotRun, ApplicationError> {
        let lead = self.lead_in_scope(&ctx.workspace_id, lead_id).await?;
        let scenarios = SqlAutopilotRepository::new(self.pool.clone());
        let scenario = match scenario_id {
            Some(id) => {
                let scenario = scenarios
                    .find_scenario(id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("scenario", id.as_str()))?;
                ensure_same_workspace(&scenario, &lead.workspace_id)?;
                scenario
            }
            None => scenarios
                .find_default_scenario(&lead.workspace_id)
                .await?
                .ok_or_else(|| DomainError::not_found("default_scenario", lead.workspace_id.as_str()))?,
        };

        let mut tx = begin(&self.pool).await?;
        let run = Self::start_in(&mut tx, &lead, &scenario, now).await?;
        commit(tx).await?;
        Ok(run)
    }

    pub(crate) async fn start_in(
        conn: &mut SqliteConnection,
        lead: &Lead,
        scenario: &AutopilotScenario,
        now: DateTime<Utc>,
    ) -> Result<AutopilotRun, ApplicationError> {
        let run = AutopilotRun::start(lead.id.clone(), scenario, now);
        if !SqlAutopilotRepository::insert_run(conn, &run, &lead.workspace_id).await? {
            return Err(DomainError::AutopilotAlreadyStarted(lead.id.clone()).into());
        }

        let event = LeadEvent::new(
            lead.id.clone(),
            lead.workspace_id.clone(),
            event_types::AUTOPILOT_STARTED,
            actors::AUTOPILOT,
            now,
        )
        .with_metadata("runId", run.id.as_str())
        .with_metadata("scenarioId", scenario.id.as_str())
        .with_metadata("node", run.current_step.clone());
        SqlLeadEventRepository::append(conn, &event).await?;

        info!(
            event_name = "autopilot.started",
            lead_id = %lead.id,
            workspace_id = %lead.workspace_id,
            scenario_id = %scenario.id,
            "autopilot run started"
        );
        Ok(run)
    }

    /// Feeds one inbound reply to the lead's run.
    ///
    /// A model failure leaves the run untouched and is recorded as an `autopilot_ai_failed`
    /// event; the caller may retry with the same text.
    pub async fn process_reply(
        &self,
        workspace_id: &WorkspaceId,
        lead_id: &LeadId,
        inbound_text: &str,
        now: DateTime<Utc>,
    ) -> Result<ReplyOutcome, ApplicationError> {
        let lead = self.lead_in_scope(workspace_id, lead_id).await?;
        let repository = SqlAutopilotRepository::new(self.pool.clone());
        let run = repository
            .find_run_by_lead(&lead.id)
            .await?
            .ok_or_else(|| DomainError::not_found("autopilot_run", lead.id.as_str()))?;
        if run.status == RunStatus::HandedOver {
            return Ok(ReplyOutcome::unchanged(run, true));
        }
        let scenario = repository.find_scenario(&run.scenario_id).await?.ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "run `{}` points at missing scenario `{}`",
                run.id, run.scenario_id
            ))
        })?;

        let decision = self.decide(&lead, &run, &scenario, inbound_text, now).await?;
        let step = advance(&scenario, &run.state, decision);
        let mut next = run.clone();
        next.status = if step.handover { RunStatus::HandedOver } else { RunStatus::Active };
        next.current_step = step.state.node.clone();
        next.state = step.state.clone();
        next.updated_at = now;

        let members = if step.handover {
            SqlWorkspaceRepository::new(self.pool.clone()).list_members(&lead.workspace_id).await?
        } else {
            Vec::new()
        };

        let mut tx = begin(&self.pool).await?;
        if !SqlAutopilotRepository::advance_run_guarded(&mut tx, &next, run.state_version).await? {
            warn!(
                event_name = "autopilot.reply_lost_race",
                lead_id = %lead.id,
                workspace_id = %lead.workspace_id,
                state_version = run.state_version,
                "run advanced concurrently, reply not applied"
            );
            return Ok(ReplyOutcome::unchanged(run, false));
        }
        next.state_version = run.state_version + 1;

        let mut outcome = ReplyOutcome::unchanged(next.clone(), false);
        outcome.applied = true;
        self.record_step(&mut tx, &lead, &next, &step, now).await?;

        if step.handover {
            outcome.handed_over = true;
            outcome.forced_handover = step.forced_handover;
            outcome.handover_reason = step.handover_reason.clone();
            outcome.handover_target =
                self.hand_over(&mut tx, &lead, &members, &step, now).await?;
        } else if let Some(text) = step.outbound_text.as_deref() {
            match self.queue_reply(&mut tx, &lead, text, now).await? {
                Ok(message_id) => outcome.queued_message_id = Some(message_id),
                Err(reason) => {
                    outcome.message_blocked = true;
                    outcome.block_reason = Some(reason.to_owned());
                }
            }
        }
        commit(tx).await?;

        Ok(outcome)
    }

    async fn decide(
        &self,
        lead: &Lead,
        run: &AutopilotRun,
        scenario: &AutopilotScenario,
        inbound_text: &str,
        now: DateTime<Utc>,
    ) -> Result<AutopilotDecision, ApplicationError> {
        if scenario.mode == AutopilotMode::Scripted {
            return Ok(scripted_decision(scenario, &run.state, inbound_text));
        }

        let Some(runtime) = &self.runtime else {
            self.record_ai_failure(lead, run, "ai_unconfigured", "no llm client configured", now)
                .await?;
            return Err(ApplicationError::Integration(
                "autopilot scenario needs an llm client but none is configured".to_owned(),
            ));
        };

        let workspace = SqlWorkspaceRepository::new(self.pool.clone())
            .find(&lead.workspace_id)
            .await?
            .ok_or_else(|| DomainError::not_found("workspace", lead.workspace_id.as_str()))?;
        let variables = PromptVariables {
            workspace_name: workspace.name,
            company_name: workspace.company_name,
            lead_name: lead.name.clone(),
            lead_source: lead.source.clone(),
        };
        let messages = build_decision_messages(scenario, &variables, &run.state, inbound_text)?;

        match runtime.decide(&messages).await {
            Ok(decision) => Ok(decision),
            Err(failure) => {
                let detail = failure.to_string();
                self.record_ai_failure(lead, run, failure.code(), &detail, now).await?;
                Err(ApplicationError::Integration(format!(
                    "autopilot decision failed for lead `{}`: {detail}",
                    lead.id
                )))
            }
        }
    }

    async fn record_ai_failure(
        &self,
        lead: &Lead,
        run: &AutopilotRun,
        code: &str,
        detail: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let event = LeadEvent::new(
            lead.id.clone(),
            lead.workspace_id.clone(),
            event_types::AUTOPILOT_AI_FAILED,
            actors::AUTOPILOT,
            now,
        )
        .with_metadata("runId", run.id.as_str())
        .with_metadata("code", code)
        .with_metadata("error", detail);

        let mut tx = begin(&self.pool).await?;
        SqlLeadEventRepository::append(&mut tx, &event).await?;
        commit(tx).await?;

        warn!(
            event_name = "autopilot.ai_failed",
            lead_id = %lead.id,
            workspace_id = %lead.workspace_id,
            code,
            error = detail,
            "autopilot decision failed, run left unchanged"
        );
        Ok(())
    }

    async fn record_step(
        &self,
        conn: &mut SqliteConnection,
        lead: &Lead,
        run: &AutopilotRun,
        step: &StepOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let mut event = LeadEvent::new(
            lead.id.clone(),
            lead.workspace_id.clone(),
            event_types::AUTOPILOT_STEP,
            actors::AUTOPILOT,
            now,
        )
        .with_metadata("runId", run.id.as_str())
        .with_metadata("node", run.current_step.clone())
        .with_metadata("questionIndex", run.state.question_index)
        .with_metadata("answers", run.state.answers.len());
        if let Some(intent) = &step.intent {
            event = event.with_metadata("intent", intent.clone());
        }
        SqlLeadEventRepository::append(conn, &event).await?;
        Ok(())
    }

    async fn hand_over(
        &self,
        conn: &mut SqliteConnection,
        lead: &Lead,
        members: &[WorkspaceMember],
        step: &StepOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, ApplicationError> {
        let reason = step.handover_reason.clone().unwrap_or_default();
        let target = handover_target(members, lead.owner_user_id.as_deref());

        let mut event = LeadEvent::new(
            lead.id.clone(),
            lead.workspace_id.clone(),
            event_types::AUTOPILOT_HANDOVER,
            actors::AUTOPILOT,
            now,
        )
        .with_metadata("reason", reason.clone())
        .with_metadata("forced", step.forced_handover)
        .with_metadata("answers", serde_json::json!(step.state.answers));
        if let Some(member) = target {
            event = event.with_metadata("targetUserId", member.user_id.clone());
        }
        SqlLeadEventRepository::append(conn, &event).await?;

        let Some(member) = target else {
            warn!(
                event_name = "autopilot.handover_unassigned",
                lead_id = %lead.id,
                workspace_id = %lead.workspace_id,
                "no available member to take the handover"
            );
            return Ok(None);
        };
        notify_handover_in(conn, lead, member, &reason, self.confirmation_window, now).await?;

        info!(
            event_name = "autopilot.handed_over",
            lead_id = %lead.id,
            workspace_id = %lead.workspace_id,
            target_user_id = %member.user_id,
            forced = step.forced_handover,
            reason = %reason,
            "autopilot handed lead over"
        );
        Ok(Some(member.user_id.clone()))
    }

    /// Queues the next prompt for the lead, or returns the reason it was blocked.
    async fn queue_reply(
        &self,
        conn: &mut SqliteConnection,
        lead: &Lead,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Result<OutboundMessageId, &'static str>, ApplicationError> {
        let blocked = match (lead.contact_phone(), self.policy.evaluate(text)) {
            (None, _) => Err(BLOCK_REASON_MISSING_PHONE),
            (_, OutboundTextDecision::Deny { reason_code }) => Err(reason_code),
            (Some(phone), OutboundTextDecision::Allow(text))
            | (Some(phone), OutboundTextDecision::Truncate { text, .. }) => Ok((phone, text)),
        };

        match blocked {
            Ok((phone, text)) => {
                let message = OutboundMessage::queued(
                    lead.id.clone(),
                    lead.workspace_id.clone(),
                    Audience::Lead,
                    Some(phone.to_owned()),
                    text,
                    now,
                );
                Outbox::enqueue_in(conn, &message, actors::AUTOPILOT).await?;
                Ok(Ok(message.id))
            }
            Err(reason) => {
                let event = LeadEvent::new(
                    lead.id.clone(),
                    lead.workspace_id.clone(),
                    event_types::AUTOPILOT_MESSAGE_BLOCKED,
                    actors::AUTOPILOT,
                    now,
                )
                .with_metadata("reason", reason);
                SqlLeadEventRepository::append(conn, &event).await?;
                warn!(
                    event_name = "autopilot.message_blocked",
                    lead_id = %lead.id,
                    workspace_id = %lead.workspace_id,
                    reason,
                    "autopilot reply not queued"
                );
                Ok(Err(reason))
            }
        }
    }

    /// Moves a run to another scenario of the same workspace, back at its initial node.
    pub async fn switch_scenario(
        &self,
        ctx: &RequestContext,
        run_id: &AutopilotRunId,
        scenario_id: &ScenarioId,
        now: DateTime<Utc>,
    ) -> Result<AutopilotRun, ApplicationError> {
        let repository = SqlAutopilotRepository::new(self.pool.clone());
        let run = repository
            .find_run(run_id)
            .await?
            .ok_or_else(|| DomainError::not_found("autopilot_run", run_id.as_str()))?;
        let lead = self.lead_in_scope(&ctx.workspace_id, &run.lead_id).await.map_err(|_| {
            ApplicationError::from(DomainError::not_found("autopilot_run", run_id.as_str()))
        })?;
        let scenario = repository
            .find_scenario(scenario_id)
            .await?
            .ok_or_else(|| DomainError::not_found("scenario", scenario_id.as_str()))?;
        ensure_same_workspace(&scenario, &lead.workspace_id)?;

        let mut tx = begin(&self.pool).await?;
        if !SqlAutopilotRepository::reset_run(&mut tx, &run.id, &scenario, now).await? {
            return Err(DomainError::not_found("autopilot_run", run_id.as_str()).into());
        }
        let event = LeadEvent::new(
            lead.id.clone(),
            lead.workspace_id.clone(),
            event_types::AUTOPILOT_SCENARIO_SWITCHED,
            ctx.user_id.clone(),
            now,
        )
        .with_metadata("runId", run.id.as_str())
        .with_metadata("fromScenarioId", run.scenario_id.as_str())
        .with_metadata("toScenarioId", scenario.id.as_str());
        SqlLeadEventRepository::append(&mut tx, &event).await?;
        commit(tx).await?;

        info!(
            event_name = "autopilot.scenario_switched",
            lead_id = %lead.id,
            workspace_id = %lead.workspace_id,
            from_scenario_id = %run.scenario_id,
            to_scenario_id = %scenario.id,
            "autopilot run switched scenario"
        );
        repository
            .find_run(&run.id)
            .await?
            .ok_or_else(|| DomainError::not_found("autopilot_run", run_id.as_str()).into())
    }

    /// Makes `scenario_id` the workspace default and resets every run in the workspace onto it.
    pub async fn set_default_scenario(
        &self,
        ctx: &RequestContext,
        scenario_id: &ScenarioId,
        now: DateTime<Utc>,
    ) -> Result<DefaultScenarioChange, ApplicationError> {
        if !ctx.role.can_manage_scenarios() {
            return Err(DomainError::AccessDenied(format!(
                "role {} cannot change the default scenario",
                ctx.role.as_str()
            ))
            .into());
        }
        let scenario = SqlAutopilotRepository::new(self.pool.clone())
            .find_scenario(scenario_id)
            .await?
            .ok_or_else(|| DomainError::not_found("scenario", scenario_id.as_str()))?;
        ensure_same_workspace(&scenario, &ctx.workspace_id)?;

        let mut tx = begin(&self.pool).await?;
        SqlAutopilotRepository::set_default(&mut tx, &ctx.workspace_id, &scenario.id).await?;
        let runs = SqlAutopilotRepository::list_run_refs_for_workspace(&mut tx, &ctx.workspace_id).await?;
        let migrated_runs =
            SqlAutopilotRepository::reset_runs_for_workspace(&mut tx, &ctx.workspace_id, &scenario, now)
                .await?;

        let audited = runs.len() <= MIGRATION_AUDIT_LIMIT;
        if audited {
            for (run_id, lead_id) in &runs {
                let event = LeadEvent::new(
                    lead_id.clone(),
                    ctx.workspace_id.clone(),
                    event_types::AUTOPILOT_DEFAULT_CHANGED,
                    ctx.user_id.clone(),
                    now,
                )
                .with_metadata("runId", run_id.as_str())
                .with_metadata("scenarioId", scenario.id.as_str());
                SqlLeadEventRepository::append(&mut tx, &event).await?;
            }
        }
        commit(tx).await?;

        info!(
            event_name = "autopilot.default_scenario_changed",
            workspace_id = %ctx.workspace_id,
            scenario_id = %scenario.id,
            migrated_runs,
            audited,
            "default scenario changed and runs migrated"
        );
        Ok(DefaultScenarioChange { scenario_id: scenario.id, migrated_runs, audited })
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

fn ensure_same_workspace(
    scenario: &AutopilotScenario,
    workspace_id: &WorkspaceId,
) -> Result<(), DomainError> {
    if &scenario.workspace_id != workspace_id {
        return Err(DomainError::WorkspaceMismatch {
            entity: "scenario",
            expected: workspace_id.clone(),
            actual: scenario.workspace_id.clone(),
        });
    }
    Ok(())
}
