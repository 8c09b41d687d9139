//! SLA clock: one deadline per lead, stopped at most once, breached at most once.

use chrono::{DateTime, Utc};
use leadline_core::audit::{actors, event_types, LeadEvent};
use leadline_core::domain::ids::{LeadId, ProofEventId, WorkspaceId};
use leadline_core::domain::lead::Lead;
use leadline_core::domain::sla::{BreachSweep, SlaState, StopOutcome, StopReason};
use leadline_core::errors::{ApplicationError, DomainError};
use leadline_db::repositories::{SqlLeadEventRepository, SqlLeadRepository, SqlSlaRepository};
use leadline_db::{ts, DbPool};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::store::{begin, commit};

#[derive(Clone)]
pub struct SlaClock {
    pool: DbPool,
}

impl SlaClock {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn start_clock(
        &self,
        lead_id: &LeadId,
        deadline_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SlaState, ApplicationError> {
        let lead = SqlLeadRepository::new(self.pool.clone())
            .find(lead_id)
            .await?
            .ok_or_else(|| DomainError::not_found("lead", lead_id.as_str()))?;

        let mut tx = begin(&self.pool).await?;
        let state = Self::start_in(&mut tx, &lead, now, deadline_at).await?;
        commit(tx).await?;
        Ok(state)
    }

    /// Creates the clock inside the caller's transaction.
    pub(crate) async fn start_in(
        conn: &mut SqliteConnection,
        lead: &Lead,
        started_at: DateTime<Utc>,
        deadline_at: DateTime<Utc>,
    ) -> Result<SlaState, ApplicationError> {
        let state = SlaState::start(lead.id.clone(), started_at, deadline_at)?;
        if !SqlSlaRepository::insert(conn, &state).await? {
            return Err(DomainError::ClockAlreadyRunning(lead.id.clone()).into());
        }

        let event = LeadEvent::new(
            lead.id.clone(),
            lead.workspace_id.clone(),
            event_types::SLA_STARTED,
            actors::SYSTEM,
            started_at,
        )
        .with_metadata("slaStateId", state.id.as_str())
        .with_metadata("deadlineAt", ts(deadline_at));
        SqlLeadEventRepository::append(conn, &event).await?;

        info!(
            event_name = "sla.clock_started",
            lead_id = %lead.id,
            workspace_id = %lead.workspace_id,
            deadline_at = %ts(deadline_at),
            "sla clock started"
        );
        Ok(state)
    }

    /// Stops the clock at most once. A second caller gets `already_stopped = true`.
    pub async fn stop_clock(
        &self,
        lead_id: &LeadId,
        reason: StopReason,
        proof_event_id: Option<&ProofEventId>,
        now: DateTime<Utc>,
    ) -> Result<StopOutcome, ApplicationError> {
        let lead = SqlLeadRepository::new(self.pool.clone())
            .find(lead_id)
            .await?
            .ok_or_else(|| DomainError::not_found("lead", lead_id.as_str()))?;
        let sla = SqlSlaRepository::new(self.pool.clone());
        if sla.find_by_lead(lead_id).await?.is_none() {
            return Err(DomainError::not_found("sla_state", lead_id.as_str()).into());
        }

        let mut tx = begin(&self.pool).await?;
        let stopped = Self::stop_in(
            &mut tx,
            &lead.id,
            &lead.workspace_id,
            &reason,
            proof_event_id,
            now,
            actors::SYSTEM,
        )
        .await?;
        commit(tx).await?;

        if stopped {
            return Ok(StopOutcome { already_stopped: false, stopped_at: Some(now) });
        }
        let stopped_at = sla.find_by_lead(lead_id).await?.and_then(|state| state.stopped_at);
        Ok(StopOutcome { already_stopped: true, stopped_at })
    }

    /// Guarded stop plus its `sla_stopped` event, inside the caller's transaction.
    /// Returns `false` when the clock was already stopped.
    pub(crate) async fn stop_in(
        conn: &mut SqliteConnection,
        lead_id: &LeadId,
        workspace_id: &WorkspaceId,
        reason: &StopReason,
        proof_event_id: Option<&ProofEventId>,
        at: DateTime<Utc>,
        actor: &str,
    ) -> Result<bool, ApplicationError> {
        if !SqlSlaRepository::stop_guarded(conn, lead_id, reason, proof_event_id, at).await? {
            return Ok(false);
        }

        let mut event = LeadEvent::new(
            lead_id.clone(),
            workspace_id.clone(),
            event_types::SLA_STOPPED,
            actor,
            at,
        )
        .with_metadata("reason", reason.as_str());
        if let Some(proof_event_id) = proof_event_id {
            event = event.with_metadata("proofEventId", proof_event_id.as_str());
        }
        SqlLeadEventRepository::append(conn, &event).await?;

        info!(
            event_name = "sla.clock_stopped",
            lead_id = %lead_id,
            workspace_id = %workspace_id,
            reason = reason.as_str(),
            "sla clock stopped"
        );
        Ok(true)
    }

    /// Marks every due clock as breached. Safe to run redundantly: each clock is claimed by
    /// exactly one caller through the guarded update.
    pub async fn detect_breaches(&self, now: DateTime<Utc>) -> Result<BreachSweep, ApplicationError> {
        let due = SqlSlaRepository::new(self.pool.clone()).list_due(now).await?;
        let mut sweep = BreachSweep::default();

        for (state, workspace_id) in due {
            sweep.processed += 1;
            match self.breach_one(&state, &workspace_id, now).await {
                Ok(true) => sweep.breached += 1,
                Ok(false) => {}
                Err(error) => warn!(
                    event_name = "sla.breach_failed",
                    lead_id = %state.lead_id,
                    workspace_id = %workspace_id,
                    error = %error,
                    "could not record sla breach"
                ),
            }
        }

        Ok(sweep)
    }

    async fn breach_one(
        &self,
        state: &SlaState,
        workspace_id: &WorkspaceId,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        let mut tx = begin(&self.pool).await?;
        if !SqlSlaRepository::mark_breached_guarded(&mut tx, &state.id, now).await? {
            return Ok(false);
        }

        let event = LeadEvent::new(
            state.lead_id.clone(),
            workspace_id.clone(),
            event_types::SLA_BREACHED,
            actors::SYSTEM,
            now,
        )
        .with_metadata("slaStateId", state.id.as_str())
        .with_metadata("deadlineAt", ts(state.deadline_at));
        SqlLeadEventRepository::append(&mut tx, &event).await?;
        commit(tx).await?;

        info!(
            event_name = "sla.breach_detected",
            lead_id = %state.lead_id,
            workspace_id = %workspace_id,
            deadline_at = %ts(state.deadline_at),
            "sla deadline breached"
        );
        Ok(true)
    }
}
