//! Staged escalation of leads whose clock is still running.
//!
//! Invoked opportunistically from read paths and from the maintenance sweep, so every step
//! is idempotent: the `(lead, level)` uniqueness of escalation events decides which caller
//! raises a level, and ownership moves with a guarded update on the previous owner.

use chrono::{DateTime, Utc};
use leadline_core::audit::{actors, event_types, LeadEvent};
use leadline_core::domain::escalation::{EscalationEvent, EscalationLevel, EscalationSweep};
use leadline_core::domain::ids::{EscalationEventId, WorkspaceId};
use leadline_core::domain::lead::Lead;
use leadline_core::domain::sla::SlaState;
use leadline_core::domain::workspace::WorkspaceMember;
use leadline_core::errors::ApplicationError;
use leadline_core::escalation_policy::{due_escalations, EscalationInput, EscalationThresholds};
use leadline_db::repositories::{
    SqlEscalationRepository, SqlLeadEventRepository, SqlLeadRepository, SqlSlaRepository,
    SqlWorkspaceRepository,
};
use leadline_db::DbPool;
use tracing::{info, warn};

use crate::notify::notify_member_in;
use crate::routing::{manager_alert_recipients, owner_is_available, reassignment_target};
use crate::store::{begin, commit};

#[derive(Clone)]
pub struct EscalationEngine {
    pool: DbPool,
    thresholds: EscalationThresholds,
}

struct Raised {
    event: EscalationEvent,
    new_owner: Option<String>,
}

impl EscalationEngine {
    pub fn new(pool: DbPool, thresholds: EscalationThresholds) -> Self {
        Self { pool, thresholds }
    }

    pub async fn detect_escalations(
        &self,
        workspace_id: &WorkspaceId,
        now: DateTime<Utc>,
    ) -> Result<EscalationSweep, ApplicationError> {
        let members = SqlWorkspaceRepository::new(self.pool.clone()).list_members(workspace_id).await?;
        let running =
            SqlSlaRepository::new(self.pool.clone()).list_running_for_workspace(workspace_id).await?;
        let escalations = SqlEscalationRepository::new(self.pool.clone());
        let leads = SqlLeadRepository::new(self.pool.clone());
        let mut sweep = EscalationSweep::default();

        for (state, owner) in running {
            sweep.evaluated += 1;
            let input = EscalationInput {
                elapsed_ratio: state.elapsed_ratio(now),
                highest_recorded: escalations.highest_level(&state.lead_id).await?,
                owner_available: owner_is_available(&members, owner.as_deref()),
            };
            let due = due_escalations(&self.thresholds, input);
            if due.is_empty() {
                continue;
            }
            let Some(lead) = leads.find(&state.lead_id).await? else {
                continue;
            };

            for decision in due {
                let raised = self
                    .raise(&lead, &state, &members, decision.level, decision.reason, input.elapsed_ratio, now)
                    .await?;
                // another caller got here first and owns the rest of the sequence
                let Some(raised) = raised else {
                    break;
                };
                sweep.raised += 1;

                match self.notify(&lead, &members, &raised, now).await {
                    Ok(queued) => sweep.notifications_queued += queued,
                    Err(error) => warn!(
                        event_name = "escalation.notification_failed",
                        lead_id = %lead.id,
                        workspace_id = %workspace_id,
                        level = raised.event.level.as_str(),
                        error = %error,
                        "escalation recorded but notification could not be queued"
                    ),
                }
            }
        }

        Ok(sweep)
    }

    /// Records the level and, for REASSIGN, moves ownership. `None` when another caller
    /// raised the same level first.
    #[allow(clippy::too_many_arguments)]
    async fn raise(
        &self,
        lead: &Lead,
        state: &SlaState,
        members: &[WorkspaceMember],
        level: EscalationLevel,
        reason: String,
        elapsed_ratio: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Raised>, ApplicationError> {
        let current_owner = lead.owner_user_id.as_deref();
        let target = match level {
            EscalationLevel::Reminder => lead.owner_user_id.clone(),
            EscalationLevel::Reassign => {
                reassignment_target(members, current_owner).map(|member| member.user_id.clone())
            }
            EscalationLevel::ManagerAlert => None,
        };
        let event = EscalationEvent {
            id: EscalationEventId::generate(),
            lead_id: state.lead_id.clone(),
            level,
            reason,
            elapsed_ratio,
            target_user_id: target.clone(),
            created_at: now,
        };

        let mut tx = begin(&self.pool).await?;
        if !SqlEscalationRepository::insert_if_absent(&mut tx, &event).await? {
            return Ok(None);
        }

        let mut audit = LeadEvent::new(
            lead.id.clone(),
            lead.workspace_id.clone(),
            event_types::ESCALATION_RAISED,
            actors::SYSTEM,
            now,
        )
        .with_metadata("escalationEventId", event.id.as_str())
        .with_metadata("level", level.as_str())
        .with_metadata("reason", event.reason.clone())
        .with_metadata("elapsedRatio", elapsed_ratio);
        if let Some(target) = &target {
            audit = audit.with_metadata("targetUserId", target.clone());
        }
        SqlLeadEventRepository::append(&mut tx, &audit).await?;

        let mut new_owner = None;
        if let (EscalationLevel::Reassign, Some(target)) = (level, target.as_deref()) {
            if SqlLeadRepository::reassign_owner(&mut tx, &lead.id, current_owner, target, now).await? {
                let mut reassigned = LeadEvent::new(
                    lead.id.clone(),
                    lead.workspace_id.clone(),
                    event_types::LEAD_REASSIGNED,
                    actors::SYSTEM,
                    now,
                )
                .with_metadata("toUserId", target);
                if let Some(previous) = current_owner {
                    reassigned = reassigned.with_metadata("fromUserId", previous);
                }
                SqlLeadEventRepository::append(&mut tx, &reassigned).await?;
                new_owner = Some(target.to_owned());
            }
        }
        commit(tx).await?;

        info!(
            event_name = "escalation.raised",
            lead_id = %lead.id,
            workspace_id = %lead.workspace_id,
            level = level.as_str(),
            elapsed_ratio,
            "escalation level raised"
        );
        Ok(Some(Raised { event, new_owner }))
    }

    async fn notify(
        &self,
        lead: &Lead,
        members: &[WorkspaceMember],
        raised: &Raised,
        now: DateTime<Utc>,
    ) -> Result<u32, ApplicationError> {
        let find = |user_id: &str| members.iter().find(|member| member.user_id == user_id);
        let percent = (raised.event.elapsed_ratio * 100.0).round();

        let notifications: Vec<(&WorkspaceMember, String)> = match raised.event.level {
            EscalationLevel::Reminder => lead
                .owner_user_id
                .as_deref()
                .and_then(find)
                .map(|owner| {
                    vec![(
                        owner,
                        format!(
                            "Reminder: lead {} is still waiting for a first response ({percent}% of the response window used).",
                            lead.name
                        ),
                    )]
                })
                .unwrap_or_default(),
            EscalationLevel::Reassign => raised
                .new_owner
                .as_deref()
                .and_then(find)
                .map(|owner| {
                    vec![(
                        owner,
                        format!("Lead {} has been reassigned to you. Please respond now.", lead.name),
                    )]
                })
                .unwrap_or_default(),
            EscalationLevel::ManagerAlert => manager_alert_recipients(members)
                .into_iter()
                .map(|manager| {
                    (
                        manager,
                        format!(
                            "Manager alert: lead {} has no response after {percent}% of its window.",
                            lead.name
                        ),
                    )
                })
                .collect(),
        };

        if notifications.is_empty() {
            return Ok(0);
        }

        let mut queued = 0;
        let mut tx = begin(&self.pool).await?;
        for (member, text) in notifications {
            if notify_member_in(&mut tx, lead, member, text, actors::SYSTEM, now).await?.is_some() {
                queued += 1;
            }
        }
        commit(tx).await?;
        Ok(queued)
    }
}
