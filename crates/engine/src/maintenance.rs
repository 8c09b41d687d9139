//! One pass of every periodic duty, for the maintenance endpoint and `leadline sweep`.

use chrono::{DateTime, Utc};
use leadline_core::domain::escalation::EscalationSweep;
use leadline_core::domain::outbound::DispatchSummary;
use leadline_core::domain::sla::BreachSweep;
use leadline_core::errors::ApplicationError;
use leadline_db::repositories::{SqlPendingReplyRepository, SqlWorkspaceRepository};
use serde::Serialize;
use tracing::{info, warn};

use crate::Engine;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub breaches: BreachSweep,
    pub escalations: EscalationSweep,
    pub dispatch: DispatchSummary,
    pub expired_replies: u64,
}

impl Engine {
    /// Escalation for every workspace, breach detection, one dispatch batch, then expiry of
    /// overdue agent prompts. A failing workspace is logged and skipped.
    pub async fn run_maintenance(
        &self,
        now: DateTime<Utc>,
        dispatch_limit: Option<u32>,
    ) -> Result<MaintenanceReport, ApplicationError> {
        let mut report = MaintenanceReport::default();

        let workspaces = SqlWorkspaceRepository::new(self.pool.clone()).list_ids().await?;
        for workspace_id in workspaces {
            match self.escalation.detect_escalations(&workspace_id, now).await {
                Ok(sweep) => {
                    report.escalations.evaluated += sweep.evaluated;
                    report.escalations.raised += sweep.raised;
                    report.escalations.notifications_queued += sweep.notifications_queued;
                }
                Err(error) => warn!(
                    event_name = "maintenance.escalation_failed",
                    workspace_id = %workspace_id,
                    error = %error,
                    "escalation sweep failed for workspace"
                ),
            }
        }

        // after escalation: a breached clock is no longer escalated
        report.breaches = self.sla.detect_breaches(now).await?;

        let limit = dispatch_limit.unwrap_or(self.dispatch_batch_size).max(1);
        report.dispatch = self.dispatcher.dispatch_queued(limit, now).await?;
        report.expired_replies =
            SqlPendingReplyRepository::new(self.pool.clone()).expire_overdue(now).await?;

        info!(
            event_name = "maintenance.sweep_completed",
            breached = report.breaches.breached,
            escalations_raised = report.escalations.raised,
            dispatched = report.dispatch.processed,
            expired_replies = report.expired_replies,
            "maintenance sweep completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use leadline_core::config::AppConfig;
    use leadline_core::domain::escalation::EscalationLevel;
    use leadline_core::domain::ids::LeadId;
    use leadline_core::domain::workspace::MemberRole;

    use leadline_db::repositories::SqlEscalationRepository;

    use crate::test_support::{at, seed_lead, seed_member, seed_workspace, setup_pool, FakeProvider};
    use crate::Engine;

    #[tokio::test]
    async fn sweep_breaches_escalates_and_dispatches() {
        let pool = setup_pool().await;
        seed_workspace(&pool, "W-1").await;
        seed_member(&pool, "W-1", "agent-1", MemberRole::Agent, Some("+15550200"), false).await;
        seed_member(&pool, "W-1", "manager-1", MemberRole::Manager, Some("+15550300"), true).await;
        seed_lead(&pool, "W-1", "L-1", Some("+15550100"), Some("agent-1")).await;
        let provider = Arc::new(FakeProvider::default());
        let engine = Engine::new(pool.clone(), &AppConfig::default(), provider.clone(), None);
        let start = at("2026-03-02T09:00:00Z");
        engine
            .sla
            .start_clock(&LeadId::from("L-1"), start + Duration::minutes(15), start)
            .await
            .expect("start");

        let report = engine
            .run_maintenance(at("2026-03-02T09:14:00Z"), None)
            .await
            .expect("first sweep");
        assert_eq!(report.breaches.breached, 0);
        // unavailable owner: reminder and reassign are waived, 93% also clears the manager alert
        assert_eq!(report.escalations.raised, 3);
        assert!(report.dispatch.sent >= 1);

        let later = engine
            .run_maintenance(at("2026-03-02T09:20:00Z"), None)
            .await
            .expect("second sweep");
        assert_eq!(later.breaches.breached, 1);
        let again = engine
            .run_maintenance(at("2026-03-02T09:21:00Z"), None)
            .await
            .expect("third sweep");
        assert_eq!(again.breaches.breached, 0);
        assert_eq!(again.dispatch.processed, 0);
    }

    #[tokio::test]
    async fn unanswered_lead_reaches_manager_alert_before_it_breaches() {
        let pool = setup_pool().await;
        seed_workspace(&pool, "W-1").await;
        seed_member(&pool, "W-1", "agent-1", MemberRole::Agent, Some("+15550200"), true).await;
        seed_member(&pool, "W-1", "agent-2", MemberRole::Agent, Some("+15550201"), true).await;
        seed_member(&pool, "W-1", "manager-1", MemberRole::Manager, Some("+15550300"), true).await;
        seed_lead(&pool, "W-1", "L-1", Some("+15550100"), Some("agent-1")).await;
        let provider = Arc::new(FakeProvider::failing_for("+15550100"));
        let engine = Engine::new(pool.clone(), &AppConfig::default(), provider, None);
        let start = at("2026-03-02T09:00:00Z");
        engine
            .sla
            .start_clock(&LeadId::from("L-1"), start + Duration::minutes(15), start)
            .await
            .expect("start");

        let mut breached = 0;
        for minutes in [5, 10, 15, 20, 25] {
            let report = engine
                .run_maintenance(start + Duration::minutes(minutes), None)
                .await
                .expect("sweep");
            breached += report.breaches.breached;
        }

        assert_eq!(breached, 1);
        let levels: Vec<EscalationLevel> = SqlEscalationRepository::new(pool.clone())
            .list_for_lead(&LeadId::from("L-1"))
            .await
            .expect("escalations")
            .into_iter()
            .map(|event| event.level)
            .collect();
        assert_eq!(
            levels,
            vec![EscalationLevel::Reminder, EscalationLevel::Reassign, EscalationLevel::ManagerAlert]
        );
    }
}
