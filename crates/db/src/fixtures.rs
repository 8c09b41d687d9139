use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

pub const DEMO_WORKSPACE_ID: &str = "ws-demo-001";

/// Seeded records and the state the rest of the system relies on them having.
const SEED_CHECKS: &[SeedCheck] = &[
    SeedCheck {
        label: "workspace",
        sql: "SELECT EXISTS(SELECT 1 FROM workspace WHERE id = 'ws-demo-001' AND sla_minutes = 15)",
    },
    SeedCheck {
        label: "members",
        sql: "SELECT COUNT(1) = 4 FROM workspace_member WHERE workspace_id = 'ws-demo-001'",
    },
    SeedCheck {
        label: "unavailable-agent",
        sql: "SELECT EXISTS(SELECT 1 FROM workspace_member
              WHERE user_id = 'user-agent-002' AND is_available = 0)",
    },
    SeedCheck {
        label: "default-scenario",
        sql: "SELECT EXISTS(SELECT 1 FROM autopilot_scenario
              WHERE workspace_id = 'ws-demo-001' AND is_default = 1 AND id = 'scn-qualify-001')",
    },
    SeedCheck {
        label: "scripted-questions",
        sql: "SELECT json_array_length(questions_json) = 3 FROM autopilot_scenario
              WHERE id = 'scn-qualify-001'",
    },
    SeedCheck {
        label: "lead-with-phone",
        sql: "SELECT EXISTS(SELECT 1 FROM lead WHERE id = 'lead-demo-001' AND phone IS NOT NULL)",
    },
    SeedCheck {
        label: "lead-without-phone",
        sql: "SELECT EXISTS(SELECT 1 FROM lead WHERE id = 'lead-demo-002' AND phone IS NULL)",
    },
    SeedCheck {
        label: "lead-created-events",
        sql: "SELECT COUNT(1) = 2 FROM lead_event
              WHERE workspace_id = 'ws-demo-001' AND event_type = 'lead_created'",
    },
];

const SEED_LEAD_IDS: &[&str] = &["lead-demo-001", "lead-demo-002"];

/// Demo workspace with members, scenarios and two fresh leads.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            workspace_id: DEMO_WORKSPACE_ID,
            lead_ids: SEED_LEAD_IDS.to_vec(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_CHECKS.len());
        for check in SEED_CHECKS {
            let present: Option<bool> =
                sqlx::query_scalar(check.sql).fetch_optional(pool).await?.flatten();
            checks.push((check.label, present.unwrap_or(false)));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo workspace; member, lead and timeline rows cascade.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        // these reference scenarios and messages without ON DELETE CASCADE
        sqlx::query("DELETE FROM pending_agent_reply WHERE workspace_id = ?")
            .bind(DEMO_WORKSPACE_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM autopilot_run WHERE workspace_id = ?")
            .bind(DEMO_WORKSPACE_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM workspace WHERE id = ?")
            .bind(DEMO_WORKSPACE_ID)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedCheck {
    label: &'static str,
    sql: &'static str,
}

#[derive(Debug)]
pub struct SeedResult {
    pub workspace_id: &'static str,
    pub lead_ids: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
