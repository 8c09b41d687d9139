use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leadline_core::domain::autopilot::{
    AutopilotMode, AutopilotRun, AutopilotScenario, AutopilotState, RunStatus, ScenarioType,
};
use leadline_core::domain::ids::{AutopilotRunId, LeadId, ScenarioId, WorkspaceId};

use super::{decode_enum, parse_timestamp, parse_u32, ts, RepositoryError};
use crate::DbPool;

const SCENARIO_COLUMNS: &str =
    "id, workspace_id, name, scenario_type, mode, max_questions, is_default, ai_prompt, questions_json";

const RUN_COLUMNS: &str = "id, lead_id, scenario_id, status, current_step, state_json, state_version,
    created_at, updated_at";

pub struct SqlAutopilotRepository {
    pool: DbPool,
}

impl SqlAutopilotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save_scenario(
        &self,
        scenario: &AutopilotScenario,
        created_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let questions = serde_json::to_string(&scenario.questions)
            .map_err(|error| RepositoryError::Decode(format!("questions: {error}")))?;

        sqlx::query(
            "INSERT INTO autopilot_scenario (
                id, workspace_id, name, scenario_type, mode, max_questions, is_default, ai_prompt,
                questions_json, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                scenario_type = excluded.scenario_type,
                mode = excluded.mode,
                max_questions = excluded.max_questions,
                ai_prompt = excluded.ai_prompt,
                questions_json = excluded.questions_json",
        )
        .bind(&scenario.id.0)
        .bind(&scenario.workspace_id.0)
        .bind(&scenario.name)
        .bind(scenario.scenario_type.as_str())
        .bind(scenario.mode.as_str())
        .bind(i64::from(scenario.max_questions))
        .bind(scenario.is_default)
        .bind(&scenario.ai_prompt)
        .bind(questions)
        .bind(ts(created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_scenario(
        &self,
        id: &ScenarioId,
    ) -> Result<Option<AutopilotScenario>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {SCENARIO_COLUMNS} FROM autopilot_scenario WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(scenario_from_row).transpose()
    }

    pub async fn find_default_scenario(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Option<AutopilotScenario>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SCENARIO_COLUMNS} FROM autopilot_scenario
             WHERE workspace_id = ? AND is_default = 1"
        ))
        .bind(&workspace_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(scenario_from_row).transpose()
    }

    pub async fn list_scenarios(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<AutopilotScenario>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SCENARIO_COLUMNS} FROM autopilot_scenario
             WHERE workspace_id = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&workspace_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(scenario_from_row).collect()
    }

    /// Clears the default flag across the workspace, then sets it on `scenario_id`.
    /// Both statements must run in the caller's transaction.
    pub async fn set_default(
        conn: &mut SqliteConnection,
        workspace_id: &WorkspaceId,
        scenario_id: &ScenarioId,
    ) -> Result<bool, RepositoryError> {
        sqlx::query(
            "UPDATE autopilot_scenario SET is_default = 0 WHERE workspace_id = ? AND is_default = 1",
        )
        .bind(&workspace_id.0)
        .execute(&mut *conn)
        .await?;

        let result = sqlx::query(
            "UPDATE autopilot_scenario SET is_default = 1 WHERE id = ? AND workspace_id = ?",
        )
        .bind(&scenario_id.0)
        .bind(&workspace_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Inserts the run; returns `false` when the lead already has one.
    pub async fn insert_run(
        conn: &mut SqliteConnection,
        run: &AutopilotRun,
        workspace_id: &WorkspaceId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO autopilot_run (
                id, lead_id, workspace_id, scenario_id, status, current_step, state_json,
                state_version, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(lead_id) DO NOTHING",
        )
        .bind(&run.id.0)
        .bind(&run.lead_id.0)
        .bind(&workspace_id.0)
        .bind(&run.scenario_id.0)
        .bind(run.status.as_str())
        .bind(&run.current_step)
        .bind(run.state.to_json())
        .bind(i64::from(run.state_version))
        .bind(ts(run.created_at))
        .bind(ts(run.updated_at))
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn find_run(&self, id: &AutopilotRunId) -> Result<Option<AutopilotRun>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM autopilot_run WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(run_from_row).transpose()
    }

    pub async fn find_run_by_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Option<AutopilotRun>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM autopilot_run WHERE lead_id = ?"))
            .bind(&lead_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(run_from_row).transpose()
    }

    /// Writes the next state only if nobody advanced the run since it was read.
    pub async fn advance_run_guarded(
        conn: &mut SqliteConnection,
        run: &AutopilotRun,
        expected_version: u32,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE autopilot_run
             SET status = ?, current_step = ?, state_json = ?, state_version = state_version + 1,
                 updated_at = ?
             WHERE id = ? AND state_version = ? AND status = 'ACTIVE'",
        )
        .bind(run.status.as_str())
        .bind(&run.current_step)
        .bind(run.state.to_json())
        .bind(ts(run.updated_at))
        .bind(&run.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Points a run at `scenario` and resets it to the scenario's initial node.
    pub async fn reset_run(
        conn: &mut SqliteConnection,
        run_id: &AutopilotRunId,
        scenario: &AutopilotScenario,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let state = AutopilotState::initial(scenario);
        let result = sqlx::query(
            "UPDATE autopilot_run
             SET scenario_id = ?, status = 'ACTIVE', current_step = ?, state_json = ?,
                 state_version = state_version + 1, updated_at = ?
             WHERE id = ?",
        )
        .bind(&scenario.id.0)
        .bind(&state.node)
        .bind(state.to_json())
        .bind(ts(at))
        .bind(&run_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Run and lead ids of every run in the workspace.
    pub async fn list_run_refs_for_workspace(
        conn: &mut SqliteConnection,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<(AutopilotRunId, LeadId)>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, lead_id FROM autopilot_run WHERE workspace_id = ? ORDER BY created_at ASC",
        )
        .bind(&workspace_id.0)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|row| Ok((AutopilotRunId(row.try_get("id")?), LeadId(row.try_get("lead_id")?))))
            .collect()
    }

    /// Moves every run in the workspace to `scenario` with a fresh state.
    pub async fn reset_runs_for_workspace(
        conn: &mut SqliteConnection,
        workspace_id: &WorkspaceId,
        scenario: &AutopilotScenario,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let state = AutopilotState::initial(scenario);
        let result = sqlx::query(
            "UPDATE autopilot_run
             SET scenario_id = ?, status = 'ACTIVE', current_step = ?, state_json = ?,
                 state_version = state_version + 1, updated_at = ?
             WHERE workspace_id = ?",
        )
        .bind(&scenario.id.0)
        .bind(&state.node)
        .bind(state.to_json())
        .bind(ts(at))
        .bind(&workspace_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}

fn scenario_from_row(row: SqliteRow) -> Result<AutopilotScenario, RepositoryError> {
    let raw_questions: String = row.try_get("questions_json")?;
    let questions: Vec<String> = serde_json::from_str(&raw_questions)
        .map_err(|error| RepositoryError::Decode(format!("invalid questions_json: {error}")))?;

    Ok(AutopilotScenario {
        id: ScenarioId(row.try_get("id")?),
        workspace_id: WorkspaceId(row.try_get("workspace_id")?),
        name: row.try_get("name")?,
        scenario_type: decode_enum(
            "scenario_type",
            row.try_get("scenario_type")?,
            ScenarioType::parse,
        )?,
        mode: decode_enum("mode", row.try_get("mode")?, AutopilotMode::parse)?,
        max_questions: parse_u32("max_questions", row.try_get("max_questions")?)?,
        is_default: row.try_get("is_default")?,
        ai_prompt: row.try_get("ai_prompt")?,
        questions,
    })
}

fn run_from_row(row: SqliteRow) -> Result<AutopilotRun, RepositoryError> {
    let raw_state: String = row.try_get("state_json")?;
    let state = AutopilotState::from_json(&raw_state)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(AutopilotRun {
        id: AutopilotRunId(row.try_get("id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        scenario_id: ScenarioId(row.try_get("scenario_id")?),
        status: decode_enum("status", row.try_get("status")?, RunStatus::parse)?,
        current_step: row.try_get("current_step")?,
        state,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use leadline_core::domain::autopilot::{
        AutopilotMode, AutopilotRun, AutopilotScenario, RunStatus, ScenarioType,
    };
    use leadline_core::domain::ids::{LeadId, ScenarioId, WorkspaceId};

    use super::SqlAutopilotRepository;
    use crate::repositories::test_support::{insert_lead, insert_workspace, parse_ts, setup_pool};

    fn scenario(id: &str, scenario_type: ScenarioType, is_default: bool) -> AutopilotScenario {
        AutopilotScenario {
            id: ScenarioId::from(id),
            workspace_id: WorkspaceId::from("W-1"),
            name: id.to_owned(),
            scenario_type,
            mode: AutopilotMode::Scripted,
            max_questions: 3,
            is_default,
            ai_prompt: String::new(),
            questions: vec!["Buying or selling?".to_owned()],
        }
    }

    #[tokio::test]
    async fn only_one_default_scenario_per_workspace() {
        let pool = setup_pool().await;
        insert_workspace(&pool, "W-1").await;
        let repo = SqlAutopilotRepository::new(pool.clone());
        let at = parse_ts("2026-03-02T09:00:00Z");

        repo.save_scenario(&scenario("SCN-A", ScenarioType::Qualification, true), at)
            .await
            .expect("save default");
        let conflicting = repo
            .save_scenario(&scenario("SCN-B", ScenarioType::Appointment, true), at)
            .await
            .expect_err("second default must violate the partial unique index");
        assert!(conflicting.is_unique_violation());

        repo.save_scenario(&scenario("SCN-B", ScenarioType::Appointment, false), at)
            .await
            .expect("save non-default");

        let mut tx = pool.begin().await.expect("begin");
        let switched = SqlAutopilotRepository::set_default(
            &mut tx,
            &WorkspaceId::from("W-1"),
            &ScenarioId::from("SCN-B"),
        )
        .await
        .expect("set default");
        tx.commit().await.expect("commit");

        assert!(switched);
        let default = repo
            .find_default_scenario(&WorkspaceId::from("W-1"))
            .await
            .expect("default")
            .expect("scenario");
        assert_eq!(default.id, ScenarioId::from("SCN-B"));
        assert_eq!(default.questions, vec!["Buying or selling?".to_owned()]);

        pool.close().await;
    }

    #[tokio::test]
    async fn guarded_advance_rejects_stale_versions_and_reset_reactivates() {
        let pool = setup_pool().await;
        insert_workspace(&pool, "W-1").await;
        insert_lead(&pool, "W-1", "L-1").await;
        let repo = SqlAutopilotRepository::new(pool.clone());
        let at = parse_ts("2026-03-02T09:00:00Z");
        let qualify = scenario("SCN-A", ScenarioType::Qualification, true);
        let booking = scenario("SCN-B", ScenarioType::Appointment, false);
        repo.save_scenario(&qualify, at).await.expect("save");
        repo.save_scenario(&booking, at).await.expect("save");

        let run = AutopilotRun::start(LeadId::from("L-1"), &qualify, at);
        let mut conn = pool.acquire().await.expect("acquire");
        assert!(SqlAutopilotRepository::insert_run(&mut conn, &run, &WorkspaceId::from("W-1"))
            .await
            .expect("insert"));
        assert!(!SqlAutopilotRepository::insert_run(
            &mut conn,
            &AutopilotRun::start(LeadId::from("L-1"), &qualify, at),
            &WorkspaceId::from("W-1")
        )
        .await
        .expect("duplicate"));

        let mut handed_over = run.clone();
        handed_over.status = RunStatus::HandedOver;
        handed_over.current_step = "handover".to_owned();
        handed_over.state.node = "handover".to_owned();
        assert!(SqlAutopilotRepository::advance_run_guarded(&mut conn, &handed_over, 1)
            .await
            .expect("advance"));
        assert!(!SqlAutopilotRepository::advance_run_guarded(&mut conn, &handed_over, 1)
            .await
            .expect("stale advance"));

        assert!(SqlAutopilotRepository::reset_run(&mut conn, &run.id, &booking, at)
            .await
            .expect("reset"));
        drop(conn);

        let stored = repo.find_run_by_lead(&LeadId::from("L-1")).await.expect("find").expect("run");
        assert_eq!(stored.status, RunStatus::Active);
        assert_eq!(stored.scenario_id, booking.id);
        assert_eq!(stored.current_step, "booking_start");
        assert_eq!(stored.state.node, "booking_start");
        assert_eq!(stored.state_version, 3);

        pool.close().await;
    }
}
