use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leadline_core::domain::ids::{LeadId, ProofEventId, SlaStateId, WorkspaceId};
use leadline_core::domain::sla::{SlaState, StopReason};

use super::{parse_optional_timestamp, parse_timestamp, ts, RepositoryError};
use crate::DbPool;

const SLA_COLUMNS: &str = "s.id, s.lead_id, s.started_at, s.deadline_at, s.stopped_at,
    s.stop_reason, s.stop_proof_event_id, s.breached_at";

pub struct SqlSlaRepository {
    pool: DbPool,
}

impl SqlSlaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts the clock; returns `false` when the lead already has one.
    pub async fn insert(
        conn: &mut SqliteConnection,
        state: &SlaState,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO sla_state (
                id, lead_id, started_at, deadline_at, stopped_at, stop_reason,
                stop_proof_event_id, breached_at
             ) VALUES (?, ?, ?, ?, NULL, NULL, NULL, NULL)
             ON CONFLICT(lead_id) DO NOTHING",
        )
        .bind(&state.id.0)
        .bind(&state.lead_id.0)
        .bind(ts(state.started_at))
        .bind(ts(state.deadline_at))
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn find_by_lead(&self, lead_id: &LeadId) -> Result<Option<SlaState>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SLA_COLUMNS} FROM sla_state s WHERE s.lead_id = ?"))
            .bind(&lead_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(sla_from_row).transpose()
    }

    /// Sets the stop fields only while the clock is still unstopped.
    pub async fn stop_guarded(
        conn: &mut SqliteConnection,
        lead_id: &LeadId,
        reason: &StopReason,
        proof_event_id: Option<&ProofEventId>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE sla_state
             SET stopped_at = ?, stop_reason = ?, stop_proof_event_id = ?
             WHERE lead_id = ? AND stopped_at IS NULL",
        )
        .bind(ts(at))
        .bind(reason.as_str())
        .bind(proof_event_id.map(|id| id.0.as_str()))
        .bind(&lead_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Open clocks whose deadline is at or before `now`, with their workspace.
    pub async fn list_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(SlaState, WorkspaceId)>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SLA_COLUMNS}, l.workspace_id
             FROM sla_state s
             JOIN lead l ON l.id = s.lead_id
             WHERE s.stopped_at IS NULL AND s.breached_at IS NULL AND s.deadline_at <= ?"
        ))
        .bind(ts(now))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let workspace_id = WorkspaceId(row.try_get("workspace_id")?);
                Ok((sla_from_row(row)?, workspace_id))
            })
            .collect()
    }

    pub async fn mark_breached_guarded(
        conn: &mut SqliteConnection,
        id: &SlaStateId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE sla_state
             SET breached_at = ?
             WHERE id = ? AND breached_at IS NULL AND stopped_at IS NULL",
        )
        .bind(ts(at))
        .bind(&id.0)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Running clocks of a workspace with the owner of each lead.
    pub async fn list_running_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<(SlaState, Option<String>)>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SLA_COLUMNS}, l.owner_user_id
             FROM sla_state s
             JOIN lead l ON l.id = s.lead_id
             WHERE l.workspace_id = ? AND s.stopped_at IS NULL AND s.breached_at IS NULL
             ORDER BY s.deadline_at ASC"
        ))
        .bind(&workspace_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let owner: Option<String> = row.try_get("owner_user_id")?;
                Ok((sla_from_row(row)?, owner))
            })
            .collect()
    }

    pub async fn count_open(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(1) FROM sla_state WHERE stopped_at IS NULL AND breached_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

fn sla_from_row(row: SqliteRow) -> Result<SlaState, RepositoryError> {
    Ok(SlaState {
        id: SlaStateId(row.try_get("id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        started_at: parse_timestamp("started_at", row.try_get("started_at")?)?,
        deadline_at: parse_timestamp("deadline_at", row.try_get("deadline_at")?)?,
        stopped_at: parse_optional_timestamp("stopped_at", row.try_get("stopped_at")?)?,
        stop_reason: row.try_get::<Option<String>, _>("stop_reason")?.map(|raw| StopReason::parse(&raw)),
        stop_proof_event_id: row
            .try_get::<Option<String>, _>("stop_proof_event_id")?
            .map(ProofEventId),
        breached_at: parse_optional_timestamp("breached_at", row.try_get("breached_at")?)?,
    })
}
