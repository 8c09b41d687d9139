use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leadline_core::domain::escalation::{EscalationEvent, EscalationLevel};
use leadline_core::domain::ids::{EscalationEventId, LeadId};

use super::{decode_enum, parse_timestamp, ts, RepositoryError};
use crate::DbPool;

pub struct SqlEscalationRepository {
    pool: DbPool,
}

impl SqlEscalationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts the event unless the lead already has one at that level.
    pub async fn insert_if_absent(
        conn: &mut SqliteConnection,
        event: &EscalationEvent,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO escalation_event (
                id, lead_id, level, reason, elapsed_ratio, target_user_id, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(lead_id, level) DO NOTHING",
        )
        .bind(&event.id.0)
        .bind(&event.lead_id.0)
        .bind(event.level.as_str())
        .bind(&event.reason)
        .bind(event.elapsed_ratio)
        .bind(event.target_user_id.as_deref())
        .bind(ts(event.created_at))
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn highest_level(
        &self,
        lead_id: &LeadId,
    ) -> Result<Option<EscalationLevel>, RepositoryError> {
        let levels: Vec<String> =
            sqlx::query_scalar("SELECT level FROM escalation_event WHERE lead_id = ?")
                .bind(&lead_id.0)
                .fetch_all(&self.pool)
                .await?;

        let mut highest = None;
        for raw in levels {
            let level = decode_enum("level", raw, EscalationLevel::parse)?;
            highest = highest.max(Some(level));
        }
        Ok(highest)
    }

    pub async fn list_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<EscalationEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, lead_id, level, reason, elapsed_ratio, target_user_id, created_at
             FROM escalation_event
             WHERE lead_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(escalation_from_row).collect()
    }
}

fn escalation_from_row(row: SqliteRow) -> Result<EscalationEvent, RepositoryError> {
    Ok(EscalationEvent {
        id: EscalationEventId(row.try_get("id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        level: decode_enum("level", row.try_get("level")?, EscalationLevel::parse)?,
        reason: row.try_get("reason")?,
        elapsed_ratio: row.try_get("elapsed_ratio")?,
        target_user_id: row.try_get("target_user_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
