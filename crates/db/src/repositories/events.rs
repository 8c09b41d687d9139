use std::collections::BTreeMap;

use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leadline_core::audit::LeadEvent;
use leadline_core::domain::ids::{LeadEventId, LeadId, WorkspaceId};

use super::{parse_timestamp, ts, RepositoryError};
use crate::DbPool;

pub struct SqlLeadEventRepository {
    pool: DbPool,
}

impl SqlLeadEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(conn: &mut SqliteConnection, event: &LeadEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO lead_event (id, lead_id, workspace_id, event_type, actor, payload_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id.0)
        .bind(&event.lead_id.0)
        .bind(&event.workspace_id.0)
        .bind(&event.event_type)
        .bind(&event.actor)
        .bind(event.payload_json())
        .bind(ts(event.occurred_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Timeline of one lead, oldest first; ties keep insertion order.
    pub async fn list_for_lead(&self, lead_id: &LeadId) -> Result<Vec<LeadEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, lead_id, workspace_id, event_type, actor, payload_json, occurred_at
             FROM lead_event
             WHERE lead_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    pub async fn count_by_type(
        &self,
        lead_id: &LeadId,
        event_type: &str,
    ) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(1) FROM lead_event WHERE lead_id = ? AND event_type = ?",
        )
        .bind(&lead_id.0)
        .bind(event_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

fn event_from_row(row: SqliteRow) -> Result<LeadEvent, RepositoryError> {
    let raw_payload: String = row.try_get("payload_json")?;
    let payload: BTreeMap<String, Value> = serde_json::from_str(&raw_payload)
        .map_err(|error| RepositoryError::Decode(format!("invalid event payload: {error}")))?;

    Ok(LeadEvent {
        id: LeadEventId(row.try_get("id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        workspace_id: WorkspaceId(row.try_get("workspace_id")?),
        event_type: row.try_get("event_type")?,
        actor: row.try_get("actor")?,
        payload,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use leadline_core::audit::{actors, event_types, LeadEvent};
    use leadline_core::domain::ids::{LeadId, WorkspaceId};

    use super::SqlLeadEventRepository;
    use crate::repositories::test_support::{insert_lead, insert_workspace, parse_ts, setup_pool};

    #[tokio::test]
    async fn timeline_preserves_order_and_payload() {
        let pool = setup_pool().await;
        insert_workspace(&pool, "W-1").await;
        insert_lead(&pool, "W-1", "L-1").await;
        let repo = SqlLeadEventRepository::new(pool.clone());
        let at = parse_ts("2026-03-02T09:00:00Z");

        let created = LeadEvent::new(
            LeadId::from("L-1"),
            WorkspaceId::from("W-1"),
            event_types::LEAD_CREATED,
            actors::SYSTEM,
            at,
        )
        .with_metadata("source", "website");
        let started = LeadEvent::new(
            LeadId::from("L-1"),
            WorkspaceId::from("W-1"),
            event_types::SLA_STARTED,
            actors::SYSTEM,
            at,
        );

        let mut conn = pool.acquire().await.expect("acquire");
        SqlLeadEventRepository::append(&mut conn, &created).await.expect("append");
        SqlLeadEventRepository::append(&mut conn, &started).await.expect("append");
        drop(conn);

        let events = repo.list_for_lead(&LeadId::from("L-1")).await.expect("list");
        assert_eq!(events, vec![created, started]);
        assert_eq!(
            repo.count_by_type(&LeadId::from("L-1"), event_types::SLA_STARTED).await.expect("count"),
            1
        );

        pool.close().await;
    }
}
