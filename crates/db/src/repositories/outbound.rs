use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leadline_core::domain::ids::{LeadId, OutboundMessageId, WorkspaceId};
use leadline_core::domain::outbound::{Audience, MessageStatus, OutboundMessage};
use leadline_core::domain::proof::Channel;

use super::{decode_enum, parse_optional_timestamp, parse_timestamp, ts, RepositoryError};
use crate::DbPool;

const MESSAGE_COLUMNS: &str = "id, lead_id, workspace_id, audience, channel, status, to_phone, text,
    provider, provider_message_id, fail_reason, sent_at, delivered_at, read_at, created_at";

pub struct SqlOutboundRepository {
    pool: DbPool,
}

impl SqlOutboundRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        message: &OutboundMessage,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO outbound_message (
                id, lead_id, workspace_id, audience, channel, status, to_phone, text, provider,
                provider_message_id, fail_reason, sent_at, delivered_at, read_at, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.lead_id.0)
        .bind(&message.workspace_id.0)
        .bind(message.audience.as_str())
        .bind(message.channel.as_str())
        .bind(message.status.as_str())
        .bind(message.to_phone.as_deref())
        .bind(&message.text)
        .bind(message.provider.as_deref())
        .bind(message.provider_message_id.as_deref())
        .bind(message.fail_reason.as_deref())
        .bind(message.sent_at.map(ts))
        .bind(message.delivered_at.map(ts))
        .bind(message.read_at.map(ts))
        .bind(ts(message.created_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn find(&self, id: &OutboundMessageId) -> Result<Option<OutboundMessage>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM outbound_message WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(message_from_row).transpose()
    }

    pub async fn find_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<OutboundMessage>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM outbound_message
             WHERE provider_message_id = ?
             ORDER BY created_at ASC
             LIMIT 1"
        ))
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(message_from_row).transpose()
    }

    /// Oldest queued messages first.
    pub async fn list_queued(&self, limit: u32) -> Result<Vec<OutboundMessage>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM outbound_message
             WHERE status = 'QUEUED'
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    pub async fn list_for_lead(&self, lead_id: &LeadId) -> Result<Vec<OutboundMessage>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM outbound_message
             WHERE lead_id = ?
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    pub async fn mark_sent_guarded(
        conn: &mut SqliteConnection,
        id: &OutboundMessageId,
        provider: &str,
        provider_message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE outbound_message
             SET status = 'SENT', provider = ?, provider_message_id = ?, sent_at = ?
             WHERE id = ? AND status = 'QUEUED'",
        )
        .bind(provider)
        .bind(provider_message_id)
        .bind(ts(sent_at))
        .bind(&id.0)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_failed_guarded(
        conn: &mut SqliteConnection,
        id: &OutboundMessageId,
        provider: Option<&str>,
        reason: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE outbound_message
             SET status = 'FAILED', provider = COALESCE(?, provider), fail_reason = ?
             WHERE id = ? AND status = 'QUEUED'",
        )
        .bind(provider)
        .bind(reason)
        .bind(&id.0)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn stamp_delivered(
        conn: &mut SqliteConnection,
        id: &OutboundMessageId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE outbound_message SET delivered_at = ? WHERE id = ? AND delivered_at IS NULL",
        )
        .bind(ts(at))
        .bind(&id.0)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn stamp_read(
        conn: &mut SqliteConnection,
        id: &OutboundMessageId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE outbound_message SET read_at = ? WHERE id = ? AND read_at IS NULL")
                .bind(ts(at))
                .bind(&id.0)
                .execute(&mut *conn)
                .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn message_from_row(row: SqliteRow) -> Result<OutboundMessage, RepositoryError> {
    Ok(OutboundMessage {
        id: OutboundMessageId(row.try_get("id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        workspace_id: WorkspaceId(row.try_get("workspace_id")?),
        audience: decode_enum("audience", row.try_get("audience")?, Audience::parse)?,
        channel: decode_enum("channel", row.try_get("channel")?, Channel::parse)?,
        status: decode_enum("status", row.try_get("status")?, MessageStatus::parse)?,
        to_phone: row.try_get("to_phone")?,
        text: row.try_get("text")?,
        provider: row.try_get("provider")?,
        provider_message_id: row.try_get("provider_message_id")?,
        fail_reason: row.try_get("fail_reason")?,
        sent_at: parse_optional_timestamp("sent_at", row.try_get("sent_at")?)?,
        delivered_at: parse_optional_timestamp("delivered_at", row.try_get("delivered_at")?)?,
        read_at: parse_optional_timestamp("read_at", row.try_get("read_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use leadline_core::domain::ids::{LeadId, WorkspaceId};
    use leadline_core::domain::outbound::{Audience, MessageStatus, OutboundMessage};

    use super::SqlOutboundRepository;
    use crate::repositories::test_support::{insert_lead, insert_workspace, parse_ts, setup_pool};

    #[tokio::test]
    async fn queue_is_fifo_and_transitions_happen_once() {
        let pool = setup_pool().await;
        insert_workspace(&pool, "W-1").await;
        insert_lead(&pool, "W-1", "L-1").await;
        let repo = SqlOutboundRepository::new(pool.clone());
        let base = parse_ts("2026-03-02T09:00:00Z");

        let newer = OutboundMessage::queued(
            LeadId::from("L-1"),
            WorkspaceId::from("W-1"),
            Audience::Lead,
            Some("+15550100".to_owned()),
            "second",
            base + Duration::seconds(5),
        );
        let older = OutboundMessage::queued(
            LeadId::from("L-1"),
            WorkspaceId::from("W-1"),
            Audience::Lead,
            Some("+15550100".to_owned()),
            "first",
            base,
        );

        let mut conn = pool.acquire().await.expect("acquire");
        SqlOutboundRepository::insert(&mut conn, &newer).await.expect("insert");
        SqlOutboundRepository::insert(&mut conn, &older).await.expect("insert");
        drop(conn);

        let queued = repo.list_queued(10).await.expect("queued");
        assert_eq!(queued.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), vec!["first", "second"]);
        assert_eq!(repo.list_queued(1).await.expect("queued").len(), 1);

        let mut conn = pool.acquire().await.expect("acquire");
        let sent_at = base + Duration::seconds(10);
        assert!(SqlOutboundRepository::mark_sent_guarded(&mut conn, &older.id, "noop", "SM-1", sent_at)
            .await
            .expect("sent"));
        assert!(!SqlOutboundRepository::mark_failed_guarded(&mut conn, &older.id, None, "provider_error")
            .await
            .expect("late failure"));
        assert!(SqlOutboundRepository::stamp_delivered(&mut conn, &older.id, sent_at).await.expect("stamp"));
        assert!(!SqlOutboundRepository::stamp_delivered(&mut conn, &older.id, sent_at).await.expect("restamp"));
        drop(conn);

        let stored = repo.find_by_provider_message_id("SM-1").await.expect("find").expect("message");
        assert_eq!(stored.status, MessageStatus::Sent);
        assert_eq!(stored.sent_at, Some(sent_at));
        assert_eq!(stored.delivered_at, Some(sent_at));
        assert_eq!(repo.list_queued(10).await.expect("queued").len(), 1);

        pool.close().await;
    }
}
