use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leadline_core::domain::ids::{LeadId, OutboundMessageId, PendingReplyId, WorkspaceId};
use leadline_core::domain::pending_reply::{
    PendingAgentReply, PendingReplyStatus, PendingReplyType,
};

use super::{decode_enum, parse_timestamp, ts, RepositoryError};
use crate::DbPool;

pub struct SqlPendingReplyRepository {
    pool: DbPool,
}

impl SqlPendingReplyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        reply: &PendingAgentReply,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO pending_agent_reply (
                id, lead_id, workspace_id, user_id, reply_type, status, outbound_message_id,
                expires_at, reply_value, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&reply.id.0)
        .bind(&reply.lead_id.0)
        .bind(&reply.workspace_id.0)
        .bind(&reply.user_id)
        .bind(reply.reply_type.as_str())
        .bind(reply.status.as_str())
        .bind(reply.outbound_message_id.as_ref().map(|id| id.0.as_str()))
        .bind(ts(reply.expires_at))
        .bind(reply.reply_value.as_deref())
        .bind(ts(reply.created_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn list_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<PendingAgentReply>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, lead_id, workspace_id, user_id, reply_type, status, outbound_message_id,
                    expires_at, reply_value, created_at
             FROM pending_agent_reply
             WHERE lead_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(reply_from_row).collect()
    }

    /// Flips overdue PENDING prompts to EXPIRED; returns how many changed.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE pending_agent_reply SET status = 'EXPIRED'
             WHERE status = 'PENDING' AND expires_at <= ?",
        )
        .bind(ts(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn reply_from_row(row: SqliteRow) -> Result<PendingAgentReply, RepositoryError> {
    Ok(PendingAgentReply {
        id: PendingReplyId(row.try_get("id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        workspace_id: WorkspaceId(row.try_get("workspace_id")?),
        user_id: row.try_get("user_id")?,
        reply_type: decode_enum("reply_type", row.try_get("reply_type")?, PendingReplyType::parse)?,
        status: decode_enum("status", row.try_get("status")?, PendingReplyStatus::parse)?,
        outbound_message_id: row
            .try_get::<Option<String>, _>("outbound_message_id")?
            .map(OutboundMessageId),
        expires_at: parse_timestamp("expires_at", row.try_get("expires_at")?)?,
        reply_value: row.try_get("reply_value")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
