use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leadline_core::domain::ids::{LeadId, ProofEventId};
use leadline_core::domain::proof::{Channel, ProofEvent, ProofKey, ProofRecord, ProofType};

use super::{decode_enum, parse_timestamp, ts, RepositoryError};
use crate::DbPool;

pub struct SqlProofRepository {
    pool: DbPool,
}

impl SqlProofRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Records the proof, or returns the existing row for the same idempotency key with
    /// `reused = true`.
    pub async fn record(
        conn: &mut SqliteConnection,
        proof: &ProofEvent,
    ) -> Result<ProofRecord, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO proof_event (
                id, lead_id, channel, provider, provider_message_id, proof_type, occurred_at,
                is_manual
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(lead_id, channel, provider_message_id, proof_type) DO NOTHING",
        )
        .bind(&proof.id.0)
        .bind(&proof.lead_id.0)
        .bind(proof.channel.as_str())
        .bind(&proof.provider)
        .bind(&proof.provider_message_id)
        .bind(proof.proof_type.as_str())
        .bind(ts(proof.occurred_at))
        .bind(proof.is_manual)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(ProofRecord { proof_event_id: proof.id.clone(), reused: false });
        }

        let existing: String = sqlx::query_scalar(
            "SELECT id FROM proof_event
             WHERE lead_id = ? AND channel = ? AND provider_message_id = ? AND proof_type = ?",
        )
        .bind(&proof.lead_id.0)
        .bind(proof.channel.as_str())
        .bind(&proof.provider_message_id)
        .bind(proof.proof_type.as_str())
        .fetch_one(&mut *conn)
        .await?;

        Ok(ProofRecord { proof_event_id: ProofEventId(existing), reused: true })
    }

    pub async fn find_by_key(&self, key: &ProofKey) -> Result<Option<ProofEvent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, lead_id, channel, provider, provider_message_id, proof_type, occurred_at,
                    is_manual
             FROM proof_event
             WHERE lead_id = ? AND channel = ? AND provider_message_id = ? AND proof_type = ?",
        )
        .bind(&key.lead_id.0)
        .bind(key.channel.as_str())
        .bind(&key.provider_message_id)
        .bind(key.proof_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(proof_from_row).transpose()
    }

    pub async fn list_for_lead(&self, lead_id: &LeadId) -> Result<Vec<ProofEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, lead_id, channel, provider, provider_message_id, proof_type, occurred_at,
                    is_manual
             FROM proof_event
             WHERE lead_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(proof_from_row).collect()
    }
}

fn proof_from_row(row: SqliteRow) -> Result<ProofEvent, RepositoryError> {
    Ok(ProofEvent {
        id: ProofEventId(row.try_get("id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        channel: decode_enum("channel", row.try_get("channel")?, Channel::parse)?,
        provider: row.try_get("provider")?,
        provider_message_id: row.try_get("provider_message_id")?,
        proof_type: decode_enum("proof_type", row.try_get("proof_type")?, ProofType::parse)?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
        is_manual: row.try_get("is_manual")?,
    })
}
