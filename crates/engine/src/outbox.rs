use chrono::{DateTime, Utc};
use leadline_agent::OutboundTextPolicy;
use leadline_core::audit::{actors, event_types, LeadEvent};
use leadline_core::domain::ids::LeadId;
use leadline_core::domain::outbound::{Audience, OutboundMessage};
use leadline_core::errors::{ApplicationError, DomainError};
use leadline_db::repositories::{SqlLeadEventRepository, SqlLeadRepository, SqlOutboundRepository};
use leadline_db::DbPool;
use sqlx::SqliteConnection;

use crate::store::{begin, commit};

/// Entry point of the dispatch queue: everything sent to a lead or an agent is queued here.
#[derive(Clone)]
pub struct Outbox {
    pool: DbPool,
    policy: OutboundTextPolicy,
}

impl Outbox {
    pub fn new(pool: DbPool, policy: OutboundTextPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &OutboundTextPolicy {
        &self.policy
    }

    pub async fn enqueue_message(
        &self,
        lead_id: &LeadId,
        audience: Audience,
        to_phone: Option<String>,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<OutboundMessage, ApplicationError> {
        let text = self.policy.apply(text)?;
        let lead = SqlLeadRepository::new(self.pool.clone())
            .find(lead_id)
            .await?
            .ok_or_else(|| DomainError::not_found("lead", lead_id.as_str()))?;

        let message =
            OutboundMessage::queued(lead.id, lead.workspace_id, audience, to_phone, text, now);
        let mut tx = begin(&self.pool).await?;
        Self::enqueue_in(&mut tx, &message, actors::SYSTEM).await?;
        commit(tx).await?;
        Ok(message)
    }

    pub(crate) async fn enqueue_in(
        conn: &mut SqliteConnection,
        message: &OutboundMessage,
        actor: &str,
    ) -> Result<(), ApplicationError> {
        SqlOutboundRepository::insert(conn, message).await?;

        let event = LeadEvent::new(
            message.lead_id.clone(),
            message.workspace_id.clone(),
            event_types::MESSAGE_QUEUED,
            actor,
            message.created_at,
        )
        .with_metadata("outboundMessageId", message.id.as_str())
        .with_metadata("audience", message.audience.as_str())
        .with_metadata("hasDestination", message.destination().is_some());
        SqlLeadEventRepository::append(conn, &event).await?;
        Ok(())
    }
}
