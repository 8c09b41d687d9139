//! Outbound dispatch queue.
//!
//! Each queued message gets at most one delivery attempt. The provider call happens outside
//! any transaction; the QUEUED -> SENT/FAILED transition that follows is guarded on the
//! QUEUED status, so a message processed by two dispatchers is counted once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use leadline_core::audit::{actors, event_types, LeadEvent};
use leadline_core::dispatch::{DeliveryError, MessageProvider, ProviderReceipt};
use leadline_core::domain::ids::ProofEventId;
use leadline_core::domain::lead::LeadStatus;
use leadline_core::domain::outbound::{
    Audience, DispatchSummary, OutboundMessage, FAIL_REASON_MISSING_PHONE,
    FAIL_REASON_PROVIDER_ERROR,
};
use leadline_core::domain::proof::{ProofEvent, ProofType};
use leadline_core::domain::sla::StopReason;
use leadline_core::errors::ApplicationError;
use leadline_db::repositories::{
    SqlLeadEventRepository, SqlLeadRepository, SqlOutboundRepository, SqlProofRepository,
};
use leadline_db::DbPool;
use tracing::{info, warn};

use crate::sla::SlaClock;
use crate::store::{begin, commit};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Attempt {
    Sent,
    Failed,
    Skipped,
}

#[derive(Clone)]
pub struct Dispatcher {
    pool: DbPool,
    provider: Arc<dyn MessageProvider>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(pool: DbPool, provider: Arc<dyn MessageProvider>, send_timeout: Duration) -> Self {
        Self { pool, provider, send_timeout }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Drains up to `limit` queued messages, oldest first.
    pub async fn dispatch_queued(
        &self,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<DispatchSummary, ApplicationError> {
        let queued = SqlOutboundRepository::new(self.pool.clone()).list_queued(limit).await?;
        let mut summary = DispatchSummary::default();

        for message in queued {
            summary.processed += 1;
            match self.attempt(&message, now).await {
                Ok(Attempt::Sent) => summary.sent += 1,
                Ok(Attempt::Failed) => summary.failed += 1,
                Ok(Attempt::Skipped) => summary.skipped += 1,
                Err(error) => {
                    warn!(
                        event_name = "dispatch.attempt_not_recorded",
                        message_id = %message.id,
                        lead_id = %message.lead_id,
                        workspace_id = %message.workspace_id,
                        error = %error,
                        "dispatch outcome could not be recorded"
                    );
                    summary.skipped += 1;
                }
            }
        }

        if summary.processed > 0 {
            info!(
                event_name = "dispatch.batch_completed",
                provider = self.provider.name(),
                processed = summary.processed,
                sent = summary.sent,
                failed = summary.failed,
                skipped = summary.skipped,
                "dispatch batch completed"
            );
        }
        Ok(summary)
    }

    async fn attempt(
        &self,
        message: &OutboundMessage,
        now: DateTime<Utc>,
    ) -> Result<Attempt, ApplicationError> {
        let Some(to_phone) = message.destination() else {
            return self.fail(message, None, FAIL_REASON_MISSING_PHONE, None, now).await;
        };

        let sent = tokio::time::timeout(self.send_timeout, self.provider.send(to_phone, &message.text))
            .await
            .unwrap_or(Err(DeliveryError::Timeout(self.send_timeout.as_secs())));

        match sent {
            Ok(receipt) => self.confirm(message, receipt).await,
            Err(error) => {
                self.fail(
                    message,
                    Some(self.provider.name()),
                    FAIL_REASON_PROVIDER_ERROR,
                    Some(error.to_string()),
                    now,
                )
                .await
            }
        }
    }

    async fn confirm(
        &self,
        message: &OutboundMessage,
        receipt: ProviderReceipt,
    ) -> Result<Attempt, ApplicationError> {
        let mut tx = begin(&self.pool).await?;
        if !SqlOutboundRepository::mark_sent_guarded(
            &mut tx,
            &message.id,
            &receipt.provider,
            &receipt.provider_message_id,
            receipt.sent_at,
        )
        .await?
        {
            return Ok(Attempt::Skipped);
        }

        let proof = ProofEvent {
            id: ProofEventId::generate(),
            lead_id: message.lead_id.clone(),
            channel: message.channel,
            provider: receipt.provider.clone(),
            provider_message_id: receipt.provider_message_id.clone(),
            proof_type: ProofType::Sent,
            occurred_at: receipt.sent_at,
            is_manual: false,
        };
        let record = SqlProofRepository::record(&mut tx, &proof).await?;

        let event = LeadEvent::new(
            message.lead_id.clone(),
            message.workspace_id.clone(),
            event_types::MESSAGE_SENT,
            actors::DISPATCHER,
            receipt.sent_at,
        )
        .with_metadata("outboundMessageId", message.id.as_str())
        .with_metadata("audience", message.audience.as_str())
        .with_metadata("provider", receipt.provider.clone())
        .with_metadata("providerMessageId", receipt.provider_message_id.clone())
        .with_metadata("proofEventId", record.proof_event_id.as_str());
        SqlLeadEventRepository::append(&mut tx, &event).await?;

        if message.audience == Audience::Lead {
            SlaClock::stop_in(
                &mut tx,
                &message.lead_id,
                &message.workspace_id,
                &StopReason::MessageSent,
                Some(&record.proof_event_id),
                receipt.sent_at,
                actors::DISPATCHER,
            )
            .await?;
            SqlLeadRepository::transition_status(
                &mut tx,
                &message.lead_id,
                LeadStatus::New,
                LeadStatus::Open,
                receipt.sent_at,
            )
            .await?;
        }
        commit(tx).await?;

        info!(
            event_name = "dispatch.message_sent",
            lead_id = %message.lead_id,
            workspace_id = %message.workspace_id,
            outbound_message_id = %message.id,
            provider = %receipt.provider,
            "outbound message sent"
        );
        Ok(Attempt::Sent)
    }

    async fn fail(
        &self,
        message: &OutboundMessage,
        provider: Option<&str>,
        reason: &str,
        detail: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Attempt, ApplicationError> {
        let mut tx = begin(&self.pool).await?;
        if !SqlOutboundRepository::mark_failed_guarded(&mut tx, &message.id, provider, reason).await? {
            return Ok(Attempt::Skipped);
        }

        let mut event = LeadEvent::new(
            message.lead_id.clone(),
            message.workspace_id.clone(),
            event_types::MESSAGE_FAILED,
            actors::DISPATCHER,
            now,
        )
        .with_metadata("outboundMessageId", message.id.as_str())
        .with_metadata("reason", reason);
        if let Some(detail) = &detail {
            event = event.with_metadata("error", detail.clone());
        }
        SqlLeadEventRepository::append(&mut tx, &event).await?;
        commit(tx).await?;

        warn!(
            event_name = "dispatch.message_failed",
            lead_id = %message.lead_id,
            workspace_id = %message.workspace_id,
            outbound_message_id = %message.id,
            reason,
            error = detail.as_deref().unwrap_or(""),
            "outbound message failed"
        );
        Ok(Attempt::Failed)
    }
}
