//! Provider delivery-status callbacks (delivered / read).

use chrono::{DateTime, Utc};
use leadline_core::audit::{actors, event_types, LeadEvent};
use leadline_core::domain::ids::{OutboundMessageId, ProofEventId};
use leadline_core::domain::outbound::Audience;
use leadline_core::domain::proof::{ProofEvent, ProofType};
use leadline_core::domain::sla::StopReason;
use leadline_core::errors::{ApplicationError, DomainError};
use leadline_db::repositories::{SqlLeadEventRepository, SqlOutboundRepository, SqlProofRepository};
use leadline_db::DbPool;
use serde::Serialize;
use tracing::{debug, info};

use crate::sla::SlaClock;
use crate::store::{begin, commit};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackOutcome {
    pub proof_event_id: ProofEventId,
    pub outbound_message_id: OutboundMessageId,
    pub reused: bool,
    pub clock_stopped: bool,
}

#[derive(Clone)]
pub struct DeliveryCallbacks {
    pool: DbPool,
}

impl DeliveryCallbacks {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Records a delivery status reported by the provider.
    ///
    /// The proof idempotency key is (lead, channel, provider message id, type); a repeated
    /// callback returns the existing proof with `reused = true` and writes nothing else.
    pub async fn handle_delivery_status(
        &self,
        provider_message_id: &str,
        proof_type: ProofType,
        occurred_at: DateTime<Utc>,
    ) -> Result<CallbackOutcome, ApplicationError> {
        if proof_type == ProofType::Sent {
            return Err(DomainError::Validation(
                "status callbacks only accept DELIVERED or READ".to_owned(),
            )
            .into());
        }
        let provider_message_id = provider_message_id.trim();
        if provider_message_id.is_empty() {
            return Err(DomainError::Validation("providerMessageId is required".to_owned()).into());
        }

        let message = SqlOutboundRepository::new(self.pool.clone())
            .find_by_provider_message_id(provider_message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("outbound_message", provider_message_id))?;

        let proof = ProofEvent {
            id: ProofEventId::generate(),
            lead_id: message.lead_id.clone(),
            channel: message.channel,
            provider: message.provider.clone().unwrap_or_else(|| "unknown".to_owned()),
            provider_message_id: provider_message_id.to_owned(),
            proof_type,
            occurred_at,
            is_manual: false,
        };

        let mut tx = begin(&self.pool).await?;
        let record = SqlProofRepository::record(&mut tx, &proof).await?;
        if record.reused {
            commit(tx).await?;
            debug!(
                event_name = "callbacks.duplicate_status",
                lead_id = %message.lead_id,
                provider_message_id,
                proof_type = proof_type.as_str(),
                "duplicate delivery status ignored"
            );
            return Ok(CallbackOutcome {
                proof_event_id: record.proof_event_id,
                outbound_message_id: message.id,
                reused: true,
                clock_stopped: false,
            });
        }

        let event_type = if proof_type == ProofType::Read {
            SqlOutboundRepository::stamp_read(&mut tx, &message.id, occurred_at).await?;
            event_types::MESSAGE_READ
        } else {
            SqlOutboundRepository::stamp_delivered(&mut tx, &message.id, occurred_at).await?;
            event_types::MESSAGE_DELIVERED
        };

        let event = LeadEvent::new(
            message.lead_id.clone(),
            message.workspace_id.clone(),
            event_type,
            actors::PROVIDER,
            occurred_at,
        )
        .with_metadata("outboundMessageId", message.id.as_str())
        .with_metadata("providerMessageId", provider_message_id)
        .with_metadata("proofEventId", record.proof_event_id.as_str());
        SqlLeadEventRepository::append(&mut tx, &event).await?;

        let clock_stopped = if message.audience == Audience::Lead {
            SlaClock::stop_in(
                &mut tx,
                &message.lead_id,
                &message.workspace_id,
                &StopReason::DeliveryConfirmed,
                Some(&record.proof_event_id),
                occurred_at,
                actors::PROVIDER,
            )
            .await?
        } else {
            false
        };
        commit(tx).await?;

        info!(
            event_name = "callbacks.status_recorded",
            lead_id = %message.lead_id,
            workspace_id = %message.workspace_id,
            outbound_message_id = %message.id,
            proof_type = proof_type.as_str(),
            clock_stopped,
            "delivery status recorded"
        );
        Ok(CallbackOutcome {
            proof_event_id: record.proof_event_id,
            outbound_message_id: message.id,
            reused: false,
            clock_stopped,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;
    use leadline_agent::OutboundTextPolicy;
    use leadline_core::audit::event_types;
    use leadline_core::domain::ids::LeadId;
    use leadline_core::domain::outbound::Audience;
    use leadline_core::domain::proof::ProofType;
    use leadline_core::errors::{ApplicationError, DomainError};
    use leadline_db::repositories::{
        SqlLeadEventRepository, SqlOutboundRepository, SqlProofRepository, SqlSlaRepository,
    };

    use super::DeliveryCallbacks;
    use crate::dispatch::Dispatcher;
    use crate::outbox::Outbox;
    use crate::test_support::{at, seed_lead, seed_workspace, setup_pool, FakeProvider};
    use leadline_db::DbPool;

    async fn sent_message(pool: &DbPool, audience: Audience, with_clock: bool) -> LeadId {
        seed_workspace(pool, "W-1").await;
        seed_lead(pool, "W-1", "L-1", Some("+15550100"), None).await;
        let lead = LeadId::from("L-1");
        let start = at("2026-03-02T09:00:00Z");
        if with_clock {
            crate::sla::SlaClock::new(pool.clone())
                .start_clock(&lead, start + ChronoDuration::minutes(15), start)
                .await
                .expect("start");
        }
        Outbox::new(pool.clone(), OutboundTextPolicy::default())
            .enqueue_message(&lead, audience, Some("+15550100".into()), "Hi", start)
            .await
            .expect("queue");
        Dispatcher::new(pool.clone(), Arc::new(FakeProvider::default()), Duration::from_secs(5))
            .dispatch_queued(10, start)
            .await
            .expect("dispatch");
        lead
    }

    #[tokio::test]
    async fn duplicate_status_is_reused_and_records_once() {
        let pool = setup_pool().await;
        let lead = sent_message(&pool, Audience::Lead, true).await;
        let callbacks = DeliveryCallbacks::new(pool.clone());
        let delivered_at = at("2026-03-02T09:06:00Z");

        let first = callbacks
            .handle_delivery_status("fake-1", ProofType::Delivered, delivered_at)
            .await
            .expect("first callback");
        let second = callbacks
            .handle_delivery_status("fake-1", ProofType::Delivered, at("2026-03-02T09:07:00Z"))
            .await
            .expect("second callback");

        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.proof_event_id, second.proof_event_id);
        assert!(!second.clock_stopped);

        let proofs = SqlProofRepository::new(pool.clone()).list_for_lead(&lead).await.expect("proofs");
        let delivered =
            proofs.iter().filter(|proof| proof.proof_type == ProofType::Delivered).count();
        assert_eq!(delivered, 1);
        let events = SqlLeadEventRepository::new(pool.clone());
        assert_eq!(
            events.count_by_type(&lead, event_types::MESSAGE_DELIVERED).await.expect("count"),
            1
        );
        assert_eq!(events.count_by_type(&lead, event_types::SLA_STOPPED).await.expect("count"), 1);
        let message = SqlOutboundRepository::new(pool.clone())
            .find_by_provider_message_id("fake-1")
            .await
            .expect("find")
            .expect("message");
        assert_eq!(message.delivered_at, Some(delivered_at));
    }

    #[tokio::test]
    async fn delivery_stops_clock_when_send_did_not() {
        let pool = setup_pool().await;
        let lead = sent_message(&pool, Audience::Lead, false).await;
        let start = at("2026-03-02T09:00:00Z");
        crate::sla::SlaClock::new(pool.clone())
            .start_clock(&lead, start + ChronoDuration::minutes(15), start)
            .await
            .expect("start");

        let outcome = DeliveryCallbacks::new(pool.clone())
            .handle_delivery_status("fake-1", ProofType::Read, at("2026-03-02T09:06:00Z"))
            .await
            .expect("callback");

        assert!(outcome.clock_stopped);
        let state = SqlSlaRepository::new(pool.clone())
            .find_by_lead(&lead)
            .await
            .expect("find")
            .expect("state");
        assert_eq!(state.stop_proof_event_id, Some(outcome.proof_event_id));
    }

    #[tokio::test]
    async fn unknown_message_and_sent_type_are_rejected() {
        let pool = setup_pool().await;
        let callbacks = DeliveryCallbacks::new(pool.clone());
        let now = at("2026-03-02T09:06:00Z");

        let missing = callbacks
            .handle_delivery_status("nope", ProofType::Delivered, now)
            .await
            .expect_err("unknown id");
        assert!(matches!(
            missing,
            ApplicationError::Domain(DomainError::NotFound { entity: "outbound_message", .. })
        ));

        let sent = callbacks
            .handle_delivery_status("fake-1", ProofType::Sent, now)
            .await
            .expect_err("sent type");
        assert!(matches!(sent, ApplicationError::Domain(DomainError::Validation(_))));
    }
}
