//! The lead SLA engines wired over the datastore.
//!
//! Every entry point runs to completion on the caller's task; there is no background
//! scheduler. Periodic duties are driven from outside through [`Engine::run_maintenance`].

pub mod autopilot;
pub mod callbacks;
pub mod dispatch;
pub mod escalation;
pub mod leads;
pub mod maintenance;
mod notify;
pub mod outbox;
pub mod providers;
pub mod routing;
pub mod sla;
mod store;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use leadline_agent::{build_llm_client, DecisionRuntime, LlmClient, OutboundTextPolicy};
use leadline_core::config::AppConfig;
use leadline_core::dispatch::MessageProvider;
use leadline_core::errors::ApplicationError;
use leadline_db::DbPool;

pub use autopilot::{AutopilotEngine, DefaultScenarioChange, ReplyOutcome};
pub use callbacks::{CallbackOutcome, DeliveryCallbacks};
pub use dispatch::Dispatcher;
pub use escalation::EscalationEngine;
pub use leads::{IntakeOutcome, LeadService, ManualProofOutcome};
pub use maintenance::MaintenanceReport;
pub use outbox::Outbox;
pub use providers::{build_message_provider, NoopProvider, WebhookProvider};
pub use sla::SlaClock;

#[derive(Clone)]
pub struct Engine {
    pub sla: SlaClock,
    pub escalation: EscalationEngine,
    pub dispatcher: Dispatcher,
    pub outbox: Outbox,
    pub autopilot: AutopilotEngine,
    pub callbacks: DeliveryCallbacks,
    pub leads: LeadService,
    pool: DbPool,
    dispatch_batch_size: u32,
}

impl Engine {
    pub fn new(
        pool: DbPool,
        config: &AppConfig,
        provider: Arc<dyn MessageProvider>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        let policy = OutboundTextPolicy::default();
        let escalation = EscalationEngine::new(pool.clone(), config.escalation_thresholds());
        let confirmation_window = chrono::Duration::minutes(i64::from(
            config.autopilot.handover_confirmation_minutes,
        ));

        Self {
            sla: SlaClock::new(pool.clone()),
            dispatcher: Dispatcher::new(
                pool.clone(),
                provider,
                Duration::from_secs(config.messaging.send_timeout_secs.max(1)),
            ),
            outbox: Outbox::new(pool.clone(), policy.clone()),
            autopilot: AutopilotEngine::new(
                pool.clone(),
                llm.map(DecisionRuntime::new),
                confirmation_window,
                policy,
            ),
            callbacks: DeliveryCallbacks::new(pool.clone()),
            leads: LeadService::new(
                pool.clone(),
                escalation.clone(),
                config.sla.default_response_minutes,
            ),
            escalation,
            dispatch_batch_size: config.messaging.dispatch_batch_size,
            pool,
        }
    }

    /// Builds the configured messaging provider and LLM client, then the engines.
    pub fn from_config(pool: DbPool, config: &AppConfig) -> Result<Self, ApplicationError> {
        let provider = build_message_provider(&config.messaging)?;
        let llm = build_llm_client(&config.llm)
            .map_err(|error| ApplicationError::Configuration(format!("{error:#}")))?;
        Ok(Self::new(pool, config, provider, Some(llm)))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
