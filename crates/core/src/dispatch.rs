use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider acknowledgement for one accepted message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReceipt {
    pub provider: String,
    pub provider_message_id: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("provider rejected message: {0}")]
    Rejected(String),
    #[error("provider transport failure: {0}")]
    Transport(String),
    #[error("provider did not answer within {0} seconds")]
    Timeout(u64),
    #[error("provider response was malformed: {0}")]
    MalformedResponse(String),
}

/// Outbound text-message gateway used by the dispatch queue.
#[async_trait]
pub trait MessageProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, to_phone: &str, text: &str) -> Result<ProviderReceipt, DeliveryError>;
}
