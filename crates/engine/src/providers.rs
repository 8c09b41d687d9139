//! Messaging providers behind `MessageProvider`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use leadline_core::config::{MessagingConfig, MessagingProvider};
use leadline_core::dispatch::{DeliveryError, MessageProvider, ProviderReceipt};
use leadline_core::errors::ApplicationError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::info;

/// Accepts every message without sending anything. Development default.
#[derive(Debug, Default)]
pub struct NoopProvider {
    sequence: AtomicU64,
}

#[async_trait]
impl MessageProvider for NoopProvider {
    fn name(&self) -> &str {
        "noop"
    }

    async fn send(&self, to_phone: &str, text: &str) -> Result<ProviderReceipt, DeliveryError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            event_name = "provider.noop_send",
            to_phone,
            chars = text.chars().count(),
            "noop provider accepted message"
        );
        Ok(ProviderReceipt {
            provider: "noop".to_owned(),
            provider_message_id: format!("noop-{sequence}"),
            sent_at: Utc::now(),
        })
    }
}

/// Posts `{"to", "text"}` to a gateway URL and expects `{"messageId": ...}` back.
pub struct WebhookProvider {
    http: Client,
    url: String,
    auth_token: Option<SecretString>,
}

impl WebhookProvider {
    pub fn new(http: Client, url: impl Into<String>, auth_token: Option<SecretString>) -> Self {
        Self { http, url: url.into(), auth_token }
    }
}

#[async_trait]
impl MessageProvider for WebhookProvider {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, to_phone: &str, text: &str) -> Result<ProviderReceipt, DeliveryError> {
        let mut request = self.http.post(&self.url).json(&json!({ "to": to_phone, "text": text }));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                DeliveryError::Timeout(0)
            } else {
                DeliveryError::Transport(error.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected(format!("{status}: {}", body.trim())));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|error| DeliveryError::MalformedResponse(error.to_string()))?;

        Ok(ProviderReceipt {
            provider: "webhook".to_owned(),
            provider_message_id: receipt_message_id(&body)?,
            sent_at: Utc::now(),
        })
    }
}

fn receipt_message_id(body: &Value) -> Result<String, DeliveryError> {
    match body.get("messageId") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_owned()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(DeliveryError::MalformedResponse(
            "response has no usable `messageId`".to_owned(),
        )),
    }
}

pub fn build_message_provider(
    config: &MessagingConfig,
) -> Result<Arc<dyn MessageProvider>, ApplicationError> {
    match config.provider {
        MessagingProvider::Noop => Ok(Arc::new(NoopProvider::default())),
        MessagingProvider::Webhook => {
            let url = config
                .webhook_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    ApplicationError::Configuration(
                        "messaging.webhook_url is required for the webhook provider".to_owned(),
                    )
                })?;
            let http = Client::builder()
                .timeout(Duration::from_secs(config.send_timeout_secs.max(1)))
                .build()
                .map_err(|error| {
                    ApplicationError::Configuration(format!("failed to build webhook client: {error}"))
                })?;
            Ok(Arc::new(WebhookProvider::new(http, url, config.auth_token.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use leadline_core::config::{MessagingConfig, MessagingProvider};
    use leadline_core::dispatch::{DeliveryError, MessageProvider};
    use leadline_core::errors::ApplicationError;
    use serde_json::json;

    use super::{build_message_provider, receipt_message_id, NoopProvider};

    fn messaging(provider: MessagingProvider, webhook_url: Option<&str>) -> MessagingConfig {
        MessagingConfig {
            provider,
            webhook_url: webhook_url.map(str::to_owned),
            auth_token: None,
            callback_secret: None,
            send_timeout_secs: 5,
            dispatch_batch_size: 50,
        }
    }

    #[tokio::test]
    async fn noop_provider_issues_distinct_ids() {
        let provider = NoopProvider::default();
        let first = provider.send("+15550100", "Hi").await.expect("first");
        let second = provider.send("+15550100", "Hi again").await.expect("second");

        assert_eq!(first.provider, "noop");
        assert_eq!(first.provider_message_id, "noop-1");
        assert_eq!(second.provider_message_id, "noop-2");
    }

    #[test]
    fn webhook_requires_url() {
        let missing = build_message_provider(&messaging(MessagingProvider::Webhook, Some("  ")));
        assert!(matches!(missing, Err(ApplicationError::Configuration(_))));

        let built = build_message_provider(&messaging(
            MessagingProvider::Webhook,
            Some("https://sms.example.com/send"),
        ))
        .expect("webhook provider");
        assert_eq!(built.name(), "webhook");
    }

    #[test]
    fn receipt_needs_message_id() {
        assert_eq!(receipt_message_id(&json!({"messageId": "gw-42"})).expect("string id"), "gw-42");
        assert_eq!(receipt_message_id(&json!({"messageId": 42})).expect("numeric id"), "42");
        assert!(matches!(
            receipt_message_id(&json!({"status": "ok"})),
            Err(DeliveryError::MalformedResponse(_))
        ));
    }
}
