use std::sync::Arc;
use std::time::Duration;

use leadline_core::autopilot::{
    parse_decision, AutopilotDecision, ChatMessage, DecisionParseError, AUTOPILOT_DECISION_TIMEOUT,
};
use thiserror::Error;

use crate::llm::LlmClient;

#[derive(Debug, Error)]
pub enum DecisionFailure {
    #[error("decision call timed out after {0} ms")]
    Timeout(u128),
    #[error("completion failed: {0}")]
    Completion(String),
    #[error("malformed decision: {0}")]
    Malformed(#[from] DecisionParseError),
}

impl DecisionFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "ai_timeout",
            Self::Completion(_) => "ai_error",
            Self::Malformed(_) => "ai_malformed_response",
        }
    }
}

/// Asks the model for the next autopilot step within a fixed time budget.
#[derive(Clone)]
pub struct DecisionRuntime {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl DecisionRuntime {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client, timeout: AUTOPILOT_DECISION_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.client.name()
    }

    pub async fn decide(
        &self,
        messages: &[ChatMessage],
    ) -> Result<AutopilotDecision, DecisionFailure> {
        let raw = tokio::time::timeout(self.timeout, self.client.complete(messages))
            .await
            .map_err(|_| DecisionFailure::Timeout(self.timeout.as_millis()))?
            .map_err(|error| DecisionFailure::Completion(format!("{error:#}")))?;

        Ok(parse_decision(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use leadline_core::autopilot::ChatMessage;

    use super::{DecisionFailure, DecisionRuntime};
    use crate::llm::LlmClient;

    enum Script {
        Reply(&'static str),
        Fail,
        Hang,
    }

    struct ScriptedLlm(Script);

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            match self.0 {
                Script::Reply(raw) => Ok(raw.to_owned()),
                Script::Fail => Err(anyhow!("upstream 502")),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok("{}".to_owned())
                }
            }
        }
    }

    fn runtime(script: Script) -> DecisionRuntime {
        DecisionRuntime::new(Arc::new(ScriptedLlm(script)))
    }

    #[tokio::test]
    async fn parses_structured_decision() {
        let decision = runtime(Script::Reply(
            r#"{"nextText":"What is your budget?","intent":"buy","answers":{"goal":"buy"},"shouldHandover":false}"#,
        ))
        .decide(&[ChatMessage::user("I want to buy")])
        .await
        .expect("decision");

        assert_eq!(decision.next_text, "What is your budget?");
        assert_eq!(decision.answers.get("goal").map(String::as_str), Some("buy"));
        assert!(!decision.should_handover);
    }

    #[tokio::test]
    async fn non_json_reply_is_malformed() {
        let failure = runtime(Script::Reply("Sure! What is your budget?"))
            .decide(&[ChatMessage::user("hi")])
            .await
            .expect_err("prose is not a decision");

        assert_eq!(failure.code(), "ai_malformed_response");
    }

    #[tokio::test]
    async fn upstream_error_is_reported() {
        let failure = runtime(Script::Fail)
            .decide(&[ChatMessage::user("hi")])
            .await
            .expect_err("upstream failure");

        assert!(matches!(failure, DecisionFailure::Completion(ref message) if message.contains("502")));
    }

    #[tokio::test]
    async fn slow_completion_times_out() {
        let failure = runtime(Script::Hang)
            .with_timeout(Duration::from_millis(20))
            .decide(&[ChatMessage::user("hi")])
            .await
            .expect_err("timeout");

        assert_eq!(failure.code(), "ai_timeout");
    }
}
