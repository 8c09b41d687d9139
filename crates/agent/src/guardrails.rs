use leadline_core::errors::DomainError;

/// SMS-friendly cap on a single outbound message.
pub const OUTBOUND_TEXT_MAX_CHARS: usize = 640;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundTextDecision {
    Allow(String),
    Truncate { text: String, original_chars: usize },
    Deny { reason_code: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundTextPolicy {
    pub max_chars: usize,
}

impl Default for OutboundTextPolicy {
    fn default() -> Self {
        Self { max_chars: OUTBOUND_TEXT_MAX_CHARS }
    }
}

impl OutboundTextPolicy {
    pub fn evaluate(&self, raw: &str) -> OutboundTextDecision {
        let text = raw.trim();
        if text.is_empty() {
            return OutboundTextDecision::Deny { reason_code: "empty_text" };
        }

        let original_chars = text.chars().count();
        if original_chars <= self.max_chars {
            return OutboundTextDecision::Allow(text.to_owned());
        }

        let truncated: String = text.chars().take(self.max_chars).collect();
        OutboundTextDecision::Truncate { text: truncated.trim_end().to_owned(), original_chars }
    }

    /// Text ready to be stored on a queued message.
    pub fn apply(&self, raw: &str) -> Result<String, DomainError> {
        match self.evaluate(raw) {
            OutboundTextDecision::Allow(text) => Ok(text),
            OutboundTextDecision::Truncate { text, original_chars } => {
                tracing::debug!(
                    event_name = "guardrail.outbound_text_truncated",
                    original_chars,
                    max_chars = self.max_chars,
                    "outbound text truncated"
                );
                Ok(text)
            }
            OutboundTextDecision::Deny { reason_code } => Err(DomainError::Validation(format!(
                "outbound text rejected: {reason_code}"
            ))),
        }
    }
}
