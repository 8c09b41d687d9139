use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Structured answer expected from the chat-completion service for one inbound reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotDecision {
    pub next_text: String,
    pub intent: Option<String>,
    pub answers: BTreeMap<String, String>,
    pub should_handover: bool,
    pub handover_reason: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecisionParseError {
    #[error("decision is not valid json: {0}")]
    NotJson(String),
    #[error("decision must be a json object")]
    NotAnObject,
    #[error("decision field `{field}` has the wrong type")]
    WrongType { field: &'static str },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDecision {
    #[serde(default)]
    next_text: Option<Value>,
    #[serde(default)]
    intent: Option<Value>,
    #[serde(default)]
    answers: Option<Value>,
    #[serde(default)]
    should_handover: Option<Value>,
    #[serde(default)]
    handover_reason: Option<Value>,
}

/// Parses raw completion text into a decision.
///
/// The body must be a single JSON object; a surrounding markdown code fence is tolerated.
/// Answer values may be strings, numbers or booleans and are stored as strings; `null`
/// answers are dropped.
pub fn parse_decision(raw: &str) -> Result<AutopilotDecision, DecisionParseError> {
    let body = strip_code_fence(raw.trim());
    let value: Value =
        serde_json::from_str(body).map_err(|error| DecisionParseError::NotJson(error.to_string()))?;
    if !value.is_object() {
        return Err(DecisionParseError::NotAnObject);
    }
    let raw: RawDecision = serde_json::from_value(value)
        .map_err(|error| DecisionParseError::NotJson(error.to_string()))?;

    let next_text = optional_string(raw.next_text, "nextText")?.unwrap_or_default();
    let intent = optional_string(raw.intent, "intent")?;
    let handover_reason = optional_string(raw.handover_reason, "handoverReason")?;
    let should_handover = match raw.should_handover {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => flag,
        Some(_) => return Err(DecisionParseError::WrongType { field: "shouldHandover" }),
    };

    let mut answers = BTreeMap::new();
    match raw.answers {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (slot, value) in map {
                let rendered = match value {
                    Value::Null => continue,
                    Value::String(text) => text,
                    Value::Bool(flag) => flag.to_string(),
                    Value::Number(number) => number.to_string(),
                    Value::Array(_) | Value::Object(_) => {
                        return Err(DecisionParseError::WrongType { field: "answers" })
                    }
                };
                answers.insert(slot, rendered);
            }
        }
        Some(_) => return Err(DecisionParseError::WrongType { field: "answers" }),
    }

    Ok(AutopilotDecision { next_text, intent, answers, should_handover, handover_reason })
}

fn optional_string(
    value: Option<Value>,
    field: &'static str,
) -> Result<Option<String>, DecisionParseError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(_) => Err(DecisionParseError::WrongType { field }),
    }
}

fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::{parse_decision, DecisionParseError};

    #[test]
    fn parses_full_decision_and_stringifies_scalar_answers() {
        let decision = parse_decision(
            r#"{"nextText":"When would you like to move?","intent":"qualify",
                "answers":{"budget":450000,"preapproved":true,"city":"Austin","note":null},
                "shouldHandover":false,"handoverReason":null}"#,
        )
        .expect("decision");

        assert_eq!(decision.next_text, "When would you like to move?");
        assert_eq!(decision.intent.as_deref(), Some("qualify"));
        assert_eq!(decision.answers.get("budget").map(String::as_str), Some("450000"));
        assert_eq!(decision.answers.get("preapproved").map(String::as_str), Some("true"));
        assert!(!decision.answers.contains_key("note"));
        assert!(!decision.should_handover);
    }

    #[test]
    fn tolerates_fenced_json() {
        let decision = parse_decision("```json\n{\"shouldHandover\":true}\n```").expect("decision");
        assert!(decision.should_handover);
        assert!(decision.next_text.is_empty());
    }

    #[test]
    fn rejects_prose_and_wrong_types() {
        assert!(matches!(
            parse_decision("Sure! Here is my answer."),
            Err(DecisionParseError::NotJson(_))
        ));
        assert_eq!(parse_decision("[1,2]"), Err(DecisionParseError::NotAnObject));
        assert_eq!(
            parse_decision(r#"{"shouldHandover":"yes"}"#),
            Err(DecisionParseError::WrongType { field: "shouldHandover" })
        );
        assert_eq!(
            parse_decision(r#"{"answers":{"rooms":[1,2]}}"#),
            Err(DecisionParseError::WrongType { field: "answers" })
        );
    }
}
