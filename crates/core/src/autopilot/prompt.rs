use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

use crate::domain::autopilot::{AutopilotScenario, AutopilotState};
use crate::errors::DomainError;

/// One turn handed to the chat-completion service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// Variables available to scenario prompt templates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PromptVariables {
    pub workspace_name: String,
    pub company_name: String,
    pub lead_name: String,
    pub lead_source: String,
}

const DECISION_CONTRACT: &str = "Reply with a single JSON object and nothing else, shaped as \
{\"nextText\": string, \"intent\": string, \"answers\": {slot: value}, \
\"shouldHandover\": boolean, \"handoverReason\": string|null}. \
Keep nextText under 320 characters and ask one question at a time.";

pub fn render_scenario_prompt(
    scenario: &AutopilotScenario,
    variables: &PromptVariables,
    state: &AutopilotState,
) -> Result<String, DomainError> {
    let mut context = Context::new();
    context.insert("workspace_name", &variables.workspace_name);
    context.insert("company_name", &variables.company_name);
    context.insert("lead_name", &variables.lead_name);
    context.insert("lead_source", &variables.lead_source);
    context.insert("scenario_name", &scenario.name);
    context.insert("max_questions", &scenario.max_questions);
    context.insert("question_index", &state.question_index);
    context.insert("answers", &state.answers);

    Tera::one_off(&scenario.ai_prompt, &context, false).map_err(|error| {
        DomainError::Validation(format!(
            "prompt template for scenario `{}` failed to render: {error}",
            scenario.id
        ))
    })
}

/// System prompt, collected answers and the inbound reply, in that order.
pub fn build_decision_messages(
    scenario: &AutopilotScenario,
    variables: &PromptVariables,
    state: &AutopilotState,
    inbound_text: &str,
) -> Result<Vec<ChatMessage>, DomainError> {
    let rendered = render_scenario_prompt(scenario, variables, state)?;
    let mut messages = vec![ChatMessage::system(format!("{rendered}\n\n{DECISION_CONTRACT}"))];

    messages.push(ChatMessage::system(format!(
        "Conversation node: {}. Questions asked so far: {} of {}. Known answers: {}",
        state.node,
        state.question_index,
        scenario.max_questions,
        summarize_answers(&state.answers)
    )));
    messages.push(ChatMessage::user(inbound_text.trim()));
    Ok(messages)
}

fn summarize_answers(answers: &BTreeMap<String, String>) -> String {
    if answers.is_empty() {
        return "none".to_owned();
    }
    answers.iter().map(|(slot, value)| format!("{slot}={value}")).collect::<Vec<_>>().join("; ")
}
