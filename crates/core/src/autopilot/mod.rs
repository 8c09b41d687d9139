//! Pure reply state machine for autopilot conversations.
//!
//! The engine crate loads a run, asks this module what the next state is, and persists the
//! result with a guarded update. Nothing here touches storage or the network.

pub mod decision;
pub mod prompt;

use std::time::Duration;

use crate::domain::autopilot::{AutopilotScenario, AutopilotState, HANDOVER_NODE};

pub use decision::{parse_decision, AutopilotDecision, DecisionParseError};
pub use prompt::{
    build_decision_messages, render_scenario_prompt, ChatMessage, ChatRole, PromptVariables,
};

/// Upper bound on a single chat-completion call.
pub const AUTOPILOT_DECISION_TIMEOUT: Duration = Duration::from_secs(10);

/// Above this many runs a default-scenario change skips per-run audit events.
pub const MIGRATION_AUDIT_LIMIT: usize = 50;

pub const HANDOVER_MAX_QUESTIONS: &str = "max_questions_reached";
pub const HANDOVER_SCRIPT_COMPLETE: &str = "script_complete";
pub const HANDOVER_MODEL_REQUESTED: &str = "model_requested";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub state: AutopilotState,
    pub handover: bool,
    pub forced_handover: bool,
    pub handover_reason: Option<String>,
    pub outbound_text: Option<String>,
    pub intent: Option<String>,
}

/// Applies a decision to the current state.
///
/// Answers are merged, the question counter advances by one, and reaching
/// `max_questions` forces a handover whatever the decision said.
pub fn advance(
    scenario: &AutopilotScenario,
    state: &AutopilotState,
    decision: AutopilotDecision,
) -> StepOutcome {
    let mut next = state.clone();
    next.answers.extend(decision.answers);
    next.question_index = state.question_index.saturating_add(1);

    let forced_handover = next.question_index >= scenario.max_questions;
    let handover = decision.should_handover || forced_handover;

    let stated_reason = decision
        .handover_reason
        .filter(|reason| decision.should_handover && !reason.trim().is_empty());
    let handover_reason = match (handover, stated_reason) {
        (false, _) => None,
        (true, Some(reason)) => Some(reason),
        (true, None) if forced_handover => Some(HANDOVER_MAX_QUESTIONS.to_owned()),
        (true, None) => Some(HANDOVER_MODEL_REQUESTED.to_owned()),
    };

    next.node = if handover {
        HANDOVER_NODE.to_owned()
    } else {
        format!("question_{}", next.question_index)
    };

    let next_text = decision.next_text.trim();
    let outbound_text = (!handover && !next_text.is_empty()).then(|| next_text.to_owned());

    StepOutcome {
        state: next,
        handover,
        forced_handover: forced_handover && !decision.should_handover,
        handover_reason,
        outbound_text,
        intent: decision.intent,
    }
}

/// Decision for SCRIPTED scenarios: record the reply against the question that was asked
/// and move to the next scripted question.
pub fn scripted_decision(
    scenario: &AutopilotScenario,
    state: &AutopilotState,
    inbound_text: &str,
) -> AutopilotDecision {
    let asked = state.question_index as usize;
    let slot = match asked.checked_sub(1).and_then(|index| scenario.questions.get(index)) {
        Some(question) => question.clone(),
        None if asked == 0 => "opening".to_owned(),
        None => format!("reply_{asked}"),
    };

    let mut decision = AutopilotDecision {
        intent: Some("scripted".to_owned()),
        ..AutopilotDecision::default()
    };
    let reply = inbound_text.trim();
    if !reply.is_empty() {
        decision.answers.insert(slot, reply.to_owned());
    }

    match scenario.questions.get(asked) {
        Some(question) => decision.next_text = question.clone(),
        None => {
            decision.should_handover = true;
            decision.handover_reason = Some(HANDOVER_SCRIPT_COMPLETE.to_owned());
        }
    }
    decision
}
