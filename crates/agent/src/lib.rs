//! Chat-completion plumbing for autopilot conversations.
//!
//! - `llm`: the `LlmClient` seam plus HTTP clients for OpenAI-compatible and Anthropic back ends
//! - `runtime`: one bounded decision call, parsed as strict JSON
//! - `guardrails`: normalisation of any text about to be queued for a lead or agent
//!
//! The model only proposes the next message and the collected answers. Whether a run hands
//! over, and what gets persisted, is decided by `leadline_core::autopilot::advance`.

pub mod guardrails;
pub mod llm;
pub mod runtime;

pub use guardrails::{OutboundTextDecision, OutboundTextPolicy, OUTBOUND_TEXT_MAX_CHARS};
pub use llm::{build_llm_client, AnthropicClient, LlmClient, OpenAiCompatibleClient};
pub use runtime::{DecisionFailure, DecisionRuntime};
