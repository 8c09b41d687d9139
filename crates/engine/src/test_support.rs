use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadline_agent::LlmClient;
use leadline_core::autopilot::ChatMessage;
use leadline_core::dispatch::{DeliveryError, MessageProvider, ProviderReceipt};
use leadline_core::domain::autopilot::{AutopilotMode, AutopilotScenario, ScenarioType};
use leadline_core::domain::ids::{LeadId, ScenarioId, WorkspaceId};
use leadline_core::domain::lead::{Lead, LeadStatus};
use leadline_core::domain::workspace::{MemberRole, Workspace, WorkspaceMember};
use leadline_db::repositories::{SqlAutopilotRepository, SqlLeadRepository, SqlWorkspaceRepository};
use leadline_db::{connect_with_settings, migrations, DbPool};

pub async fn setup_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
    migrations::run_pending(&pool).await.expect("run migrations");
    pool
}

pub fn at(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
}

pub async fn seed_workspace(pool: &DbPool, id: &str) {
    SqlWorkspaceRepository::new(pool.clone())
        .save(&Workspace {
            id: WorkspaceId::from(id),
            name: "North Office".to_owned(),
            company_name: "Acme Realty".to_owned(),
            sla_minutes: 15,
            autopilot_enabled: true,
            created_at: at("2026-03-01T08:00:00Z"),
        })
        .await
        .expect("save workspace");
}

pub async fn seed_member(
    pool: &DbPool,
    workspace: &str,
    user_id: &str,
    role: MemberRole,
    phone: Option<&str>,
    is_available: bool,
) {
    SqlWorkspaceRepository::new(pool.clone())
        .save_member(&WorkspaceMember {
            workspace_id: WorkspaceId::from(workspace),
            user_id: user_id.to_owned(),
            display_name: user_id.to_owned(),
            role,
            phone: phone.map(str::to_owned),
            is_available,
        })
        .await
        .expect("save member");
}

pub async fn seed_lead(
    pool: &DbPool,
    workspace: &str,
    id: &str,
    phone: Option<&str>,
    owner: Option<&str>,
) -> Lead {
    let lead = Lead {
        id: LeadId::from(id),
        workspace_id: WorkspaceId::from(workspace),
        name: "Dana Buyer".to_owned(),
        phone: phone.map(str::to_owned),
        email: Some("dana@example.com".to_owned()),
        source: "website".to_owned(),
        status: LeadStatus::New,
        owner_user_id: owner.map(str::to_owned),
        created_at: at("2026-03-02T09:00:00Z"),
        updated_at: at("2026-03-02T09:00:00Z"),
    };
    let mut conn = pool.acquire().await.expect("acquire");
    SqlLeadRepository::insert(&mut conn, &lead).await.expect("insert lead");
    lead
}

pub async fn seed_scenario(
    pool: &DbPool,
    workspace: &str,
    id: &str,
    mode: AutopilotMode,
    max_questions: u32,
    is_default: bool,
) -> AutopilotScenario {
    let scenario = AutopilotScenario {
        id: ScenarioId::from(id),
        workspace_id: WorkspaceId::from(workspace),
        name: format!("{id} scenario"),
        scenario_type: ScenarioType::Qualification,
        mode,
        max_questions,
        is_default,
        ai_prompt: "You qualify leads for {{ company_name }}. Lead: {{ lead_name }}.".to_owned(),
        questions: vec![
            "Are you buying or renting?".to_owned(),
            "What is your budget?".to_owned(),
            "When do you want to move?".to_owned(),
        ],
    };
    SqlAutopilotRepository::new(pool.clone())
        .save_scenario(&scenario, at("2026-03-01T08:00:00Z"))
        .await
        .expect("save scenario");
    scenario
}

/// Provider that fails for listed destinations and records everything it sent.
#[derive(Default)]
pub struct FakeProvider {
    pub failing_phones: Vec<String>,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl FakeProvider {
    pub fn failing_for(phone: &str) -> Self {
        Self { failing_phones: vec![phone.to_owned()], ..Self::default() }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent lock").len()
    }
}

#[async_trait]
impl MessageProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send(&self, to_phone: &str, text: &str) -> Result<ProviderReceipt, DeliveryError> {
        if self.failing_phones.iter().any(|phone| phone == to_phone) {
            return Err(DeliveryError::Rejected(format!("{to_phone} is unreachable")));
        }
        let mut sent = self.sent.lock().expect("sent lock");
        sent.push((to_phone.to_owned(), text.to_owned()));
        Ok(ProviderReceipt {
            provider: "fake".to_owned(),
            provider_message_id: format!("fake-{}", sent.len()),
            sent_at: at("2026-03-02T09:05:00Z"),
        })
    }
}

/// Chat model that replays canned completions; `None` entries fail the call.
pub struct FakeLlm {
    replies: Mutex<VecDeque<Option<String>>>,
}

impl FakeLlm {
    pub fn new(replies: Vec<Option<&str>>) -> Self {
        Self { replies: Mutex::new(replies.into_iter().map(|reply| reply.map(str::to_owned)).collect()) }
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    fn name(&self) -> &str {
        "fake-llm"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        match self.replies.lock().expect("replies lock").pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(anyhow!("model unavailable")),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}
