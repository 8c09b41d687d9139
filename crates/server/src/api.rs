//! JSON surface under `/api/v1`.
//!
//! Callers identify themselves through `x-workspace-id`, `x-user-id` and `x-role`. Every
//! lead lookup is scoped to that workspace, so a lead from another workspace answers 404.

use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use leadline_core::audit::LeadEvent;
use leadline_core::config::AppConfig;
use leadline_core::domain::autopilot::AutopilotRun;
use leadline_core::domain::ids::{AutopilotRunId, LeadId, ScenarioId, WorkspaceId};
use leadline_core::domain::lead::{Lead, LeadIntake, LeadStatus};
use leadline_core::domain::proof::{Channel, ProofType};
use leadline_core::domain::sla::{StopOutcome, StopReason};
use leadline_core::domain::workspace::{MemberRole, RequestContext};
use leadline_core::errors::{ApplicationError, DomainError, InterfaceError};
use leadline_core::signature::{secrets_match, verify_signature, SIGNATURE_HEADER};
use leadline_engine::{
    CallbackOutcome, DefaultScenarioChange, Engine, IntakeOutcome, MaintenanceReport,
    ManualProofOutcome, ReplyOutcome,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const WORKSPACE_HEADER: &str = "x-workspace-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-role";
pub const MAINTENANCE_TOKEN_HEADER: &str = "x-maintenance-token";

#[derive(Clone)]
pub struct ApiState {
    engine: Engine,
    callback_secret: Option<SecretString>,
    maintenance_token: Option<SecretString>,
}

impl ApiState {
    pub fn new(engine: Engine, config: &AppConfig) -> Self {
        Self::with_secrets(
            engine,
            config.messaging.callback_secret.clone(),
            config.server.maintenance_token.clone(),
        )
    }

    pub fn with_secrets(
        engine: Engine,
        callback_secret: Option<SecretString>,
        maintenance_token: Option<SecretString>,
    ) -> Self {
        Self { engine, callback_secret, maintenance_token }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/leads", post(create_lead).get(list_leads))
        .route("/api/v1/leads/{id}", get(get_lead))
        .route("/api/v1/leads/{id}/events", get(list_lead_events))
        .route("/api/v1/leads/{id}/proof", post(record_manual_proof))
        .route("/api/v1/leads/{id}/sla/stop", post(stop_clock))
        .route("/api/v1/leads/{id}/autopilot", post(start_autopilot))
        .route("/api/v1/leads/{id}/autopilot/reply", post(process_reply))
        .route("/api/v1/autopilot/runs/{id}/switch", post(switch_scenario))
        .route("/api/v1/autopilot/scenarios/{id}/default", post(set_default_scenario))
        .route("/api/v1/messages/callbacks/status", post(delivery_status))
        .route("/api/v1/maintenance/sweep", post(maintenance_sweep))
        .with_state(state)
}

/// Error body: `{"error": {code, message, detail, correlationId}}`.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn new(error: impl Into<ApplicationError>, correlation_id: &str) -> Self {
        Self(error.into().into_interface(correlation_id))
    }

    fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(
            event_name = "api.request_failed",
            correlation_id = %self.0.correlation_id(),
            status = status.as_u16(),
            code = self.0.code(),
            error = %self.0,
            "api request failed"
        );
        let body = json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.user_message(),
                "detail": self.0.to_string(),
                "correlationId": self.0.correlation_id(),
            }
        });
        (status, Json(body)).into_response()
    }
}

fn correlation_id(headers: &HeaderMap) -> String {
    header_value(headers, CORRELATION_HEADER)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4().simple()))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Caller identity taken from the request headers.
pub struct Identity {
    pub ctx: RequestContext,
    pub correlation_id: String,
}

impl Identity {
    fn fail(&self, error: impl Into<ApplicationError>) -> ApiError {
        ApiError::new(error, &self.correlation_id)
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(&parts.headers);
        let (Some(workspace_id), Some(user_id), Some(role)) = (
            header_value(&parts.headers, WORKSPACE_HEADER),
            header_value(&parts.headers, USER_HEADER),
            header_value(&parts.headers, ROLE_HEADER),
        ) else {
            return Err(ApiError::new(
                DomainError::AccessDenied(format!(
                    "{WORKSPACE_HEADER}, {USER_HEADER} and {ROLE_HEADER} headers are required"
                )),
                &correlation_id,
            ));
        };
        let Some(role) = MemberRole::parse(role) else {
            return Err(ApiError::new(
                DomainError::AccessDenied(format!("unknown role `{role}`")),
                &correlation_id,
            ));
        };

        Ok(Self {
            ctx: RequestContext::new(WorkspaceId::from(workspace_id), user_id, role),
            correlation_id,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLeadRequest {
    name: String,
    phone: Option<String>,
    email: Option<String>,
    source: Option<String>,
    owner_user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListLeadsQuery {
    status: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ManualProofRequest {
    channel: String,
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StopClockRequest {
    reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartAutopilotRequest {
    scenario_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchScenarioRequest {
    scenario_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusCallbackRequest {
    provider_message_id: String,
    #[serde(rename = "type")]
    status_type: String,
    occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct SweepQuery {
    limit: Option<u32>,
}

async fn create_lead(
    State(state): State<ApiState>,
    identity: Identity,
    Json(request): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<IntakeOutcome>), ApiError> {
    let intake = LeadIntake {
        name: request.name,
        phone: request.phone,
        email: request.email,
        source: request.source,
        owner_user_id: request.owner_user_id,
    };
    let outcome = state
        .engine
        .leads
        .intake_lead(&identity.ctx, intake, Utc::now())
        .await
        .map_err(|error| identity.fail(error))?;
    info!(
        event_name = "api.lead_created",
        correlation_id = %identity.correlation_id,
        lead_id = %outcome.lead.id,
        workspace_id = %identity.ctx.workspace_id,
        "lead created"
    );
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn list_leads(
    State(state): State<ApiState>,
    identity: Identity,
    Query(query): Query<ListLeadsQuery>,
) -> Result<Json<Vec<Lead>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(LeadStatus::parse(raw).ok_or_else(|| {
            identity.fail(DomainError::Validation(format!("unknown lead status `{raw}`")))
        })?),
        None => None,
    };
    let leads = state
        .engine
        .leads
        .list_leads(&identity.ctx, status, query.limit, Utc::now())
        .await
        .map_err(|error| identity.fail(error))?;
    Ok(Json(leads))
}

async fn get_lead(
    State(state): State<ApiState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Lead>, ApiError> {
    let lead = state
        .engine
        .leads
        .get_lead(&identity.ctx, &LeadId::from(id.as_str()), Utc::now())
        .await
        .map_err(|error| identity.fail(error))?;
    Ok(Json(lead))
}

async fn list_lead_events(
    State(state): State<ApiState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Vec<LeadEvent>>, ApiError> {
    let events = state
        .engine
        .leads
        .list_lead_events(&identity.ctx, &LeadId::from(id.as_str()))
        .await
        .map_err(|error| identity.fail(error))?;
    Ok(Json(events))
}

async fn record_manual_proof(
    State(state): State<ApiState>,
    identity: Identity,
    Path(id): Path<String>,
    Json(request): Json<ManualProofRequest>,
) -> Result<Json<ManualProofOutcome>, ApiError> {
    let channel = Channel::parse(&request.channel).ok_or_else(|| {
        identity.fail(DomainError::Validation(format!("unknown channel `{}`", request.channel)))
    })?;
    let outcome = state
        .engine
        .leads
        .record_manual_proof(
            &identity.ctx,
            &LeadId::from(id.as_str()),
            channel,
            request.note.as_deref(),
            Utc::now(),
        )
        .await
        .map_err(|error| identity.fail(error))?;
    Ok(Json(outcome))
}

async fn stop_clock(
    State(state): State<ApiState>,
    identity: Identity,
    Path(id): Path<String>,
    Json(request): Json<StopClockRequest>,
) -> Result<Json<StopOutcome>, ApiError> {
    if request.reason.trim().is_empty() {
        return Err(identity.fail(DomainError::Validation("stop reason is required".to_owned())));
    }
    let outcome = state
        .engine
        .leads
        .stop_clock(
            &identity.ctx,
            &LeadId::from(id.as_str()),
            StopReason::parse(&request.reason),
            Utc::now(),
        )
        .await
        .map_err(|error| identity.fail(error))?;
    Ok(Json(outcome))
}

async fn start_autopilot(
    State(state): State<ApiState>,
    identity: Identity,
    Path(id): Path<String>,
    Json(request): Json<StartAutopilotRequest>,
) -> Result<(StatusCode, Json<AutopilotRun>), ApiError> {
    let scenario_id = request.scenario_id.as_deref().map(ScenarioId::from);
    let run = state
        .engine
        .autopilot
        .start_autopilot(&identity.ctx, &LeadId::from(id.as_str()), scenario_id.as_ref(), Utc::now())
        .await
        .map_err(|error| identity.fail(error))?;
    Ok((StatusCode::CREATED, Json(run)))
}

async fn process_reply(
    State(state): State<ApiState>,
    identity: Identity,
    Path(id): Path<String>,
    Json(request): Json<ReplyRequest>,
) -> Result<Json<ReplyOutcome>, ApiError> {
    let outcome = state
        .engine
        .autopilot
        .process_reply(
            &identity.ctx.workspace_id,
            &LeadId::from(id.as_str()),
            &request.text,
            Utc::now(),
        )
        .await
        .map_err(|error| identity.fail(error))?;
    Ok(Json(outcome))
}

async fn switch_scenario(
    State(state): State<ApiState>,
    identity: Identity,
    Path(id): Path<String>,
    Json(request): Json<SwitchScenarioRequest>,
) -> Result<Json<AutopilotRun>, ApiError> {
    let run = state
        .engine
        .autopilot
        .switch_scenario(
            &identity.ctx,
            &AutopilotRunId::from(id.as_str()),
            &ScenarioId::from(request.scenario_id.as_str()),
            Utc::now(),
        )
        .await
        .map_err(|error| identity.fail(error))?;
    Ok(Json(run))
}

async fn set_default_scenario(
    State(state): State<ApiState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<DefaultScenarioChange>, ApiError> {
    let change = state
        .engine
        .autopilot
        .set_default_scenario(&identity.ctx, &ScenarioId::from(id.as_str()), Utc::now())
        .await
        .map_err(|error| identity.fail(error))?;
    Ok(Json(change))
}

/// Provider delivery/read callback. The body is signed when a callback secret is configured.
async fn delivery_status(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackOutcome>, ApiError> {
    let correlation_id = correlation_id(&headers);
    if let Some(secret) = &state.callback_secret {
        let signature = header_value(&headers, SIGNATURE_HEADER).unwrap_or_default();
        if !verify_signature(secret.expose_secret().as_bytes(), &body, signature) {
            return Err(ApiError::new(
                DomainError::AccessDenied("callback signature is missing or invalid".to_owned()),
                &correlation_id,
            ));
        }
    }

    let request: StatusCallbackRequest = serde_json::from_slice(&body).map_err(|error| {
        ApiError::new(DomainError::Validation(format!("callback body: {error}")), &correlation_id)
    })?;
    let proof_type = ProofType::parse(&request.status_type).ok_or_else(|| {
        ApiError::new(
            DomainError::Validation(format!("unknown status type `{}`", request.status_type)),
            &correlation_id,
        )
    })?;

    let outcome = state
        .engine
        .callbacks
        .handle_delivery_status(
            &request.provider_message_id,
            proof_type,
            request.occurred_at.unwrap_or_else(Utc::now),
        )
        .await
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    Ok(Json(outcome))
}

/// Runs one maintenance pass. Disabled unless a maintenance token is configured.
async fn maintenance_sweep(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<SweepQuery>,
) -> Result<Json<MaintenanceReport>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let presented = header_value(&headers, MAINTENANCE_TOKEN_HEADER).or_else(|| {
        header_value(&headers, header::AUTHORIZATION.as_str())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
    });
    let authorized = match (&state.maintenance_token, presented) {
        (Some(expected), Some(presented)) => secrets_match(expected.expose_secret(), presented),
        _ => false,
    };
    if !authorized {
        return Err(ApiError::new(
            DomainError::AccessDenied("maintenance token is missing or invalid".to_owned()),
            &correlation_id,
        ));
    }

    let report = state
        .engine
        .run_maintenance(Utc::now(), query.limit)
        .await
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    info!(
        event_name = "api.maintenance_sweep",
        correlation_id = %correlation_id,
        breached = report.breaches.breached,
        escalations = report.escalations.raised,
        sent = report.dispatch.sent,
        expired_replies = report.expired_replies,
        "maintenance sweep completed"
    );
    Ok(Json(report))
}
