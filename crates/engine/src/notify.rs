//! Agent-facing notifications, queued through the outbox in the caller's transaction.

use chrono::{DateTime, Duration, Utc};
use leadline_core::audit::actors;
use leadline_core::domain::ids::PendingReplyId;
use leadline_core::domain::lead::Lead;
use leadline_core::domain::outbound::{Audience, OutboundMessage};
use leadline_core::domain::pending_reply::{PendingAgentReply, PendingReplyStatus, PendingReplyType};
use leadline_core::domain::workspace::WorkspaceMember;
use leadline_core::errors::ApplicationError;
use leadline_db::repositories::SqlPendingReplyRepository;
use sqlx::SqliteConnection;
use tracing::warn;

use crate::outbox::Outbox;

/// Queues `text` for `member`; members without a phone are skipped.
pub(crate) async fn notify_member_in(
    conn: &mut SqliteConnection,
    lead: &Lead,
    member: &WorkspaceMember,
    text: String,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<Option<OutboundMessage>, ApplicationError> {
    let Some(phone) = member.contact_phone() else {
        warn!(
            event_name = "notify.member_without_phone",
            lead_id = %lead.id,
            workspace_id = %lead.workspace_id,
            user_id = %member.user_id,
            "agent notification skipped, member has no phone"
        );
        return Ok(None);
    };

    let message = OutboundMessage::queued(
        lead.id.clone(),
        lead.workspace_id.clone(),
        Audience::Agent,
        Some(phone.to_owned()),
        text,
        now,
    );
    Outbox::enqueue_in(conn, &message, actor).await?;
    Ok(Some(message))
}

/// Handover notice plus the yes/no confirmation the agent is expected to answer.
pub(crate) async fn notify_handover_in(
    conn: &mut SqliteConnection,
    lead: &Lead,
    member: &WorkspaceMember,
    reason: &str,
    confirmation_window: Duration,
    now: DateTime<Utc>,
) -> Result<Option<(OutboundMessage, PendingAgentReply)>, ApplicationError> {
    let text = format!(
        "Autopilot handed over lead {} ({}). Reason: {reason}. Reply YES to confirm you will follow up.",
        lead.name,
        lead.contact_phone().unwrap_or("no phone"),
    );
    let Some(message) = notify_member_in(conn, lead, member, text, actors::AUTOPILOT, now).await?
    else {
        return Ok(None);
    };

    let reply = PendingAgentReply {
        id: PendingReplyId::generate(),
        lead_id: lead.id.clone(),
        workspace_id: lead.workspace_id.clone(),
        user_id: member.user_id.clone(),
        reply_type: PendingReplyType::HandoverConfirmation,
        status: PendingReplyStatus::Pending,
        outbound_message_id: Some(message.id.clone()),
        expires_at: now + confirmation_window,
        reply_value: None,
        created_at: now,
    };
    SqlPendingReplyRepository::insert(conn, &reply).await?;
    Ok(Some((message, reply)))
}
