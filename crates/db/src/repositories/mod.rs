use chrono::{DateTime, SecondsFormat, Utc};
use leadline_core::errors::ApplicationError;
use thiserror::Error;

pub mod autopilot;
pub mod escalation;
pub mod events;
pub mod lead;
pub mod outbound;
pub mod pending_reply;
pub mod proof;
pub mod sla;
pub mod workspace;

pub use autopilot::SqlAutopilotRepository;
pub use escalation::SqlEscalationRepository;
pub use events::SqlLeadEventRepository;
pub use lead::SqlLeadRepository;
pub use outbound::SqlOutboundRepository;
pub use pending_reply::SqlPendingReplyRepository;
pub use proof::SqlProofRepository;
pub use sla::SqlSlaRepository;
pub use workspace::SqlWorkspaceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(error)) => error.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Canonical storage form for timestamps: fixed-width RFC 3339 UTC with microseconds, so that
/// text comparison in SQL matches chronological order.
pub fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn decode_enum<T>(
    column: &str,
    raw: String,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(&raw).ok_or_else(|| RepositoryError::Decode(format!("unknown `{column}` value `{raw}`")))
}


#[cfg(test)]
mod tests {
    use super::{parse_timestamp, ts};
    use crate::repositories::test_support::parse_ts;

    #[test]
    fn stored_timestamps_sort_lexically_in_time_order() {
        let earlier = ts(parse_ts("2026-03-02T09:00:00Z"));
        let later = ts(parse_ts("2026-03-02T09:00:00.5Z"));

        assert_eq!(earlier, "2026-03-02T09:00:00.000000Z");
        assert!(earlier < later);
        assert_eq!(parse_timestamp("at", later.clone()).expect("parse"), parse_ts("2026-03-02T09:00:00.5Z"));
    }
}
