use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{}"), Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

string_id!(WorkspaceId, "WS");
string_id!(LeadId, "LEAD");
string_id!(SlaStateId, "SLA");
string_id!(EscalationEventId, "ESC");
string_id!(ProofEventId, "PRF");
string_id!(ScenarioId, "SCN");
string_id!(AutopilotRunId, "RUN");
string_id!(OutboundMessageId, "MSG");
string_id!(PendingReplyId, "PAR");
string_id!(LeadEventId, "EVT");
