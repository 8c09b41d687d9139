//! Member selection for reassignment, handover and manager alerts.

use leadline_core::domain::workspace::{MemberRole, WorkspaceMember};

pub fn owner_is_available(members: &[WorkspaceMember], owner_user_id: Option<&str>) -> bool {
    owner_user_id
        .and_then(|owner| members.iter().find(|member| member.user_id == owner))
        .is_some_and(|member| member.is_available)
}

/// Another available member who takes leads; agents before managers.
pub fn reassignment_target<'a>(
    members: &'a [WorkspaceMember],
    current_owner: Option<&str>,
) -> Option<&'a WorkspaceMember> {
    members
        .iter()
        .filter(|member| member.is_available && member.role.takes_leads())
        .filter(|member| Some(member.user_id.as_str()) != current_owner)
        .min_by(|left, right| {
            (left.role != MemberRole::Agent, &left.user_id)
                .cmp(&(right.role != MemberRole::Agent, &right.user_id))
        })
}

/// The lead owner when available, else any available member who takes leads, else any
/// available supervisor.
pub fn handover_target<'a>(
    members: &'a [WorkspaceMember],
    owner_user_id: Option<&str>,
) -> Option<&'a WorkspaceMember> {
    let owner = owner_user_id.and_then(|owner| {
        members
            .iter()
            .find(|member| member.user_id == owner && member.is_available && member.role.takes_leads())
    });

    owner
        .or_else(|| reassignment_target(members, None))
        .or_else(|| {
            members.iter().find(|member| member.is_available && member.role.receives_manager_alerts())
        })
}

/// Everyone who should hear about a manager alert and can be texted.
pub fn manager_alert_recipients(members: &[WorkspaceMember]) -> Vec<&WorkspaceMember> {
    members
        .iter()
        .filter(|member| member.role.receives_manager_alerts() && member.contact_phone().is_some())
        .collect()
}
