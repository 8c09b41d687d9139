use serde::{Deserialize, Serialize};

use crate::domain::escalation::EscalationLevel;

/// Fractions of the SLA window that must elapse before each level may fire.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationThresholds {
    pub reminder: f64,
    pub reassign: f64,
    pub manager_alert: f64,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self { reminder: 0.50, reassign: 0.75, manager_alert: 0.90 }
    }
}

impl EscalationThresholds {
    pub fn threshold_for(&self, level: EscalationLevel) -> f64 {
        match level {
            EscalationLevel::Reminder => self.reminder,
            EscalationLevel::Reassign => self.reassign,
            EscalationLevel::ManagerAlert => self.manager_alert,
        }
    }
}

/// What the escalation engine knows about one lead with a running clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EscalationInput {
    pub elapsed_ratio: f64,
    pub highest_recorded: Option<EscalationLevel>,
    pub owner_available: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EscalationDecision {
    pub level: EscalationLevel,
    pub reason: String,
}

/// Picks the single next level to raise, if any.
///
/// Levels only move forward and never skip: the candidate is always the one right after
/// the highest recorded level. Without an available owner the reminder and reassign
/// windows are waived.
pub fn next_escalation(
    thresholds: &EscalationThresholds,
    input: EscalationInput,
) -> Option<EscalationDecision> {
    let candidate = EscalationLevel::after(input.highest_recorded)?;
    let waived = !input.owner_available && candidate != EscalationLevel::ManagerAlert;
    let threshold = thresholds.threshold_for(candidate);

    if waived {
        return Some(EscalationDecision {
            level: candidate,
            reason: "owner_unavailable".to_owned(),
        });
    }

    if input.elapsed_ratio >= threshold {
        return Some(EscalationDecision {
            level: candidate,
            reason: format!("elapsed_ratio>={threshold:.2}"),
        });
    }

    None
}

/// Every level already due, in order, starting right after the highest recorded one.
///
/// Stops at the first level whose window has not elapsed, so the result is always a
/// contiguous run of the forward sequence.
pub fn due_escalations(
    thresholds: &EscalationThresholds,
    input: EscalationInput,
) -> Vec<EscalationDecision> {
    let mut due = Vec::new();
    let mut highest = input.highest_recorded;
    while let Some(decision) =
        next_escalation(thresholds, EscalationInput { highest_recorded: highest, ..input })
    {
        highest = Some(decision.level);
        due.push(decision);
    }
    due
}

#[cfg(test)]
mod tests {
    use super::{due_escalations, next_escalation, EscalationInput, EscalationThresholds};
    use crate::domain::escalation::EscalationLevel;

    fn input(ratio: f64, highest: Option<EscalationLevel>, available: bool) -> EscalationInput {
        EscalationInput { elapsed_ratio: ratio, highest_recorded: highest, owner_available: available }
    }

    #[test]
    fn nothing_fires_before_first_threshold() {
        let thresholds = EscalationThresholds::default();
        assert_eq!(next_escalation(&thresholds, input(0.49, None, true)), None);
    }

    #[test]
    fn raises_only_the_next_level_even_when_late() {
        let thresholds = EscalationThresholds::default();

        let first = next_escalation(&thresholds, input(0.95, None, true)).expect("decision");
        assert_eq!(first.level, EscalationLevel::Reminder);

        let second = next_escalation(&thresholds, input(0.95, Some(EscalationLevel::Reminder), true))
            .expect("decision");
        assert_eq!(second.level, EscalationLevel::Reassign);
    }

    #[test]
    fn terminal_level_is_never_re_raised() {
        let thresholds = EscalationThresholds::default();
        assert_eq!(
            next_escalation(&thresholds, input(5.0, Some(EscalationLevel::ManagerAlert), true)),
            None
        );
    }

    #[test]
    fn unavailable_owner_waives_early_windows_but_not_manager_alert() {
        let thresholds = EscalationThresholds::default();

        let reminder = next_escalation(&thresholds, input(0.0, None, false)).expect("decision");
        assert_eq!(reminder.level, EscalationLevel::Reminder);
        assert_eq!(reminder.reason, "owner_unavailable");

        let reassign =
            next_escalation(&thresholds, input(0.1, Some(EscalationLevel::Reminder), false))
                .expect("decision");
        assert_eq!(reassign.level, EscalationLevel::Reassign);

        assert_eq!(
            next_escalation(&thresholds, input(0.1, Some(EscalationLevel::Reassign), false)),
            None
        );
    }

    #[test]
    fn late_sweep_collects_every_due_level_in_order() {
        let thresholds = EscalationThresholds::default();
        let levels = |ratio, highest| {
            due_escalations(&thresholds, input(ratio, highest, true))
                .into_iter()
                .map(|decision| decision.level)
                .collect::<Vec<_>>()
        };

        assert_eq!(
            levels(1.0, None),
            vec![EscalationLevel::Reminder, EscalationLevel::Reassign, EscalationLevel::ManagerAlert]
        );
        assert_eq!(levels(0.8, Some(EscalationLevel::Reminder)), vec![EscalationLevel::Reassign]);
        assert!(levels(0.3, None).is_empty());
        assert!(levels(2.0, Some(EscalationLevel::ManagerAlert)).is_empty());
    }

    #[test]
    fn unavailable_owner_stops_short_of_manager_alert_until_its_window() {
        let thresholds = EscalationThresholds::default();
        let due = due_escalations(&thresholds, input(0.2, None, false));

        assert_eq!(
            due.iter().map(|decision| decision.level).collect::<Vec<_>>(),
            vec![EscalationLevel::Reminder, EscalationLevel::Reassign]
        );
        assert!(due.iter().all(|decision| decision.reason == "owner_unavailable"));
    }
}
