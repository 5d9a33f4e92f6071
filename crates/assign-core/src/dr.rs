//! DR History Inspector & DR Policy.
//!
//! Mode-parameterised consecutive-DR-assignment policy, generalized from the
//! mode-keyed canonical-profile table pattern in the Scorer.

use chrono::{DateTime, Utc};

use crate::model::Mode;

/// DR policy scope: whether the consecutive-assignment check considers all
/// interpreters globally or only those in the booking's environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrScope {
    Global,
    Local,
}

/// The resolved DR policy parameters for a given mode.
#[derive(Debug, Clone, Copy)]
pub struct DrPolicyProfile {
    pub scope: DrScope,
    pub forbid_consecutive: bool,
    pub penalty_multiplier: f64,
    pub includes_pending: bool,
}

impl Mode {
    pub fn dr_policy_profile(self, custom_forbid: bool, custom_penalty: f64) -> DrPolicyProfile {
        match self {
            Mode::Urgent => DrPolicyProfile {
                scope: DrScope::Local,
                forbid_consecutive: false,
                penalty_multiplier: 0.3,
                includes_pending: true,
            },
            Mode::Normal => DrPolicyProfile {
                scope: DrScope::Global,
                forbid_consecutive: false,
                penalty_multiplier: 0.6,
                includes_pending: false,
            },
            Mode::Balance => DrPolicyProfile {
                scope: DrScope::Global,
                forbid_consecutive: true,
                penalty_multiplier: 1.0,
                includes_pending: false,
            },
            Mode::Custom => DrPolicyProfile {
                scope: DrScope::Global,
                forbid_consecutive: custom_forbid,
                penalty_multiplier: custom_penalty,
                includes_pending: false,
            },
        }
    }
}

/// Per-candidate DR history as reported by the DR History Inspector.
#[derive(Debug, Clone)]
pub struct DrHistoryEntry {
    pub emp_code: String,
    pub last_dr_at: Option<DateTime<Utc>>,
}

/// Per-candidate DR decision, as recorded in the `AssignmentLog`.
#[derive(Debug, Clone)]
pub struct DrDecision {
    pub emp_code: String,
    pub consecutive_count: u32,
    pub is_blocked: bool,
    pub last_dr_at: Option<DateTime<Utc>>,
    /// Set when the block was lifted by the all-blocked override.
    pub overridden: bool,
}

/// A candidate `X` is consecutive-DR-blocked for a booking `B` iff X's most
/// recent non-cancelled DR assignment (restricted by scope) precedes B, and
/// no other interpreter has an intervening DR assignment -- i.e. X holds the
/// single most recent DR assignment among all candidates.
///
/// `history` must contain one entry per candidate, `booking_start` is the
/// booking under decision.
pub fn evaluate(
    history: &[DrHistoryEntry],
    profile: DrPolicyProfile,
    booking_start: DateTime<Utc>,
) -> Vec<DrDecision> {
    let most_recent = history
        .iter()
        .filter_map(|h| h.last_dr_at.filter(|t| *t < booking_start))
        .max();

    let mut decisions: Vec<DrDecision> = history
        .iter()
        .map(|h| {
            let is_most_recent_holder = match (h.last_dr_at, most_recent) {
                (Some(t), Some(m)) => t == m && t < booking_start,
                _ => false,
            };
            let consecutive_count = if is_most_recent_holder { 1 } else { 0 };
            DrDecision {
                emp_code: h.emp_code.clone(),
                consecutive_count,
                is_blocked: profile.forbid_consecutive && is_most_recent_holder,
                last_dr_at: h.last_dr_at,
                overridden: false,
            }
        })
        .collect();

    if profile.forbid_consecutive && decisions.iter().all(|d| d.is_blocked) && !decisions.is_empty() {
        // All blocked: lift the block for the candidate with the earliest
        // lastDRAt (least-recently DR-assigned among the blocked).
        let winner_idx = decisions
            .iter()
            .enumerate()
            .min_by_key(|(_, d)| d.last_dr_at.unwrap_or(DateTime::<Utc>::MIN_UTC))
            .map(|(i, _)| i);
        if let Some(idx) = winner_idx {
            decisions[idx].is_blocked = false;
            decisions[idx].overridden = true;
        }
    }

    decisions
}

/// `true` when every candidate remains blocked even after the override
/// heuristic was applied -- i.e. the override itself found no candidate
/// (the candidate set was empty). The Runner maps this to
/// `DR_ALL_BLOCKED_AND_NO_OVERRIDE_POSSIBLE`.
pub fn all_blocked_with_no_override(decisions: &[DrDecision]) -> bool {
    !decisions.is_empty() && decisions.iter().all(|d| d.is_blocked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn most_recent_dr_holder_is_blocked_in_balance() {
        let now = Utc::now();
        let history = vec![
            DrHistoryEntry {
                emp_code: "X".into(),
                last_dr_at: Some(now - Duration::days(1)),
            },
            DrHistoryEntry {
                emp_code: "Y".into(),
                last_dr_at: Some(now - Duration::days(10)),
            },
            DrHistoryEntry {
                emp_code: "Z".into(),
                last_dr_at: None,
            },
        ];
        let profile = Mode::Balance.dr_policy_profile(false, 0.0);
        let decisions = evaluate(&history, profile, now + Duration::hours(2));
        let x = decisions.iter().find(|d| d.emp_code == "X").unwrap();
        let y = decisions.iter().find(|d| d.emp_code == "Y").unwrap();
        let z = decisions.iter().find(|d| d.emp_code == "Z").unwrap();
        assert!(x.is_blocked);
        assert!(!y.is_blocked);
        assert!(!z.is_blocked);
    }

    #[test]
    fn override_lifts_block_for_earliest_last_dr_at_when_all_blocked() {
        let now = Utc::now();
        // Degenerate single-candidate case: the sole candidate is always
        // the most-recent holder, so forbid_consecutive would block them
        // outright without the override.
        let history = vec![DrHistoryEntry {
            emp_code: "Only".into(),
            last_dr_at: Some(now - Duration::hours(1)),
        }];
        let profile = Mode::Balance.dr_policy_profile(false, 0.0);
        let decisions = evaluate(&history, profile, now + Duration::hours(2));
        assert!(!decisions[0].is_blocked);
        assert!(decisions[0].overridden);
    }

    #[test]
    fn normal_mode_never_forbids_consecutive() {
        let now = Utc::now();
        let history = vec![DrHistoryEntry {
            emp_code: "X".into(),
            last_dr_at: Some(now - Duration::hours(1)),
        }];
        let profile = Mode::Normal.dr_policy_profile(false, 0.0);
        let decisions = evaluate(&history, profile, now + Duration::hours(2));
        assert!(!decisions[0].is_blocked);
    }
}
