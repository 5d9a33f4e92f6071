//! Scorer: a pure, deterministic multi-objective scoring function.
//!
//! Grounded on the teacher's `ScoringEngine`/`ScoreBreakdown`/`ObjectiveTerm`
//! shape, generalized from task scheduling to interpreter assignment and
//! keyed by stable `empCode` rather than display name (see design notes).

use serde::{Deserialize, Serialize};

use crate::model::MeetingTypePriority;

/// A candidate interpreter as seen by the Scorer: no department/availability
/// concerns here, those are resolved upstream by the Conflict Detector and
/// DR Policy before candidates ever reach this module.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub emp_code: String,
    pub current_hours: f64,
    pub days_since_last: f64,
    pub dr_consecutive_count: u32,
    /// `false` for candidates hard-blocked by DR policy or otherwise
    /// ineligible -- these are scored (so breakdowns are explainable) but
    /// excluded from the ranked output.
    pub eligible: bool,
    pub ineligible_reason: Option<String>,
}

/// Booking-shaped input the Scorer needs, decoupled from the full domain
/// `Booking` so this module stays a pure function of scalar inputs.
#[derive(Debug, Clone, Copy)]
pub struct ScoringBooking {
    pub days_to_start: f64,
    pub duration_hours: f64,
    pub is_dr: bool,
}

/// Policy snapshot inputs relevant to scoring.
#[derive(Debug, Clone, Copy)]
pub struct ScoringPolicy {
    pub w_fair: f64,
    pub w_urgency: f64,
    pub w_lrs: f64,
    pub dr_consecutive_penalty: f64,
    pub fairness_window_days: i64,
    pub max_gap_hours: f64,
    pub min_advance_days: i64,
}

/// Per-candidate component scores, all in `[0,1]` unless noted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Scores {
    pub fairness: f64,
    pub urgency: f64,
    pub lrs: f64,
    pub total: f64,
}

/// One candidate's explained score, as carried in the wire-format
/// `ScoreBreakdown`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub emp_code: String,
    pub eligible: bool,
    pub reason: Option<String>,
    pub scores: Scores,
    pub hours: f64,
    pub days_since_last: f64,
}

/// The stable, versioned wire structure dashboards depend on (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub schema_version: u32,
    pub candidates: Vec<CandidateScore>,
    pub selected_emp_code: Option<String>,
    pub dr_policy: serde_json::Value,
}

pub const SCORE_BREAKDOWN_SCHEMA_VERSION: u32 = 1;

/// Urgency component: `daysToStart` against the meeting-type's
/// `(urgentThresholdDays, generalThresholdDays)` window.
fn urgency_score(days_to_start: f64, priority: &MeetingTypePriority, min_advance_days: i64) -> f64 {
    let u = priority.urgent_threshold_days as f64;
    let g = priority.general_threshold_days as f64;
    if days_to_start <= u {
        1.0
    } else if days_to_start <= g {
        (g - days_to_start) / (g - u)
    } else {
        // Beyond G the interpolated endpoint is 0 (at days_to_start == G);
        // max(0, minAdvanceDays/daysToStart) is capped at that endpoint, so
        // the term collapses to 0 for any booking this far out.
        let raw = if days_to_start > 0.0 {
            min_advance_days as f64 / days_to_start
        } else {
            1.0
        };
        raw.max(0.0).min(0.0)
    }
}

/// LRS component: `clamp(daysSinceLast / fairnessWindowDays, 0, 1)`;
/// `+inf` maps to `1`.
fn lrs_score(days_since_last: f64, fairness_window_days: i64) -> f64 {
    if days_since_last.is_infinite() {
        return 1.0;
    }
    (days_since_last / fairness_window_days as f64).clamp(0.0, 1.0)
}

/// Scores all candidates and returns the ordered, explained breakdown.
/// Pure and deterministic: identical inputs yield identical output and
/// ordering (spec invariant #4).
pub fn score_candidates(
    candidates: &[Candidate],
    booking: ScoringBooking,
    priority: &MeetingTypePriority,
    policy: &ScoringPolicy,
    adjustment_factor: f64,
) -> Vec<CandidateScore> {
    // Hypothetical hours-in-window after adding this booking's duration.
    let hypothetical: Vec<f64> = candidates
        .iter()
        .map(|c| c.current_hours + booking.duration_hours)
        .collect();
    let h_min = hypothetical.iter().cloned().fold(f64::INFINITY, f64::min);
    let h_min = if h_min.is_finite() { h_min } else { 0.0 };

    let mut scored: Vec<CandidateScore> = candidates
        .iter()
        .zip(hypothetical.iter())
        .map(|(c, &h_i)| {
            let fair = 1.0
                - ((h_i - h_min) / policy.max_gap_hours.max(f64::EPSILON))
                    .clamp(0.0, 1.0);
            let urg = urgency_score(booking.days_to_start, priority, policy.min_advance_days);
            let lrs = lrs_score(c.days_since_last, policy.fairness_window_days);
            let dr_penalty = if booking.is_dr {
                policy.dr_consecutive_penalty * c.dr_consecutive_count as f64
            } else {
                0.0
            };
            let total = policy.w_fair * fair * adjustment_factor
                + policy.w_urgency * urg
                + policy.w_lrs * lrs
                + dr_penalty;
            CandidateScore {
                emp_code: c.emp_code.clone(),
                eligible: c.eligible,
                reason: c.ineligible_reason.clone(),
                scores: Scores {
                    fairness: fair,
                    urgency: urg,
                    lrs,
                    total,
                },
                hours: c.current_hours,
                days_since_last: c.days_since_last,
            }
        })
        .collect();

    // Eligibility gate w.r.t. maxGapHours: a candidate whose hypothetical
    // hours exceed the minimum by more than maxGapHours is only eligible
    // when no lower-hours candidate remains available.
    let any_within_gap = hypothetical
        .iter()
        .any(|&h| h - h_min <= policy.max_gap_hours);
    if any_within_gap {
        for (score, &h_i) in scored.iter_mut().zip(hypothetical.iter()) {
            if h_i - h_min > policy.max_gap_hours && score.eligible {
                score.eligible = false;
                score.reason = Some("exceeds maxGapHours with a lower-hours candidate available".into());
            }
        }
    }

    scored.sort_by(tie_break);
    scored
}

/// Tie-break order: higher `total` -> smaller `currentHours` -> larger
/// `daysSinceLast` -> lexicographically smaller `empCode`.
fn tie_break(a: &CandidateScore, b: &CandidateScore) -> std::cmp::Ordering {
    b.scores
        .total
        .partial_cmp(&a.scores.total)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.hours.partial_cmp(&b.hours).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| {
            b.days_since_last
                .partial_cmp(&a.days_since_last)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .then_with(|| a.emp_code.cmp(&b.emp_code))
}

/// Picks the winner from an already-sorted, scored list: the first
/// eligible candidate.
pub fn select_winner(scored: &[CandidateScore]) -> Option<&CandidateScore> {
    scored.iter().find(|c| c.eligible)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priority(u: i64, g: i64) -> MeetingTypePriority {
        MeetingTypePriority {
            meeting_type: crate::model::MeetingType::General,
            priority_value: 5,
            urgent_threshold_days: u,
            general_threshold_days: g,
        }
    }

    fn policy() -> ScoringPolicy {
        ScoringPolicy {
            w_fair: 1.2,
            w_urgency: 0.8,
            w_lrs: 0.3,
            dr_consecutive_penalty: -0.5,
            fairness_window_days: 30,
            max_gap_hours: 5.0,
            min_advance_days: 3,
        }
    }

    fn candidate(emp_code: &str, hours: f64, days_since_last: f64) -> Candidate {
        Candidate {
            emp_code: emp_code.into(),
            current_hours: hours,
            days_since_last,
            dr_consecutive_count: 0,
            eligible: true,
            ineligible_reason: None,
        }
    }

    #[test]
    fn least_loaded_candidate_wins_scenario_s1() {
        let candidates = vec![
            candidate("A", 20.0, 10.0),
            candidate("B", 5.0, 10.0),
            candidate("C", 12.0, 10.0),
        ];
        let booking = ScoringBooking {
            days_to_start: 1.0,
            duration_hours: 2.0,
            is_dr: false,
        };
        let scored = score_candidates(&candidates, booking, &priority(3, 30), &policy(), 1.0);
        assert_eq!(scored[0].emp_code, "B");
        assert_eq!(scored[0].hours, 5.0);
        let order: Vec<&str> = scored.iter().map(|c| c.emp_code.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A"]);
    }

    #[test]
    fn scorer_is_pure_and_deterministic() {
        let candidates = vec![candidate("A", 10.0, 5.0), candidate("B", 3.0, 20.0)];
        let booking = ScoringBooking {
            days_to_start: 5.0,
            duration_hours: 1.0,
            is_dr: false,
        };
        let p = priority(3, 30);
        let pol = policy();
        let first = score_candidates(&candidates, booking, &p, &pol, 1.0);
        let second = score_candidates(&candidates, booking, &p, &pol, 1.0);
        assert_eq!(
            first.iter().map(|c| c.scores.total).collect::<Vec<_>>(),
            second.iter().map(|c| c.scores.total).collect::<Vec<_>>()
        );
        assert_eq!(
            first.iter().map(|c| c.emp_code.clone()).collect::<Vec<_>>(),
            second.iter().map(|c| c.emp_code.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn infinite_days_since_last_maps_to_full_lrs_score() {
        assert_eq!(lrs_score(f64::INFINITY, 30), 1.0);
    }

    #[test]
    fn urgency_is_one_at_or_below_threshold() {
        let p = priority(3, 30);
        assert_eq!(urgency_score(3.0, &p, 3), 1.0);
        assert_eq!(urgency_score(1.0, &p, 3), 1.0);
    }

    #[test]
    fn tie_break_prefers_smaller_hours_then_larger_days_since_then_emp_code() {
        let candidates = vec![
            candidate("Z", 5.0, 10.0),
            candidate("A", 5.0, 10.0),
        ];
        let booking = ScoringBooking {
            days_to_start: 10.0,
            duration_hours: 1.0,
            is_dr: false,
        };
        let scored = score_candidates(&candidates, booking, &priority(3, 30), &policy(), 1.0);
        assert_eq!(scored[0].emp_code, "A");
    }
}
