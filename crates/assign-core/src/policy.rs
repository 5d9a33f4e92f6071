//! Policy Store: singleton `Policy` plus per-meeting-type `MeetingTypePriority`
//! validation and mode-lock enforcement.

use crate::error::{EngineError, PolicyError, ValidationError};
use crate::model::{MeetingTypePriority, Mode, Policy};

/// A field-level validation warning: value is inside the hard range but
/// outside the recommended band. Non-fatal.
#[derive(Debug, Clone)]
pub struct Warning {
    pub field: &'static str,
    pub value: f64,
    pub recommended_min: f64,
    pub recommended_max: f64,
}

/// A sparse set of policy field updates.
#[derive(Debug, Clone, Default)]
pub struct PolicyPatch {
    pub mode: Option<Mode>,
    pub w_fair: Option<f64>,
    pub w_urgency: Option<f64>,
    pub w_lrs: Option<f64>,
    pub dr_consecutive_penalty: Option<f64>,
    pub fairness_window_days: Option<i64>,
    pub max_gap_hours: Option<f64>,
    pub min_advance_days: Option<i64>,
    pub auto_assign_enabled: Option<bool>,
}

struct FieldRange {
    name: &'static str,
    hard_min: f64,
    hard_max: f64,
    rec_min: f64,
    rec_max: f64,
}

const FAIRNESS_WINDOW_DAYS: FieldRange = FieldRange {
    name: "fairnessWindowDays",
    hard_min: 7.0,
    hard_max: 90.0,
    rec_min: 14.0,
    rec_max: 60.0,
};
const MAX_GAP_HOURS: FieldRange = FieldRange {
    name: "maxGapHours",
    hard_min: 1.0,
    hard_max: 100.0,
    rec_min: 2.0,
    rec_max: 20.0,
};
const MIN_ADVANCE_DAYS: FieldRange = FieldRange {
    name: "minAdvanceDays",
    hard_min: 0.0,
    hard_max: 30.0,
    rec_min: 1.0,
    rec_max: 7.0,
};
const W_FAIR: FieldRange = FieldRange {
    name: "w_fair",
    hard_min: 0.0,
    hard_max: 5.0,
    rec_min: 0.5,
    rec_max: 3.0,
};
const W_URGENCY: FieldRange = FieldRange {
    name: "w_urgency",
    hard_min: 0.0,
    hard_max: 5.0,
    rec_min: 0.3,
    rec_max: 3.0,
};
const W_LRS: FieldRange = FieldRange {
    name: "w_lrs",
    hard_min: 0.0,
    hard_max: 5.0,
    rec_min: 0.1,
    rec_max: 1.0,
};
const DR_CONSECUTIVE_PENALTY: FieldRange = FieldRange {
    name: "drConsecutivePenalty",
    hard_min: -2.0,
    hard_max: 0.0,
    rec_min: -1.0,
    rec_max: -0.2,
};

fn check_range(range: &FieldRange, value: f64, warnings: &mut Vec<Warning>) -> Result<(), EngineError> {
    if value < range.hard_min || value > range.hard_max {
        return Err(EngineError::Policy(PolicyError::OutOfRange {
            field: range.name.to_string(),
            value,
            min: range.hard_min,
            max: range.hard_max,
        }));
    }
    if value < range.rec_min || value > range.rec_max {
        warnings.push(Warning {
            field: range.name,
            value,
            recommended_min: range.rec_min,
            recommended_max: range.rec_max,
        });
    }
    Ok(())
}

/// Fields that are read-only while `mode != CUSTOM`.
fn is_locked_field(field: &'static str) -> bool {
    matches!(
        field,
        "fairnessWindowDays"
            | "maxGapHours"
            | "minAdvanceDays"
            | "w_fair"
            | "w_urgency"
            | "w_lrs"
            | "drConsecutivePenalty"
    )
}

/// Validates and applies `patch` to `policy` in place, returning any
/// non-fatal recommended-band warnings. Mode-lock and hard-range violations
/// fail the whole update -- nothing is applied.
pub fn apply_patch(
    policy: &mut Policy,
    patch: &PolicyPatch,
) -> Result<Vec<Warning>, EngineError> {
    let mut warnings = Vec::new();
    let target_mode = patch.mode.unwrap_or(policy.mode);
    let locked = target_mode.is_locked() && patch.mode.is_none();

    macro_rules! guard_locked {
        ($present:expr, $range:expr) => {
            if $present && locked {
                return Err(EngineError::Policy(PolicyError::Locked {
                    field: $range.name.to_string(),
                    mode: format!("{:?}", policy.mode),
                }));
            }
        };
    }

    guard_locked!(patch.fairness_window_days.is_some(), FAIRNESS_WINDOW_DAYS);
    guard_locked!(patch.max_gap_hours.is_some(), MAX_GAP_HOURS);
    guard_locked!(patch.min_advance_days.is_some(), MIN_ADVANCE_DAYS);
    guard_locked!(patch.w_fair.is_some(), W_FAIR);
    guard_locked!(patch.w_urgency.is_some(), W_URGENCY);
    guard_locked!(patch.w_lrs.is_some(), W_LRS);
    guard_locked!(
        patch.dr_consecutive_penalty.is_some(),
        DR_CONSECUTIVE_PENALTY
    );

    if let Some(v) = patch.fairness_window_days {
        check_range(&FAIRNESS_WINDOW_DAYS, v as f64, &mut warnings)?;
    }
    if let Some(v) = patch.max_gap_hours {
        check_range(&MAX_GAP_HOURS, v, &mut warnings)?;
    }
    if let Some(v) = patch.min_advance_days {
        check_range(&MIN_ADVANCE_DAYS, v as f64, &mut warnings)?;
    }
    if let Some(v) = patch.w_fair {
        check_range(&W_FAIR, v, &mut warnings)?;
    }
    if let Some(v) = patch.w_urgency {
        check_range(&W_URGENCY, v, &mut warnings)?;
    }
    if let Some(v) = patch.w_lrs {
        check_range(&W_LRS, v, &mut warnings)?;
    }
    if let Some(v) = patch.dr_consecutive_penalty {
        check_range(&DR_CONSECUTIVE_PENALTY, v, &mut warnings)?;
    }

    // Mode transition: atomically replace locked fields with the canonical
    // vector for the destination mode (CUSTOM keeps whatever was supplied).
    if let Some(new_mode) = patch.mode {
        if let Some(vector) = new_mode.canonical_vector() {
            policy.fairness_window_days = vector.fairness_window_days;
            policy.max_gap_hours = vector.max_gap_hours;
            policy.w_fair = vector.w_fair;
            policy.w_urgency = vector.w_urgency;
            policy.w_lrs = vector.w_lrs;
            policy.dr_consecutive_penalty = vector.dr_consecutive_penalty;
        }
        policy.mode = new_mode;
    } else {
        if let Some(v) = patch.fairness_window_days {
            policy.fairness_window_days = v;
        }
        if let Some(v) = patch.max_gap_hours {
            policy.max_gap_hours = v;
        }
        if let Some(v) = patch.min_advance_days {
            policy.min_advance_days = v;
        }
        if let Some(v) = patch.w_fair {
            policy.w_fair = v;
        }
        if let Some(v) = patch.w_urgency {
            policy.w_urgency = v;
        }
        if let Some(v) = patch.w_lrs {
            policy.w_lrs = v;
        }
        if let Some(v) = patch.dr_consecutive_penalty {
            policy.dr_consecutive_penalty = v;
        }
    }

    if let Some(v) = patch.auto_assign_enabled {
        policy.auto_assign_enabled = v;
    }

    policy.version += 1;
    Ok(warnings)
}

/// Validates a `MeetingTypePriority` row: hard ranges plus the
/// `urgentThresholdDays < generalThresholdDays` invariant.
pub fn validate_priority(priority: &MeetingTypePriority) -> Result<(), EngineError> {
    if !(1..=10).contains(&priority.priority_value) {
        return Err(EngineError::Validation(ValidationError::InvalidValue {
            field: "priorityValue".into(),
            message: format!("{} is out of range [1,10]", priority.priority_value),
        }));
    }
    if !(0..=30).contains(&priority.urgent_threshold_days) {
        return Err(EngineError::Validation(ValidationError::InvalidValue {
            field: "urgentThresholdDays".into(),
            message: format!(
                "{} is out of range [0,30]",
                priority.urgent_threshold_days
            ),
        }));
    }
    if !(1..=365).contains(&priority.general_threshold_days) {
        return Err(EngineError::Validation(ValidationError::InvalidValue {
            field: "generalThresholdDays".into(),
            message: format!(
                "{} is out of range [1,365]",
                priority.general_threshold_days
            ),
        }));
    }
    if !priority.has_valid_threshold_order() {
        return Err(EngineError::Policy(PolicyError::ThresholdOrder {
            urgent: priority.urgent_threshold_days as f64,
            general: priority.general_threshold_days as f64,
        }));
    }
    Ok(())
}

impl Default for Policy {
    fn default() -> Self {
        let vector = Mode::Normal.canonical_vector().expect("NORMAL has a canonical vector");
        Policy {
            mode: Mode::Normal,
            w_fair: vector.w_fair,
            w_urgency: vector.w_urgency,
            w_lrs: vector.w_lrs,
            dr_consecutive_penalty: vector.dr_consecutive_penalty,
            fairness_window_days: vector.fairness_window_days,
            max_gap_hours: vector.max_gap_hours,
            min_advance_days: 3,
            auto_assign_enabled: true,
            version: 0,
        }
    }
}
