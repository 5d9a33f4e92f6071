//! Domain entities: `Booking`, `Interpreter`, `Policy`, `MeetingTypePriority`,
//! `AssignmentLog`, `PoolEntryHistory` and their enumerations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owning group of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Iot,
    Hardware,
    Software,
    Other,
}

/// Meeting-type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeetingType {
    Dr,
    Vip,
    Weekly,
    General,
    Urgent,
    President,
    Other,
}

impl MeetingType {
    /// Relative tie-break weight used by Pool Store priority ordering
    /// (DR > VIP > Urgent > Weekly > others).
    pub fn priority_weight(self) -> u8 {
        match self {
            MeetingType::Dr => 5,
            MeetingType::Vip => 4,
            MeetingType::Urgent => 3,
            MeetingType::Weekly => 2,
            MeetingType::General | MeetingType::President | MeetingType::Other => 1,
        }
    }
}

/// DR sub-type, meaningful only when `MeetingType::Dr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrSubType {
    DrI,
    DrII,
    DrK,
    DrPr,
    Other,
}

/// Booking lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Waiting,
    Approve,
    Cancel,
}

/// Pool sub-state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolSubState {
    None,
    Waiting,
    Ready,
    Processing,
    Assigned,
    Escalated,
    Failed,
}

/// A bookable meeting that may require an interpreter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub group: GroupKind,
    pub meeting_type: MeetingType,
    pub dr_sub_type: Option<DrSubType>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: BookingStatus,
    pub interpreter_emp_code: Option<String>,
    pub pool_sub_state: PoolSubState,
    pub pool_entry_time: Option<DateTime<Utc>>,
    pub pool_deadline_time: Option<DateTime<Utc>>,
    pub processing_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Booking {
    /// Invariant from spec §3: `start < end`.
    pub fn has_valid_interval(&self) -> bool {
        self.start < self.end
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancel
    }

    pub fn is_assigned(&self) -> bool {
        self.status == BookingStatus::Approve && self.interpreter_emp_code.is_some()
    }
}

/// A person who can be assigned to a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interpreter {
    pub emp_code: String,
    pub active: bool,
    pub first_name: String,
    pub last_name: String,
    /// Used for tenant/center filtering only (never by the Scorer).
    pub department_path: Option<String>,
}

/// Operational mode of the singleton Policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Balance,
    Urgent,
    Normal,
    Custom,
}

impl Mode {
    pub fn is_locked(self) -> bool {
        self != Mode::Custom
    }
}

/// The singleton scoring/fairness policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub mode: Mode,
    pub w_fair: f64,
    pub w_urgency: f64,
    pub w_lrs: f64,
    pub dr_consecutive_penalty: f64,
    pub fairness_window_days: i64,
    pub max_gap_hours: f64,
    pub min_advance_days: i64,
    pub auto_assign_enabled: bool,
    pub version: i64,
}

/// A canonical, non-CUSTOM policy vector (spec §4.1).
pub struct CanonicalVector {
    pub fairness_window_days: i64,
    pub max_gap_hours: f64,
    pub w_fair: f64,
    pub w_urgency: f64,
    pub w_lrs: f64,
    pub dr_consecutive_penalty: f64,
}

impl Mode {
    /// The canonical parameter vector for the three fixed modes. `CUSTOM`
    /// has no canonical vector -- its values are whatever was last set.
    pub fn canonical_vector(self) -> Option<CanonicalVector> {
        match self {
            Mode::Balance => Some(CanonicalVector {
                fairness_window_days: 60,
                max_gap_hours: 2.0,
                w_fair: 2.0,
                w_urgency: 0.6,
                w_lrs: 0.6,
                dr_consecutive_penalty: -0.8,
            }),
            Mode::Urgent => Some(CanonicalVector {
                fairness_window_days: 14,
                max_gap_hours: 10.0,
                w_fair: 0.5,
                w_urgency: 2.5,
                w_lrs: 0.2,
                dr_consecutive_penalty: -0.1,
            }),
            Mode::Normal => Some(CanonicalVector {
                fairness_window_days: 30,
                max_gap_hours: 5.0,
                w_fair: 1.2,
                w_urgency: 0.8,
                w_lrs: 0.3,
                dr_consecutive_penalty: -0.5,
            }),
            Mode::Custom => None,
        }
    }
}

/// Per-meeting-type priority thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingTypePriority {
    pub meeting_type: MeetingType,
    pub priority_value: u8,
    pub urgent_threshold_days: i64,
    pub general_threshold_days: i64,
}

impl MeetingTypePriority {
    pub fn has_valid_threshold_order(&self) -> bool {
        self.urgent_threshold_days < self.general_threshold_days
    }
}

/// Outcome recorded by the Assignment Runner for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentOutcome {
    Assigned,
    Escalated,
    Rejected,
}

/// Append-only decision record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentLog {
    pub id: String,
    pub booking_id: String,
    pub interpreter_emp_code: Option<String>,
    pub outcome: AssignmentOutcome,
    pub reason: String,
    pub score_breakdown: serde_json::Value,
    pub conflict_summary: serde_json::Value,
    pub dr_decision: serde_json::Value,
    pub duration_ms: i64,
    pub system_snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Pool state-transition kinds recorded by `PoolEntryHistory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolAction {
    Entered,
    Updated,
    Processed,
    Failed,
    Retried,
    Escalated,
}

/// Append-only pool audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntryHistory {
    pub id: String,
    pub booking_id: String,
    pub action: PoolAction,
    pub previous_state: PoolSubState,
    pub new_state: PoolSubState,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub system_state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
