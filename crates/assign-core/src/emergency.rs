//! Emergency Override: an admin-triggered, full-drain pass over every pool
//! entry with richer per-entry reporting than a regular Pool Processor tick.
//!
//! Reuses the Pool Processor's claim/process discipline, retrying each
//! entry up to `RetryConfig::EMERGENCY` attempts with exponential backoff.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::error::{EngineError, ReasonCode};
use crate::model::{PoolAction, PoolEntryHistory, PoolSubState};
use crate::pool::sort_by_priority;
use crate::retry::{with_retry, RetryConfig};
use crate::runner::{Runner, RunnerOutcome};
use crate::storage::{Database, PoolStats};

/// Per-entry outcome captured in the Emergency Override report.
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    pub booking_id: String,
    pub outcome: EntryResult,
    pub urgency_level: UrgencyLevel,
    pub time_to_deadline: Duration,
    pub manual_escalation: bool,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryResult {
    Assigned,
    Escalated,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrgencyLevel {
    PastDeadline,
    Critical,
    High,
    Normal,
}

fn urgency_level(time_to_deadline: Duration) -> UrgencyLevel {
    if time_to_deadline < Duration::zero() {
        UrgencyLevel::PastDeadline
    } else if time_to_deadline <= Duration::hours(2) {
        UrgencyLevel::Critical
    } else if time_to_deadline <= Duration::hours(6) {
        UrgencyLevel::High
    } else {
        UrgencyLevel::Normal
    }
}

/// The structured report produced by one Emergency Override run.
#[derive(Debug, Clone)]
pub struct EmergencyReport {
    pub trigger_reason: String,
    pub triggered_by: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub before_stats: PoolStats,
    pub after_stats: PoolStats,
    pub entries: Vec<EntryOutcome>,
}

pub struct EmergencyOverride {
    db: Database,
    runner: Runner,
}

impl EmergencyOverride {
    pub fn new(db: Database, runner: Runner) -> Self {
        Self { db, runner }
    }

    pub async fn run(&self, reason: &str, triggered_by: &str) -> Result<EmergencyReport, EngineError> {
        let started_at = Utc::now();
        let before_stats = self.db.pool_stats()?;

        let mut entries = self.db.all_pool_entries()?;
        sort_by_priority(&mut entries, started_at);

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let booking_id = entry.id.clone();
            let deadline = entry.pool_deadline_time.unwrap_or(entry.start);
            let time_to_deadline = deadline - started_at;
            let urgency_level = urgency_level(time_to_deadline);

            let mut attempts = 0u32;
            let runner = &self.runner;
            let db = &self.db;
            let id = booking_id.clone();
            let result = with_retry(
                RetryConfig::EMERGENCY,
                |err: &EngineError| !matches!(err, EngineError::Domain { .. }),
                move || {
                    attempts += 1;
                    let id = id.clone();
                    async move { db.claim_pool_entry(&id, entry.version).map(|_| ()) }
                },
            )
            .await;
            if result.is_err() {
                outcomes.push(EntryOutcome {
                    booking_id,
                    outcome: EntryResult::Failed,
                    urgency_level,
                    time_to_deadline,
                    manual_escalation: true,
                    attempts: RetryConfig::EMERGENCY.max_attempts,
                });
                continue;
            }

            let outcome = runner.assign_booking(&booking_id).await?;
            let (entry_result, manual_escalation) = match outcome {
                RunnerOutcome::Assigned { .. } => (EntryResult::Assigned, false),
                RunnerOutcome::Pooled { .. } => (EntryResult::Failed, false),
                RunnerOutcome::Escalated { reason, .. } => {
                    let terminal = matches!(
                        reason,
                        ReasonCode::NoCandidates
                            | ReasonCode::DrAllBlockedAndNoOverridePossible
                            | ReasonCode::AutoAssignDisabled
                    );
                    let current = self.db.get_booking(&booking_id)?;
                    let new_state = if terminal { PoolSubState::Escalated } else { PoolSubState::Failed };
                    let mut updated = current.clone();
                    updated.pool_sub_state = new_state;
                    updated.processing_attempts += 1;
                    updated.updated_at = Utc::now();
                    self.db.update_booking(&updated, current.version)?;
                    self.db.append_pool_history(&PoolEntryHistory {
                        id: uuid::Uuid::new_v4().to_string(),
                        booking_id: booking_id.clone(),
                        action: if terminal { PoolAction::Escalated } else { PoolAction::Failed },
                        previous_state: current.pool_sub_state,
                        new_state,
                        attempts: updated.processing_attempts,
                        error_message: Some(reason.to_string()),
                        system_state: json!({"emergency": true}),
                        created_at: Utc::now(),
                    })?;
                    (if terminal { EntryResult::Escalated } else { EntryResult::Failed }, true)
                }
            };

            outcomes.push(EntryOutcome {
                booking_id,
                outcome: entry_result,
                urgency_level,
                time_to_deadline,
                manual_escalation,
                attempts: 1,
            });
        }

        let after_stats = self.db.pool_stats()?;
        let finished_at = Utc::now();

        self.db.append_assignment_log(&crate::model::AssignmentLog {
            id: uuid::Uuid::new_v4().to_string(),
            booking_id: "EMERGENCY_OVERRIDE".into(),
            interpreter_emp_code: None,
            outcome: crate::model::AssignmentOutcome::Rejected,
            reason: reason.to_string(),
            score_breakdown: json!({}),
            conflict_summary: json!({}),
            dr_decision: json!({}),
            duration_ms: (finished_at - started_at).num_milliseconds(),
            system_snapshot: json!({
                "triggeredBy": triggered_by,
                "entryCount": outcomes.len(),
                "beforeStats": format!("{before_stats:?}"),
                "afterStats": format!("{after_stats:?}"),
            }),
            created_at: finished_at,
        })?;

        Ok(EmergencyReport {
            trigger_reason: reason.to_string(),
            triggered_by: triggered_by.to_string(),
            started_at,
            finished_at,
            before_stats,
            after_stats,
            entries: outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::{Booking, BookingStatus, GroupKind, MeetingType};

    fn pooled_booking(id: &str) -> Booking {
        let now = Utc::now();
        Booking {
            id: id.into(),
            group: GroupKind::Other,
            meeting_type: MeetingType::General,
            dr_sub_type: None,
            start: now + Duration::days(20),
            end: now + Duration::days(20) + Duration::hours(1),
            status: BookingStatus::Waiting,
            interpreter_emp_code: None,
            pool_sub_state: PoolSubState::Waiting,
            pool_entry_time: Some(now),
            pool_deadline_time: Some(now - Duration::hours(1)),
            processing_attempts: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[tokio::test]
    async fn escalates_when_no_candidates_available() {
        let db = Database::open_memory().unwrap();
        db.insert_booking(&pooled_booking("p1")).unwrap();
        let runner = Runner::new(db.clone(), EngineConfig::default());
        let emergency = EmergencyOverride::new(db.clone(), runner);

        let report = emergency.run("test drain", "admin-1").await.unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].outcome, EntryResult::Escalated);
        assert_eq!(report.entries[0].urgency_level, UrgencyLevel::PastDeadline);

        let booking = db.get_booking("p1").unwrap();
        assert_eq!(booking.pool_sub_state, PoolSubState::Escalated);
    }

    #[test]
    fn urgency_level_buckets_match_spec() {
        assert_eq!(urgency_level(Duration::hours(-1)), UrgencyLevel::PastDeadline);
        assert_eq!(urgency_level(Duration::hours(1)), UrgencyLevel::Critical);
        assert_eq!(urgency_level(Duration::hours(5)), UrgencyLevel::High);
        assert_eq!(urgency_level(Duration::hours(30)), UrgencyLevel::Normal);
    }
}
