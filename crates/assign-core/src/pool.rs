//! Pool Store priority ordering and Pool Processor batch loop.
//!
//! Grounded on `AutoScheduler::generate_schedule`'s gather-context ->
//! filter-by-priority -> claim/assign loop shape (teacher's
//! `scheduler/mod.rs`), adapted from gap-filling to claim-then-run.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{Booking, Mode, PoolAction, PoolEntryHistory, PoolSubState};
use crate::runner::{Runner, RunnerOutcome};
use crate::storage::Database;

/// `modeLookahead`: how far into the future `peekReady` looks for entries
/// whose deadline has not yet arrived (spec §4.8).
pub fn mode_lookahead_secs(mode: Mode, config: &EngineConfig) -> i64 {
    match mode {
        Mode::Balance => 6 * 3600,
        Mode::Normal => 24 * 3600,
        Mode::Urgent => 0,
        Mode::Custom => config.custom_pool_lookahead_secs.unwrap_or(24 * 3600) as i64,
    }
}

/// Lower sorts first. Bucket by urgency, then meeting-type weight
/// (descending), then `poolEntryTime` (ascending).
fn priority_key(booking: &Booking, now: DateTime<Utc>) -> (u8, i8, DateTime<Utc>) {
    let deadline = booking.pool_deadline_time.unwrap_or(booking.start);
    let bucket = if deadline < now {
        0
    } else if deadline <= now + Duration::hours(2) {
        1
    } else if deadline <= now + Duration::hours(6) {
        2
    } else if deadline <= now + Duration::hours(24) {
        3
    } else {
        4
    };
    let weight = -(booking.meeting_type.priority_weight() as i8);
    let entry_time = booking.pool_entry_time.unwrap_or(booking.created_at);
    (bucket, weight, entry_time)
}

pub fn sort_by_priority(entries: &mut [Booking], now: DateTime<Utc>) {
    entries.sort_by_key(|b| priority_key(b, now));
}

/// Outcome of one `process_tick` invocation.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub claimed: usize,
    pub assigned: usize,
    pub escalated: usize,
    pub failed: usize,
    pub skipped_due_to_budget: usize,
}

impl TickReport {
    fn merge(&mut self, other: TickReport) {
        self.claimed += other.claimed;
        self.assigned += other.assigned;
        self.escalated += other.escalated;
        self.failed += other.failed;
        self.skipped_due_to_budget += other.skipped_due_to_budget;
    }
}

/// Reason codes the Runner escalates that the Pool Processor treats as
/// terminal (no point retrying): the candidate pool itself is the problem,
/// not a transient condition.
fn is_terminal_reason(reason: crate::error::ReasonCode) -> bool {
    use crate::error::ReasonCode::*;
    matches!(
        reason,
        NoCandidates | DrAllBlockedAndNoOverridePossible | AutoAssignDisabled
    )
}

pub struct PoolProcessor {
    db: Database,
    runner: Runner,
    config: EngineConfig,
}

impl PoolProcessor {
    pub fn new(db: Database, runner: Runner, config: EngineConfig) -> Self {
        Self { db, runner, config }
    }

    /// One Scheduler tick: fetch up to `pool_batch_size` ready entries,
    /// sorted by priority, claim and run each through the Runner, respecting
    /// the per-tick time budget.
    pub async fn process_tick(&self) -> Result<TickReport, EngineError> {
        let policy = self.db.load_policy()?;
        let lookahead = mode_lookahead_secs(policy.mode, &self.config);
        let now = Utc::now();
        let mut batch = self.db.pool_waiting_within(now, lookahead, self.config.pool_batch_size)?;
        sort_by_priority(&mut batch, now);

        let parallelism = if policy.mode == Mode::Custom {
            self.config.custom_parallelism.max(1)
        } else {
            1
        };

        let deadline = Instant::now() + std::time::Duration::from_secs(self.config.pool_tick_budget_secs);
        let mut report = TickReport::default();

        for chunk in batch.chunks(parallelism) {
            if Instant::now() >= deadline {
                report.skipped_due_to_budget += batch.len() - report.claimed;
                break;
            }
            if parallelism > 1 {
                let mut handles = Vec::with_capacity(chunk.len());
                for entry in chunk {
                    let db = self.db.clone();
                    let runner = self.runner.clone();
                    let id = entry.id.clone();
                    let version = entry.version;
                    handles.push(tokio::spawn(async move {
                        process_one(&db, &runner, &id, version).await
                    }));
                }
                for handle in handles {
                    match handle.await {
                        Ok(Ok(r)) => report.merge(r),
                        _ => report.failed += 1,
                    }
                }
            } else {
                for entry in chunk {
                    let r = process_one(&self.db, &self.runner, &entry.id, entry.version).await?;
                    report.merge(r);
                }
            }
        }
        Ok(report)
    }
}

async fn process_one(
    db: &Database,
    runner: &Runner,
    booking_id: &str,
    expected_version: i64,
) -> Result<TickReport, EngineError> {
    let mut report = TickReport::default();
    if !db.claim_pool_entry(booking_id, expected_version)? {
        return Ok(report);
    }
    report.claimed += 1;

    let outcome = runner.assign_booking(booking_id).await?;
    match outcome {
        RunnerOutcome::Assigned { .. } => {
            report.assigned += 1;
        }
        RunnerOutcome::Pooled { .. } => {}
        RunnerOutcome::Escalated { reason, message } => {
            let booking = db.get_booking(booking_id)?;
            if is_terminal_reason(reason) {
                report.escalated += 1;
                finalize_pool_state(db, &booking, PoolSubState::Escalated, PoolAction::Escalated, &message)?;
            } else {
                report.failed += 1;
                finalize_pool_state(db, &booking, PoolSubState::Failed, PoolAction::Failed, &message)?;
            }
        }
    }
    Ok(report)
}

fn finalize_pool_state(
    db: &Database,
    booking: &Booking,
    new_state: PoolSubState,
    action: PoolAction,
    message: &str,
) -> Result<(), EngineError> {
    let mut updated = booking.clone();
    let previous_state = updated.pool_sub_state;
    updated.pool_sub_state = new_state;
    updated.processing_attempts += 1;
    updated.updated_at = Utc::now();
    db.update_booking(&updated, booking.version)?;
    db.append_pool_history(&PoolEntryHistory {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        action,
        previous_state,
        new_state,
        attempts: updated.processing_attempts,
        error_message: Some(message.to_string()),
        system_state: json!({}),
        created_at: Utc::now(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupKind, MeetingType};

    fn booking_with_deadline(id: &str, deadline: DateTime<Utc>, meeting_type: MeetingType) -> Booking {
        let now = Utc::now();
        Booking {
            id: id.into(),
            group: GroupKind::Other,
            meeting_type,
            dr_sub_type: None,
            start: deadline + Duration::hours(3),
            end: deadline + Duration::hours(4),
            status: crate::model::BookingStatus::Waiting,
            interpreter_emp_code: None,
            pool_sub_state: PoolSubState::Waiting,
            pool_entry_time: Some(now),
            pool_deadline_time: Some(deadline),
            processing_attempts: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[test]
    fn past_deadline_sorts_first() {
        let now = Utc::now();
        let mut entries = vec![
            booking_with_deadline("future", now + Duration::hours(20), MeetingType::General),
            booking_with_deadline("overdue", now - Duration::hours(1), MeetingType::General),
        ];
        sort_by_priority(&mut entries, now);
        assert_eq!(entries[0].id, "overdue");
    }

    #[test]
    fn dr_outranks_general_within_same_bucket() {
        let now = Utc::now();
        let mut entries = vec![
            booking_with_deadline("general", now + Duration::hours(1), MeetingType::General),
            booking_with_deadline("dr", now + Duration::hours(1), MeetingType::Dr),
        ];
        sort_by_priority(&mut entries, now);
        assert_eq!(entries[0].id, "dr");
    }

    #[test]
    fn mode_lookahead_matches_spec_table() {
        let config = EngineConfig::default();
        assert_eq!(mode_lookahead_secs(Mode::Urgent, &config), 0);
        assert_eq!(mode_lookahead_secs(Mode::Balance, &config), 6 * 3600);
        assert_eq!(mode_lookahead_secs(Mode::Normal, &config), 24 * 3600);
    }
}
