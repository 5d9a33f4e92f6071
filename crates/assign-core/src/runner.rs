//! Assignment Runner: orchestrates one decision for one booking.
//!
//! Grounded on the teacher's `AutoScheduler::generate_schedule` staged
//! pipeline shape (parse -> gather context -> filter -> assign), adapted
//! from gap-filling to gate/route/score/commit.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::conflict::{self, Availability};
use crate::config::EngineConfig;
use crate::dr::{self, DrHistoryEntry};
use crate::dynamic_pool;
use crate::error::{DatabaseError, EngineError, ReasonCode};
use crate::fairness;
use crate::model::{
    AssignmentLog, AssignmentOutcome, Booking, BookingStatus, MeetingType, MeetingTypePriority,
    Mode, PoolAction, PoolEntryHistory, PoolSubState,
};
use crate::scoring::{self, Candidate, ScoreBreakdown, ScoringBooking, ScoringPolicy, CandidateScore};
use crate::storage::Database;

/// Outcome of a single Runner invocation.
#[derive(Debug, Clone)]
pub enum RunnerOutcome {
    Assigned {
        interpreter_emp_code: String,
        breakdown: ScoreBreakdown,
        /// `true` when this call observed an already-assigned booking and
        /// performed no new write (idempotence, spec §8).
        no_op: bool,
    },
    Pooled {
        deadline: DateTime<Utc>,
    },
    Escalated {
        reason: ReasonCode,
        message: String,
    },
}

#[derive(Clone)]
pub struct Runner {
    db: Database,
    config: EngineConfig,
    last_observed_interpreters: Arc<Mutex<Option<Vec<String>>>>,
}

impl Runner {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Self {
            db,
            config,
            last_observed_interpreters: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn assign_booking(&self, booking_id: &str) -> Result<RunnerOutcome, EngineError> {
        let budget = std::time::Duration::from_secs(self.config.runner_budget_secs);
        match tokio::time::timeout(budget, self.assign_booking_inner(booking_id)).await {
            Ok(result) => result,
            Err(_) => {
                let outcome = RunnerOutcome::Escalated {
                    reason: ReasonCode::ProcessingTimeout,
                    message: "runner budget exceeded".into(),
                };
                self.log_escalation(booking_id, &outcome, 0).await.ok();
                Ok(outcome)
            }
        }
    }

    async fn assign_booking_inner(&self, booking_id: &str) -> Result<RunnerOutcome, EngineError> {
        let start_instant = std::time::Instant::now();
        let booking = self.db.get_booking(booking_id)?;

        if booking.is_assigned() {
            return Ok(RunnerOutcome::Assigned {
                interpreter_emp_code: booking.interpreter_emp_code.clone().unwrap(),
                breakdown: ScoreBreakdown {
                    schema_version: scoring::SCORE_BREAKDOWN_SCHEMA_VERSION,
                    candidates: vec![],
                    selected_emp_code: booking.interpreter_emp_code.clone(),
                    dr_policy: json!({}),
                },
                no_op: true,
            });
        }
        if booking.is_cancelled() {
            return Err(EngineError::domain(
                ReasonCode::InvalidInput,
                "cannot assign a cancelled booking",
            ));
        }

        let policy = self.db.load_policy()?;
        if !policy.auto_assign_enabled {
            let outcome = RunnerOutcome::Escalated {
                reason: ReasonCode::AutoAssignDisabled,
                message: "auto-assign disabled".into(),
            };
            self.log_escalation(booking_id, &outcome, start_instant.elapsed().as_millis() as i64)
                .await?;
            return Ok(outcome);
        }

        let adjustment_factor = self.dynamic_pool_adjustment()?;

        let priorities = self.db.list_priorities()?;
        let priority = priorities
            .iter()
            .find(|p| p.meeting_type == booking.meeting_type)
            .cloned()
            .unwrap_or(MeetingTypePriority {
                meeting_type: booking.meeting_type,
                priority_value: 5,
                urgent_threshold_days: 3,
                general_threshold_days: 30,
            });

        let now = Utc::now();
        let days_to_start = (booking.start - now).num_seconds() as f64 / 86_400.0;

        let route = route_decision(policy.mode, days_to_start, &priority);
        match route {
            Route::Immediate => {
                self.run_immediate(booking, &policy, &priority, days_to_start, adjustment_factor, start_instant)
                    .await
            }
            Route::Pool => {
                let deadline = compute_pool_deadline(booking.start, priority.urgent_threshold_days, now);
                self.run_pool(booking, deadline).await
            }
        }
    }

    fn dynamic_pool_adjustment(&self) -> Result<f64, EngineError> {
        let current: Vec<String> = self
            .db
            .active_interpreters()?
            .into_iter()
            .map(|i| i.emp_code)
            .collect();
        let mut guard = self.last_observed_interpreters.lock().unwrap();
        let adjustment = match guard.as_ref() {
            Some(previous) => dynamic_pool::evaluate(previous, &current),
            None => dynamic_pool::evaluate(&[], &current),
        };
        *guard = Some(current);
        Ok(adjustment.adjustment_factor)
    }

    async fn run_immediate(
        &self,
        mut booking: Booking,
        policy: &crate::model::Policy,
        priority: &MeetingTypePriority,
        days_to_start: f64,
        adjustment_factor: f64,
        start_instant: std::time::Instant,
    ) -> Result<RunnerOutcome, EngineError> {
        let interpreters = self.db.active_interpreters()?;

        // Conflict detection: interpreters with an overlapping non-cancelled
        // booking stay in the candidate set (so the breakdown can explain
        // why they lost) but are marked ineligible below.
        let mut available = Vec::new();
        let mut conflict_summary = Vec::new();
        let mut conflicted = std::collections::HashSet::new();
        for interpreter in &interpreters {
            let existing = self.db.bookings_for_interpreter(&interpreter.emp_code)?;
            match conflict::check_availability(&existing, booking.start, booking.end, Some(&booking.id)) {
                Availability::Available => available.push(interpreter.emp_code.clone()),
                Availability::Conflicted(conflicts) => {
                    conflict_summary.push(json!({
                        "empCode": interpreter.emp_code,
                        "conflicts": conflicts.len(),
                    }));
                    conflicted.insert(interpreter.emp_code.clone());
                }
            }
        }

        // DR policy.
        let is_dr = booking.meeting_type == MeetingType::Dr;
        let dr_decisions = if is_dr {
            let profile = policy
                .mode
                .dr_policy_profile(policy.dr_consecutive_penalty <= -0.8, policy.dr_consecutive_penalty);
            let history: Vec<DrHistoryEntry> = available
                .iter()
                .map(|emp_code| {
                    let bookings = self.db.bookings_for_interpreter(emp_code).unwrap_or_default();
                    let last_dr_at = bookings
                        .iter()
                        .filter(|b| b.meeting_type == MeetingType::Dr && b.status != BookingStatus::Cancel)
                        .map(|b| b.start)
                        .filter(|t| *t < booking.start)
                        .max();
                    DrHistoryEntry {
                        emp_code: emp_code.clone(),
                        last_dr_at,
                    }
                })
                .collect();
            Some(dr::evaluate(&history, profile, booking.start))
        } else {
            None
        };

        if let Some(decisions) = &dr_decisions {
            if dr::all_blocked_with_no_override(decisions) {
                let outcome = RunnerOutcome::Escalated {
                    reason: ReasonCode::DrAllBlockedAndNoOverridePossible,
                    message: "all candidates DR-blocked".into(),
                };
                self.log_escalation(&booking.id, &outcome, start_instant.elapsed().as_millis() as i64)
                    .await?;
                return Ok(outcome);
            }
        }

        // Score every active interpreter, conflicted or DR-blocked included,
        // so the persisted breakdown can explain each exclusion (spec §4.5);
        // only `select_winner` below treats ineligibility as exclusionary.
        let candidates: Vec<Candidate> = interpreters
            .iter()
            .map(|interpreter| {
                let emp_code = &interpreter.emp_code;
                let bookings = self.db.bookings_for_interpreter(emp_code).unwrap_or_default();
                let now = Utc::now();
                let hours = fairness::hours_in_window(&bookings, now, policy.fairness_window_days);
                let last = fairness::last_assigned_at(&bookings);
                let days_since_last = fairness::days_since_last(last, now);

                if conflicted.contains(emp_code) {
                    return Candidate {
                        emp_code: emp_code.clone(),
                        current_hours: hours,
                        days_since_last,
                        dr_consecutive_count: 0,
                        eligible: false,
                        ineligible_reason: Some("conflicting booking".into()),
                    };
                }

                let (dr_count, blocked) = dr_decisions
                    .as_ref()
                    .and_then(|d| d.iter().find(|d| &d.emp_code == emp_code))
                    .map(|d| (d.consecutive_count, d.is_blocked))
                    .unwrap_or((0, false));
                Candidate {
                    emp_code: emp_code.clone(),
                    current_hours: hours,
                    days_since_last,
                    dr_consecutive_count: dr_count,
                    eligible: !blocked,
                    ineligible_reason: if blocked {
                        Some("DR_BLOCKED".into())
                    } else {
                        None
                    },
                }
            })
            .collect();

        let scoring_booking = ScoringBooking {
            days_to_start,
            duration_hours: (booking.end - booking.start).num_seconds() as f64 / 3600.0,
            is_dr,
        };
        let scoring_policy = ScoringPolicy {
            w_fair: policy.w_fair,
            w_urgency: policy.w_urgency,
            w_lrs: policy.w_lrs,
            dr_consecutive_penalty: policy.dr_consecutive_penalty,
            fairness_window_days: policy.fairness_window_days,
            max_gap_hours: policy.max_gap_hours,
            min_advance_days: policy.min_advance_days,
        };
        let scored = scoring::score_candidates(
            &candidates,
            scoring_booking,
            priority,
            &scoring_policy,
            adjustment_factor,
        );
        let winner = scoring::select_winner(&scored).cloned();

        let Some(winner) = winner else {
            let outcome = RunnerOutcome::Escalated {
                reason: ReasonCode::NoCandidates,
                message: "scorer returned no eligible candidate".into(),
            };
            self.log_escalation(&booking.id, &outcome, start_instant.elapsed().as_millis() as i64)
                .await?;
            return Ok(outcome);
        };

        let breakdown = ScoreBreakdown {
            schema_version: scoring::SCORE_BREAKDOWN_SCHEMA_VERSION,
            candidates: scored.clone(),
            selected_emp_code: Some(winner.emp_code.clone()),
            dr_policy: json!({
                "isDr": is_dr,
                "decisions": dr_decisions.as_ref().map(|d| d.iter().map(|d| json!({
                    "empCode": d.emp_code,
                    "consecutiveCount": d.consecutive_count,
                    "isBlocked": d.is_blocked,
                    "overridden": d.overridden,
                })).collect::<Vec<_>>()),
            }),
        };

        let was_pooled = booking.pool_sub_state != PoolSubState::None;
        self.commit_assignment(&mut booking, &winner, &breakdown, &conflict_summary, was_pooled, start_instant)
            .await
    }

    async fn commit_assignment(
        &self,
        booking: &mut Booking,
        winner: &CandidateScore,
        breakdown: &ScoreBreakdown,
        conflict_summary: &[serde_json::Value],
        was_pooled: bool,
        start_instant: std::time::Instant,
    ) -> Result<RunnerOutcome, EngineError> {
        let mut attempts = 0;
        loop {
            let current = self.db.get_booking(&booking.id)?;
            if current.is_assigned() {
                return Ok(RunnerOutcome::Assigned {
                    interpreter_emp_code: current.interpreter_emp_code.clone().unwrap(),
                    breakdown: breakdown.clone(),
                    no_op: true,
                });
            }
            let mut next = current.clone();
            next.interpreter_emp_code = Some(winner.emp_code.clone());
            next.status = BookingStatus::Approve;
            next.pool_sub_state = if was_pooled {
                PoolSubState::Assigned
            } else {
                PoolSubState::None
            };
            next.updated_at = Utc::now();

            match self.db.update_booking(&next, current.version) {
                Ok(()) => {
                    let log = AssignmentLog {
                        id: Uuid::new_v4().to_string(),
                        booking_id: booking.id.clone(),
                        interpreter_emp_code: Some(winner.emp_code.clone()),
                        outcome: AssignmentOutcome::Assigned,
                        reason: "assigned".into(),
                        score_breakdown: serde_json::to_value(breakdown).unwrap_or_default(),
                        conflict_summary: json!(conflict_summary),
                        dr_decision: breakdown.dr_policy.clone(),
                        duration_ms: start_instant.elapsed().as_millis() as i64,
                        system_snapshot: json!({}),
                        created_at: Utc::now(),
                    };
                    self.db.append_assignment_log(&log)?;
                    if was_pooled {
                        let history = PoolEntryHistory {
                            id: Uuid::new_v4().to_string(),
                            booking_id: booking.id.clone(),
                            action: PoolAction::Processed,
                            previous_state: current.pool_sub_state,
                            new_state: PoolSubState::Assigned,
                            attempts: current.processing_attempts,
                            error_message: None,
                            system_state: json!({}),
                            created_at: Utc::now(),
                        };
                        self.db.append_pool_history(&history)?;
                    }
                    return Ok(RunnerOutcome::Assigned {
                        interpreter_emp_code: winner.emp_code.clone(),
                        breakdown: breakdown.clone(),
                        no_op: false,
                    });
                }
                Err(EngineError::Database(DatabaseError::VersionConflict { .. })) => {
                    attempts += 1;
                    if attempts > 2 {
                        let outcome = RunnerOutcome::Escalated {
                            reason: ReasonCode::ConflictConcurrentUpdate,
                            message: "optimistic version check failed after retries".into(),
                        };
                        self.log_escalation(
                            &booking.id,
                            &outcome,
                            start_instant.elapsed().as_millis() as i64,
                        )
                        .await?;
                        return Ok(outcome);
                    }
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn run_pool(&self, booking: Booking, deadline: DateTime<Utc>) -> Result<RunnerOutcome, EngineError> {
        let mut updated = booking.clone();
        let previous_state = updated.pool_sub_state;
        updated.pool_sub_state = PoolSubState::Waiting;
        updated.pool_entry_time = Some(updated.pool_entry_time.unwrap_or_else(Utc::now));
        updated.pool_deadline_time = Some(deadline);
        updated.updated_at = Utc::now();
        self.db.update_booking(&updated, booking.version)?;

        let history = PoolEntryHistory {
            id: Uuid::new_v4().to_string(),
            booking_id: booking.id.clone(),
            action: PoolAction::Entered,
            previous_state,
            new_state: PoolSubState::Waiting,
            attempts: 0,
            error_message: None,
            system_state: json!({}),
            created_at: Utc::now(),
        };
        self.db.append_pool_history(&history)?;
        Ok(RunnerOutcome::Pooled { deadline })
    }

    async fn log_escalation(
        &self,
        booking_id: &str,
        outcome: &RunnerOutcome,
        duration_ms: i64,
    ) -> Result<(), EngineError> {
        let (reason_code, message) = match outcome {
            RunnerOutcome::Escalated { reason, message } => (*reason, message.clone()),
            _ => return Ok(()),
        };
        let log = AssignmentLog {
            id: Uuid::new_v4().to_string(),
            booking_id: booking_id.to_string(),
            interpreter_emp_code: None,
            outcome: AssignmentOutcome::Escalated,
            reason: format!("{reason_code}: {message}"),
            score_breakdown: json!({}),
            conflict_summary: json!({}),
            dr_decision: json!({}),
            duration_ms,
            system_snapshot: json!({}),
            created_at: Utc::now(),
        };
        self.db.append_assignment_log(&log)?;
        Ok(())
    }
}

enum Route {
    Immediate,
    Pool,
}

fn route_decision(mode: Mode, days_to_start: f64, priority: &MeetingTypePriority) -> Route {
    let u = priority.urgent_threshold_days as f64;
    if mode == Mode::Urgent {
        return Route::Immediate;
    }
    if days_to_start <= u {
        return Route::Immediate;
    }
    Route::Pool
}

/// `deadline = start - urgentThresholdDays`, floored at `now + 1 minute`
/// if that would already be in the past.
fn compute_pool_deadline(start: DateTime<Utc>, urgent_threshold_days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = start - Duration::days(urgent_threshold_days);
    let floor = now + Duration::minutes(1);
    candidate.max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupKind, Mode, PoolSubState};

    fn priority(u: i64, g: i64) -> MeetingTypePriority {
        MeetingTypePriority {
            meeting_type: MeetingType::General,
            priority_value: 5,
            urgent_threshold_days: u,
            general_threshold_days: g,
        }
    }

    #[test]
    fn urgent_mode_always_routes_immediate() {
        assert!(matches!(
            route_decision(Mode::Urgent, 100.0, &priority(3, 30)),
            Route::Immediate
        ));
    }

    #[test]
    fn within_urgent_threshold_routes_immediate() {
        assert!(matches!(
            route_decision(Mode::Normal, 2.0, &priority(3, 30)),
            Route::Immediate
        ));
    }

    #[test]
    fn boundary_at_u_routes_immediate() {
        assert!(matches!(
            route_decision(Mode::Normal, 3.0, &priority(3, 30)),
            Route::Immediate
        ));
    }

    #[test]
    fn beyond_u_routes_pool() {
        assert!(matches!(
            route_decision(Mode::Normal, 3.001, &priority(3, 30)),
            Route::Pool
        ));
    }

    #[test]
    fn deadline_floors_at_now_plus_one_minute_when_past() {
        let now = Utc::now();
        let start = now + Duration::hours(1);
        let deadline = compute_pool_deadline(start, 3, now);
        assert!(deadline >= now + Duration::minutes(1));
    }

    fn sample_booking(id: &str, start: DateTime<Utc>) -> Booking {
        let now = Utc::now();
        Booking {
            id: id.into(),
            group: GroupKind::Other,
            meeting_type: MeetingType::General,
            dr_sub_type: None,
            start,
            end: start + Duration::hours(1),
            status: BookingStatus::Waiting,
            interpreter_emp_code: None,
            pool_sub_state: PoolSubState::None,
            pool_entry_time: None,
            pool_deadline_time: None,
            processing_attempts: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[tokio::test]
    async fn pool_route_inserts_waiting_entry_with_history() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        db.save_policy(&crate::model::Policy {
            mode: Mode::Normal,
            ..crate::model::Policy::default()
        })
        .unwrap();
        db.upsert_priority(&priority(3, 30)).unwrap();
        let booking = sample_booking("bk2", now + Duration::days(15));
        db.insert_booking(&booking).unwrap();

        let runner = Runner::new(db.clone(), EngineConfig::default());
        let outcome = runner.assign_booking("bk2").await.unwrap();
        match outcome {
            RunnerOutcome::Pooled { deadline } => {
                assert!(deadline <= booking.start - Duration::days(3));
            }
            other => panic!("expected Pooled, got {other:?}"),
        }
        let fetched = db.get_booking("bk2").unwrap();
        assert_eq!(fetched.pool_sub_state, PoolSubState::Waiting);
    }

    #[tokio::test]
    async fn immediate_assignment_picks_least_loaded_interpreter() {
        let db = Database::open_memory().unwrap();
        db.save_policy(&crate::model::Policy {
            mode: Mode::Normal,
            ..crate::model::Policy::default()
        })
        .unwrap();
        db.upsert_priority(&priority(3, 30)).unwrap();
        for (emp, days_ago, duration_h) in [("A", 20, 20), ("B", 20, 5), ("C", 20, 12)] {
            let start = Utc::now() - Duration::days(days_ago);
            let mut b = sample_booking(&format!("hist-{emp}"), start);
            b.end = start + Duration::hours(duration_h);
            b.status = BookingStatus::Approve;
            b.interpreter_emp_code = Some(emp.to_string());
            db.insert_booking(&b).unwrap();
        }
        for emp in ["A", "B", "C"] {
            db.upsert_interpreter(&crate::model::Interpreter {
                emp_code: emp.into(),
                active: true,
                first_name: emp.into(),
                last_name: "Test".into(),
                department_path: None,
            })
            .unwrap();
        }
        let booking = sample_booking("bk1", Utc::now() + Duration::days(1));
        db.insert_booking(&booking).unwrap();

        let runner = Runner::new(db.clone(), EngineConfig::default());
        let outcome = runner.assign_booking("bk1").await.unwrap();
        match outcome {
            RunnerOutcome::Assigned { interpreter_emp_code, .. } => {
                assert_eq!(interpreter_emp_code, "B");
            }
            other => panic!("expected Assigned, got {other:?}"),
        }
    }
}
