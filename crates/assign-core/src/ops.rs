//! External interface layer: the `Engine` facade spec §6 describes as the
//! one thing callers (CLI, any future HTTP/RPC shell) talk to. Each method
//! corresponds to one operation in that section; none contain new business
//! logic beyond wiring the already-tested subsystems together.

use chrono::Utc;

use crate::config::EngineConfig;
use crate::conflict::{self, Availability};
use crate::dr::{self, DrHistoryEntry};
use crate::emergency::{EmergencyOverride, EmergencyReport};
use crate::error::{EngineError, ReasonCode};
use crate::fairness;
use crate::model::{Booking, MeetingType, MeetingTypePriority, Mode, Policy};
use crate::policy::{self, PolicyPatch, Warning};
use crate::pool::{PoolProcessor, TickReport};
use crate::recovery::RecoveryManager;
use crate::runner::{Runner, RunnerOutcome};
use crate::scheduler::{Scheduler, SchedulerStatus};
use crate::scoring::{self, Candidate, ScoreBreakdown, ScoringBooking, ScoringPolicy};
use crate::storage::{Database, PoolStats};

/// Aggregate health snapshot returned by `HealthCheck`.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub database_reachable: bool,
    pub pool_stats: Option<PoolStats>,
    pub corrupted_entries: usize,
    pub scheduler_running: bool,
}

/// The engine's single external entry point. Owns the database handle and
/// wires every subsystem together; callers never touch `Runner`, `PoolProcessor`
/// or `Scheduler` directly.
pub struct Engine {
    db: Database,
    config: EngineConfig,
    runner: Runner,
    scheduler: Scheduler,
    emergency: EmergencyOverride,
    recovery: RecoveryManager,
}

impl Engine {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let runner = Runner::new(db.clone(), config.clone());
        let processor = PoolProcessor::new(db.clone(), runner.clone(), config.clone());
        let scheduler = Scheduler::new(db.clone(), processor, config.clone());
        let emergency = EmergencyOverride::new(db.clone(), runner.clone());
        let recovery = RecoveryManager::new(db.clone());
        Self { db, config, runner, scheduler, emergency, recovery }
    }

    // ---- AssignBooking / SuggestCandidates -----------------------------

    pub async fn assign_booking(&self, booking_id: &str) -> Result<RunnerOutcome, EngineError> {
        self.runner.assign_booking(booking_id).await
    }

    /// Dry run of the immediate-path scoring logic: no commit, no pool
    /// entry, no log row. Lets a caller preview a decision before it is
    /// made for real. `max_candidates` caps the returned, already-sorted
    /// `candidates` list; `selected_emp_code` is always the true winner,
    /// computed before the cap is applied.
    pub fn suggest_candidates(&self, booking_id: &str, max_candidates: usize) -> Result<ScoreBreakdown, EngineError> {
        let booking = self.db.get_booking(booking_id)?;
        let policy = self.db.load_policy()?;
        let priority = self
            .db
            .list_priorities()?
            .into_iter()
            .find(|p| p.meeting_type == booking.meeting_type)
            .unwrap_or(MeetingTypePriority {
                meeting_type: booking.meeting_type,
                priority_value: 5,
                urgent_threshold_days: 3,
                general_threshold_days: 30,
            });

        let now = Utc::now();
        let days_to_start = (booking.start - now).num_seconds() as f64 / 86_400.0;

        let interpreters = self.db.active_interpreters()?;
        let mut candidates = Vec::with_capacity(interpreters.len());
        let mut history = Vec::with_capacity(interpreters.len());
        let mut per_interpreter_bookings = Vec::with_capacity(interpreters.len());
        for interpreter in &interpreters {
            let bookings = self.db.bookings_for_interpreter(&interpreter.emp_code)?;
            history.push(DrHistoryEntry {
                emp_code: interpreter.emp_code.clone(),
                last_dr_at: bookings
                    .iter()
                    .filter(|b| b.meeting_type == MeetingType::Dr && b.start < booking.start)
                    .map(|b| b.start)
                    .max(),
            });
            per_interpreter_bookings.push((interpreter.emp_code.clone(), bookings));
        }

        let profile = policy
            .mode
            .dr_policy_profile(policy.dr_consecutive_penalty <= -0.8, policy.dr_consecutive_penalty);
        let dr_decisions = dr::evaluate(&history, profile, booking.start);

        for (interpreter, (emp_code, bookings)) in interpreters.iter().zip(per_interpreter_bookings.iter()) {
            let available = matches!(
                conflict::check_availability(bookings, booking.start, booking.end, Some(booking_id)),
                Availability::Available
            );
            let dr_decision = dr_decisions.iter().find(|d| &d.emp_code == emp_code);
            let blocked = dr_decision.map(|d| d.is_blocked).unwrap_or(false);
            let hours = fairness::hours_in_window(bookings, now, policy.fairness_window_days);
            let last = fairness::last_assigned_at(bookings);
            let days_since_last = fairness::days_since_last(last, now);
            candidates.push(Candidate {
                emp_code: interpreter.emp_code.clone(),
                current_hours: hours,
                days_since_last,
                dr_consecutive_count: dr_decision.map(|d| d.consecutive_count).unwrap_or(0),
                eligible: available && !blocked,
                ineligible_reason: if !available {
                    Some("conflicting booking".into())
                } else if blocked {
                    Some("DR consecutive-assignment block".into())
                } else {
                    None
                },
            });
        }

        let scoring_booking = ScoringBooking {
            days_to_start,
            duration_hours: (booking.end - booking.start).num_seconds() as f64 / 3600.0,
            is_dr: booking.meeting_type == MeetingType::Dr,
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
        let mut scored = scoring::score_candidates(&candidates, scoring_booking, &priority, &scoring_policy, 1.0);
        let selected = scoring::select_winner(&scored).map(|c| c.emp_code.clone());
        scored.truncate(max_candidates);

        Ok(ScoreBreakdown {
            schema_version: scoring::SCORE_BREAKDOWN_SCHEMA_VERSION,
            candidates: scored,
            selected_emp_code: selected,
            dr_policy: serde_json::json!({"mode": format!("{:?}", policy.mode)}),
        })
    }

    // ---- Policy Store ----------------------------------------------------

    pub fn get_policy(&self) -> Result<Policy, EngineError> {
        self.db.load_policy()
    }

    pub fn update_policy(&self, patch: &PolicyPatch) -> Result<Vec<Warning>, EngineError> {
        let mut current = self.db.load_policy()?;
        let warnings = policy::apply_patch(&mut current, patch)?;
        self.db.save_policy(&current)?;
        Ok(warnings)
    }

    pub fn switch_mode(&self, mode: Mode) -> Result<Vec<Warning>, EngineError> {
        self.update_policy(&PolicyPatch {
            mode: Some(mode),
            ..Default::default()
        })
    }

    pub fn list_priorities(&self) -> Result<Vec<MeetingTypePriority>, EngineError> {
        self.db.list_priorities()
    }

    pub fn upsert_priority(&self, priority: &MeetingTypePriority) -> Result<(), EngineError> {
        policy::validate_priority(priority)?;
        self.db.upsert_priority(priority)
    }

    // ---- Pool / Scheduler / Emergency -------------------------------------

    pub fn pool_status(&self) -> Result<PoolStats, EngineError> {
        self.db.pool_stats()
    }

    /// Rejects with `SYSTEM_DEGRADED` while the health check is failing
    /// (unreachable database or any quarantined-pending corrupted entry);
    /// `repair()` clears the underlying condition so the next call through
    /// sees a healthy system again (spec §7).
    pub async fn process_pool_now(&self) -> Result<TickReport, EngineError> {
        let health = self.health_check()?;
        if !health.database_reachable || health.corrupted_entries > 0 {
            return Err(EngineError::domain(
                ReasonCode::SystemDegraded,
                "health check failing: process_pool_now rejected until repaired",
            ));
        }
        self.scheduler.process_now().await
    }

    pub async fn emergency_process(&self, reason: &str, triggered_by: &str) -> Result<EmergencyReport, EngineError> {
        self.emergency.run(reason, triggered_by).await
    }

    pub async fn scheduler_start(&self, interval_override: Option<std::time::Duration>) -> Result<(), EngineError> {
        self.scheduler.start(interval_override).await
    }

    pub async fn scheduler_stop(&self) {
        self.scheduler.stop().await
    }

    pub async fn scheduler_restart(&self, interval_override: Option<std::time::Duration>) -> Result<(), EngineError> {
        self.scheduler.restart(interval_override).await
    }

    pub async fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status().await
    }

    // ---- Error-Recovery Manager --------------------------------------------

    pub fn health_check(&self) -> Result<HealthReport, EngineError> {
        let pool_stats = self.db.pool_stats().ok();
        let corrupted_entries = self.recovery.validate_pool_integrity()?.len();
        Ok(HealthReport {
            database_reachable: pool_stats.is_some(),
            pool_stats,
            corrupted_entries,
            scheduler_running: false,
        })
    }

    pub fn repair(&self) -> Result<crate::recovery::RepairReport, EngineError> {
        self.recovery.repair_all()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Raw access for callers (e.g. the CLI's admin commands) that need the
    /// underlying booking record directly.
    pub fn get_booking(&self, booking_id: &str) -> Result<Booking, EngineError> {
        self.db.get_booking(booking_id)
    }

    pub fn insert_booking(&self, booking: &Booking) -> Result<(), EngineError> {
        self.db.insert_booking(booking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookingStatus, GroupKind, Interpreter};
    use chrono::Duration;

    fn sample_booking(id: &str, start: chrono::DateTime<Utc>) -> Booking {
        Booking {
            id: id.into(),
            group: GroupKind::Other,
            meeting_type: MeetingType::General,
            dr_sub_type: None,
            start,
            end: start + Duration::hours(1),
            status: BookingStatus::Waiting,
            interpreter_emp_code: None,
            pool_sub_state: crate::model::PoolSubState::None,
            pool_entry_time: None,
            pool_deadline_time: None,
            processing_attempts: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 0,
        }
    }

    #[test]
    fn suggest_candidates_does_not_mutate_booking() {
        let db = Database::open_memory().unwrap();
        db.upsert_interpreter(&Interpreter {
            emp_code: "A".into(),
            active: true,
            first_name: "Ann".into(),
            last_name: "Test".into(),
            department_path: None,
        })
        .unwrap();
        let booking = sample_booking("s1", Utc::now() + Duration::days(1));
        db.insert_booking(&booking).unwrap();

        let engine = Engine::new(db.clone(), EngineConfig::default());
        let breakdown = engine.suggest_candidates("s1", usize::MAX).unwrap();
        assert_eq!(breakdown.selected_emp_code, Some("A".into()));

        let unchanged = db.get_booking("s1").unwrap();
        assert!(unchanged.interpreter_emp_code.is_none());
        assert_eq!(unchanged.version, 0);
    }

    #[test]
    fn switch_mode_updates_canonical_vector() {
        let db = Database::open_memory().unwrap();
        let engine = Engine::new(db.clone(), EngineConfig::default());
        engine.switch_mode(Mode::Urgent).unwrap();
        let policy = engine.get_policy().unwrap();
        assert_eq!(policy.mode, Mode::Urgent);
        assert_eq!(policy.fairness_window_days, 14);
    }

    #[test]
    fn health_check_reports_reachable_database() {
        let db = Database::open_memory().unwrap();
        let engine = Engine::new(db, EngineConfig::default());
        let health = engine.health_check().unwrap();
        assert!(health.database_reachable);
        assert_eq!(health.corrupted_entries, 0);
    }

    #[test]
    fn suggest_candidates_caps_returned_list_but_not_the_winner() {
        let db = Database::open_memory().unwrap();
        for code in ["A", "B", "C"] {
            db.upsert_interpreter(&Interpreter {
                emp_code: code.into(),
                active: true,
                first_name: code.into(),
                last_name: "Test".into(),
                department_path: None,
            })
            .unwrap();
        }
        let booking = sample_booking("s2", Utc::now() + Duration::days(1));
        db.insert_booking(&booking).unwrap();

        let engine = Engine::new(db, EngineConfig::default());
        let full = engine.suggest_candidates("s2", usize::MAX).unwrap();
        assert_eq!(full.candidates.len(), 3);

        let capped = engine.suggest_candidates("s2", 1).unwrap();
        assert_eq!(capped.candidates.len(), 1);
        assert_eq!(capped.selected_emp_code, full.selected_emp_code);
    }

    #[tokio::test]
    async fn process_pool_now_rejects_while_degraded_then_recovers_after_repair() {
        let db = Database::open_memory().unwrap();
        let mut corrupted = sample_booking("corrupted", Utc::now() + Duration::days(5));
        corrupted.pool_sub_state = crate::model::PoolSubState::Processing;
        corrupted.pool_entry_time = Some(Utc::now());
        corrupted.pool_deadline_time = Some(Utc::now() - Duration::hours(1));
        db.insert_booking(&corrupted).unwrap();

        let engine = Engine::new(db, EngineConfig::default());
        let health = engine.health_check().unwrap();
        assert_eq!(health.corrupted_entries, 1);

        let err = engine.process_pool_now().await.unwrap_err();
        match err {
            EngineError::Domain { reason, .. } => assert_eq!(reason, ReasonCode::SystemDegraded),
            other => panic!("expected Domain(SystemDegraded), got {other:?}"),
        }

        engine.repair().unwrap();
        assert!(engine.process_pool_now().await.is_ok());
    }
}
