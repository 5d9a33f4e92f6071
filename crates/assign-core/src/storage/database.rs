//! SQLite-backed persistence for all engine entities.
//!
//! Grounded on the teacher's `Database` wrapper (`open`/`open_memory`/
//! `migrate`, RFC3339 TEXT timestamps, `params!` inserts). The connection is
//! wrapped in a `Mutex` behind an `Arc` so the Scheduler, Runner and CLI can
//! share one handle across tokio tasks; the lock is never held across an
//! `.await`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{DatabaseError, EngineError};
use crate::model::{
    AssignmentLog, AssignmentOutcome, Booking, BookingStatus, DrSubType, GroupKind, Interpreter,
    MeetingType, MeetingTypePriority, Mode, Policy, PoolAction, PoolEntryHistory, PoolSubState,
};

use super::migrations;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| {
            EngineError::Database(DatabaseError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })
        })?;
        migrations::migrate(&conn)
            .map_err(|e| EngineError::Database(DatabaseError::MigrationFailed(e.to_string())))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory().map_err(|source| {
            EngineError::Database(DatabaseError::OpenFailed {
                path: std::path::PathBuf::from(":memory:"),
                source,
            })
        })?;
        migrations::migrate(&conn)
            .map_err(|e| EngineError::Database(DatabaseError::MigrationFailed(e.to_string())))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- Bookings ----------------------------------------------------

    pub fn insert_booking(&self, booking: &Booking) -> Result<(), EngineError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO bookings (
                id, group_kind, meeting_type, dr_sub_type, start_time, end_time,
                status, interpreter_emp_code, pool_sub_state, pool_entry_time,
                pool_deadline_time, processing_attempts, created_at, updated_at, version
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                booking.id,
                group_kind_str(booking.group),
                meeting_type_str(booking.meeting_type),
                booking.dr_sub_type.map(dr_sub_type_str),
                booking.start.to_rfc3339(),
                booking.end.to_rfc3339(),
                booking_status_str(booking.status),
                booking.interpreter_emp_code,
                pool_sub_state_str(booking.pool_sub_state),
                booking.pool_entry_time.map(|t| t.to_rfc3339()),
                booking.pool_deadline_time.map(|t| t.to_rfc3339()),
                booking.processing_attempts,
                booking.created_at.to_rfc3339(),
                booking.updated_at.to_rfc3339(),
                booking.version,
            ],
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub fn get_booking(&self, id: &str) -> Result<Booking, EngineError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, group_kind, meeting_type, dr_sub_type, start_time, end_time,
                    status, interpreter_emp_code, pool_sub_state, pool_entry_time,
                    pool_deadline_time, processing_attempts, created_at, updated_at, version
             FROM bookings WHERE id = ?1",
            params![id],
            row_to_booking,
        )
        .optional()
        .map_err(DatabaseError::from)?
        .ok_or_else(|| {
            EngineError::Database(DatabaseError::NotFound {
                entity: "booking",
                id: id.to_string(),
            })
        })
    }

    /// Optimistic-concurrency update: fails with `VersionConflict` if the
    /// row's version no longer matches `expected_version`.
    pub fn update_booking(&self, booking: &Booking, expected_version: i64) -> Result<(), EngineError> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE bookings SET
                    status = ?1, interpreter_emp_code = ?2, pool_sub_state = ?3,
                    pool_entry_time = ?4, pool_deadline_time = ?5, processing_attempts = ?6,
                    updated_at = ?7, version = ?8
                 WHERE id = ?9 AND version = ?10",
                params![
                    booking_status_str(booking.status),
                    booking.interpreter_emp_code,
                    pool_sub_state_str(booking.pool_sub_state),
                    booking.pool_entry_time.map(|t| t.to_rfc3339()),
                    booking.pool_deadline_time.map(|t| t.to_rfc3339()),
                    booking.processing_attempts,
                    booking.updated_at.to_rfc3339(),
                    expected_version + 1,
                    booking.id,
                    expected_version,
                ],
            )
            .map_err(DatabaseError::from)?;
        if changed == 0 {
            return Err(EngineError::Database(DatabaseError::VersionConflict {
                entity: "booking",
                id: booking.id.clone(),
            }));
        }
        Ok(())
    }

    pub fn bookings_for_interpreter(&self, emp_code: &str) -> Result<Vec<Booking>, EngineError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, group_kind, meeting_type, dr_sub_type, start_time, end_time,
                        status, interpreter_emp_code, pool_sub_state, pool_entry_time,
                        pool_deadline_time, processing_attempts, created_at, updated_at, version
                 FROM bookings WHERE interpreter_emp_code = ?1",
            )
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map(params![emp_code], row_to_booking)
            .map_err(DatabaseError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| EngineError::Database(e.into()))
    }

    // ---- Interpreters --------------------------------------------------

    pub fn active_interpreters(&self) -> Result<Vec<Interpreter>, EngineError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT emp_code, active, first_name, last_name, department_path
                 FROM interpreters WHERE active = 1",
            )
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Interpreter {
                    emp_code: row.get(0)?,
                    active: row.get::<_, i64>(1)? != 0,
                    first_name: row.get(2)?,
                    last_name: row.get(3)?,
                    department_path: row.get(4)?,
                })
            })
            .map_err(DatabaseError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| EngineError::Database(e.into()))
    }

    pub fn upsert_interpreter(&self, interpreter: &Interpreter) -> Result<(), EngineError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO interpreters (emp_code, active, first_name, last_name, department_path)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(emp_code) DO UPDATE SET
                active=excluded.active, first_name=excluded.first_name,
                last_name=excluded.last_name, department_path=excluded.department_path",
            params![
                interpreter.emp_code,
                interpreter.active as i64,
                interpreter.first_name,
                interpreter.last_name,
                interpreter.department_path,
            ],
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    // ---- Policy ---------------------------------------------------------

    pub fn load_policy(&self) -> Result<Policy, EngineError> {
        let conn = self.lock();
        let loaded = conn
            .query_row(
                "SELECT mode, w_fair, w_urgency, w_lrs, dr_consecutive_penalty,
                        fairness_window_days, max_gap_hours, min_advance_days,
                        auto_assign_enabled, version
                 FROM policy WHERE id = 1",
                [],
                |row| {
                    Ok(Policy {
                        mode: mode_from_str(&row.get::<_, String>(0)?),
                        w_fair: row.get(1)?,
                        w_urgency: row.get(2)?,
                        w_lrs: row.get(3)?,
                        dr_consecutive_penalty: row.get(4)?,
                        fairness_window_days: row.get(5)?,
                        max_gap_hours: row.get(6)?,
                        min_advance_days: row.get(7)?,
                        auto_assign_enabled: row.get::<_, i64>(8)? != 0,
                        version: row.get(9)?,
                    })
                },
            )
            .optional()
            .map_err(DatabaseError::from)?;
        match loaded {
            Some(p) => Ok(p),
            None => {
                let default = Policy::default();
                self.save_policy(&default)?;
                Ok(default)
            }
        }
    }

    pub fn save_policy(&self, policy: &Policy) -> Result<(), EngineError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO policy (id, mode, w_fair, w_urgency, w_lrs, dr_consecutive_penalty,
                fairness_window_days, max_gap_hours, min_advance_days, auto_assign_enabled, version)
             VALUES (1,?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(id) DO UPDATE SET
                mode=excluded.mode, w_fair=excluded.w_fair, w_urgency=excluded.w_urgency,
                w_lrs=excluded.w_lrs, dr_consecutive_penalty=excluded.dr_consecutive_penalty,
                fairness_window_days=excluded.fairness_window_days,
                max_gap_hours=excluded.max_gap_hours, min_advance_days=excluded.min_advance_days,
                auto_assign_enabled=excluded.auto_assign_enabled, version=excluded.version",
            params![
                mode_str(policy.mode),
                policy.w_fair,
                policy.w_urgency,
                policy.w_lrs,
                policy.dr_consecutive_penalty,
                policy.fairness_window_days,
                policy.max_gap_hours,
                policy.min_advance_days,
                policy.auto_assign_enabled as i64,
                policy.version,
            ],
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    // ---- Meeting-type priorities ----------------------------------------

    pub fn list_priorities(&self) -> Result<Vec<MeetingTypePriority>, EngineError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT meeting_type, priority_value, urgent_threshold_days, general_threshold_days
                 FROM meeting_type_priority",
            )
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MeetingTypePriority {
                    meeting_type: meeting_type_from_str(&row.get::<_, String>(0)?),
                    priority_value: row.get::<_, i64>(1)? as u8,
                    urgent_threshold_days: row.get(2)?,
                    general_threshold_days: row.get(3)?,
                })
            })
            .map_err(DatabaseError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| EngineError::Database(e.into()))
    }

    pub fn upsert_priority(&self, priority: &MeetingTypePriority) -> Result<(), EngineError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO meeting_type_priority
                (meeting_type, priority_value, urgent_threshold_days, general_threshold_days)
             VALUES (?1,?2,?3,?4)
             ON CONFLICT(meeting_type) DO UPDATE SET
                priority_value=excluded.priority_value,
                urgent_threshold_days=excluded.urgent_threshold_days,
                general_threshold_days=excluded.general_threshold_days",
            params![
                meeting_type_str(priority.meeting_type),
                priority.priority_value,
                priority.urgent_threshold_days,
                priority.general_threshold_days,
            ],
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    // ---- Append-only logs ------------------------------------------------

    pub fn append_assignment_log(&self, log: &AssignmentLog) -> Result<(), EngineError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO assignment_log (
                id, booking_id, interpreter_emp_code, outcome, reason, score_breakdown,
                conflict_summary, dr_decision, duration_ms, system_snapshot, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                log.id,
                log.booking_id,
                log.interpreter_emp_code,
                assignment_outcome_str(log.outcome),
                log.reason,
                log.score_breakdown.to_string(),
                log.conflict_summary.to_string(),
                log.dr_decision.to_string(),
                log.duration_ms,
                log.system_snapshot.to_string(),
                log.created_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub fn append_pool_history(&self, entry: &PoolEntryHistory) -> Result<(), EngineError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO pool_entry_history (
                id, booking_id, action, previous_state, new_state, attempts,
                error_message, system_state, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                entry.id,
                entry.booking_id,
                pool_action_str(entry.action),
                pool_sub_state_str(entry.previous_state),
                pool_sub_state_str(entry.new_state),
                entry.attempts,
                entry.error_message,
                entry.system_state.to_string(),
                entry.created_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    // ---- Pool queries (Pool Store) --------------------------------------

    /// Entries with `deadline <= now + lookahead` and sub-state `waiting`,
    /// ordered by priority bucket then raw deadline (priority key is
    /// computed by `crate::pool`, this just returns candidates).
    pub fn pool_waiting_within(
        &self,
        now: DateTime<Utc>,
        lookahead_secs: i64,
        limit: usize,
    ) -> Result<Vec<Booking>, EngineError> {
        let conn = self.lock();
        let cutoff = now + chrono::Duration::seconds(lookahead_secs);
        let mut stmt = conn
            .prepare(
                "SELECT id, group_kind, meeting_type, dr_sub_type, start_time, end_time,
                        status, interpreter_emp_code, pool_sub_state, pool_entry_time,
                        pool_deadline_time, processing_attempts, created_at, updated_at, version
                 FROM bookings
                 WHERE pool_sub_state = 'waiting' AND pool_deadline_time <= ?1
                 LIMIT ?2",
            )
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map(params![cutoff.to_rfc3339(), limit as i64], row_to_booking)
            .map_err(DatabaseError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| EngineError::Database(e.into()))
    }

    pub fn all_pool_entries(&self) -> Result<Vec<Booking>, EngineError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, group_kind, meeting_type, dr_sub_type, start_time, end_time,
                        status, interpreter_emp_code, pool_sub_state, pool_entry_time,
                        pool_deadline_time, processing_attempts, created_at, updated_at, version
                 FROM bookings WHERE pool_sub_state != 'none'",
            )
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map([], row_to_booking)
            .map_err(DatabaseError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| EngineError::Database(e.into()))
    }

    /// Atomic `waiting -> processing` transition, compare-and-swap on
    /// `(id, version, pool_sub_state = 'waiting')`.
    pub fn claim_pool_entry(&self, id: &str, expected_version: i64) -> Result<bool, EngineError> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE bookings SET pool_sub_state = 'processing', version = ?1, updated_at = ?2
                 WHERE id = ?3 AND version = ?4 AND pool_sub_state = 'waiting'",
                params![
                    expected_version + 1,
                    Utc::now().to_rfc3339(),
                    id,
                    expected_version
                ],
            )
            .map_err(DatabaseError::from)?;
        Ok(changed == 1)
    }

    pub fn pool_stats(&self) -> Result<PoolStats, EngineError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT pool_sub_state, COUNT(*) FROM bookings
                 WHERE pool_sub_state != 'none' GROUP BY pool_sub_state",
            )
            .map_err(DatabaseError::from)?;
        let rows: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(DatabaseError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::Database(e.into()))?;
        let mut stats = PoolStats::default();
        for (state, count) in rows {
            match state.as_str() {
                "waiting" => stats.waiting = count,
                "ready" => stats.ready = count,
                "processing" => stats.processing = count,
                "assigned" => stats.assigned = count,
                "escalated" => stats.escalated = count,
                "failed" => stats.failed = count,
                _ => {}
            }
        }
        let oldest: Option<String> = conn
            .query_row(
                "SELECT pool_entry_time FROM bookings
                 WHERE pool_sub_state NOT IN ('none','assigned','escalated')
                 ORDER BY pool_entry_time ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::from)?;
        stats.oldest_entry = oldest.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc));
        Ok(stats)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub waiting: i64,
    pub ready: i64,
    pub processing: i64,
    pub assigned: i64,
    pub escalated: i64,
    pub failed: i64,
    pub oldest_entry: Option<DateTime<Utc>>,
}

fn row_to_booking(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        group: group_kind_from_str(&row.get::<_, String>(1)?),
        meeting_type: meeting_type_from_str(&row.get::<_, String>(2)?),
        dr_sub_type: row.get::<_, Option<String>>(3)?.as_deref().map(dr_sub_type_from_str),
        start: parse_dt(&row.get::<_, String>(4)?),
        end: parse_dt(&row.get::<_, String>(5)?),
        status: booking_status_from_str(&row.get::<_, String>(6)?),
        interpreter_emp_code: row.get(7)?,
        pool_sub_state: pool_sub_state_from_str(&row.get::<_, String>(8)?),
        pool_entry_time: row.get::<_, Option<String>>(9)?.map(|s| parse_dt(&s)),
        pool_deadline_time: row.get::<_, Option<String>>(10)?.map(|s| parse_dt(&s)),
        processing_attempts: row.get::<_, i64>(11)? as u32,
        created_at: parse_dt(&row.get::<_, String>(12)?),
        updated_at: parse_dt(&row.get::<_, String>(13)?),
        version: row.get(14)?,
    })
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn group_kind_str(g: GroupKind) -> &'static str {
    match g {
        GroupKind::Iot => "iot",
        GroupKind::Hardware => "hardware",
        GroupKind::Software => "software",
        GroupKind::Other => "other",
    }
}
fn group_kind_from_str(s: &str) -> GroupKind {
    match s {
        "iot" => GroupKind::Iot,
        "hardware" => GroupKind::Hardware,
        "software" => GroupKind::Software,
        _ => GroupKind::Other,
    }
}

fn meeting_type_str(m: MeetingType) -> &'static str {
    match m {
        MeetingType::Dr => "DR",
        MeetingType::Vip => "VIP",
        MeetingType::Weekly => "Weekly",
        MeetingType::General => "General",
        MeetingType::Urgent => "Urgent",
        MeetingType::President => "President",
        MeetingType::Other => "Other",
    }
}
fn meeting_type_from_str(s: &str) -> MeetingType {
    match s {
        "DR" => MeetingType::Dr,
        "VIP" => MeetingType::Vip,
        "Weekly" => MeetingType::Weekly,
        "General" => MeetingType::General,
        "Urgent" => MeetingType::Urgent,
        "President" => MeetingType::President,
        _ => MeetingType::Other,
    }
}

fn dr_sub_type_str(d: DrSubType) -> &'static str {
    match d {
        DrSubType::DrI => "DR-I",
        DrSubType::DrII => "DR-II",
        DrSubType::DrK => "DR-k",
        DrSubType::DrPr => "DR-PR",
        DrSubType::Other => "Other",
    }
}
fn dr_sub_type_from_str(s: &str) -> DrSubType {
    match s {
        "DR-I" => DrSubType::DrI,
        "DR-II" => DrSubType::DrII,
        "DR-k" => DrSubType::DrK,
        "DR-PR" => DrSubType::DrPr,
        _ => DrSubType::Other,
    }
}

fn booking_status_str(s: BookingStatus) -> &'static str {
    match s {
        BookingStatus::Waiting => "waiting",
        BookingStatus::Approve => "approve",
        BookingStatus::Cancel => "cancel",
    }
}
fn booking_status_from_str(s: &str) -> BookingStatus {
    match s {
        "approve" => BookingStatus::Approve,
        "cancel" => BookingStatus::Cancel,
        _ => BookingStatus::Waiting,
    }
}

fn pool_sub_state_str(p: PoolSubState) -> &'static str {
    match p {
        PoolSubState::None => "none",
        PoolSubState::Waiting => "waiting",
        PoolSubState::Ready => "ready",
        PoolSubState::Processing => "processing",
        PoolSubState::Assigned => "assigned",
        PoolSubState::Escalated => "escalated",
        PoolSubState::Failed => "failed",
    }
}
fn pool_sub_state_from_str(s: &str) -> PoolSubState {
    match s {
        "waiting" => PoolSubState::Waiting,
        "ready" => PoolSubState::Ready,
        "processing" => PoolSubState::Processing,
        "assigned" => PoolSubState::Assigned,
        "escalated" => PoolSubState::Escalated,
        "failed" => PoolSubState::Failed,
        _ => PoolSubState::None,
    }
}

fn mode_str(m: Mode) -> &'static str {
    match m {
        Mode::Balance => "BALANCE",
        Mode::Urgent => "URGENT",
        Mode::Normal => "NORMAL",
        Mode::Custom => "CUSTOM",
    }
}
fn mode_from_str(s: &str) -> Mode {
    match s {
        "BALANCE" => Mode::Balance,
        "URGENT" => Mode::Urgent,
        "CUSTOM" => Mode::Custom,
        _ => Mode::Normal,
    }
}

fn assignment_outcome_str(o: AssignmentOutcome) -> &'static str {
    match o {
        AssignmentOutcome::Assigned => "assigned",
        AssignmentOutcome::Escalated => "escalated",
        AssignmentOutcome::Rejected => "rejected",
    }
}

fn pool_action_str(a: PoolAction) -> &'static str {
    match a {
        PoolAction::Entered => "entered",
        PoolAction::Updated => "updated",
        PoolAction::Processed => "processed",
        PoolAction::Failed => "failed",
        PoolAction::Retried => "retried",
        PoolAction::Escalated => "escalated",
    }
}
