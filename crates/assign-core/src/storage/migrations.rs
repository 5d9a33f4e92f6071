//! Database schema migrations for the assignment engine.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration
//! version, mirroring the teacher's sequential `migrate_vN` pattern.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current
/// schema version.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;
    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            0
        } else {
            tracing::warn!(error = %e, "failed to read schema_version");
            0
        }
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: bookings, interpreters, policy, meeting-type priorities,
/// and the two append-only audit logs.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            group_kind TEXT NOT NULL,
            meeting_type TEXT NOT NULL,
            dr_sub_type TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            status TEXT NOT NULL,
            interpreter_emp_code TEXT,
            pool_sub_state TEXT NOT NULL DEFAULT 'none',
            pool_entry_time TEXT,
            pool_deadline_time TEXT,
            processing_attempts INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_bookings_start_time ON bookings(start_time);
        CREATE INDEX IF NOT EXISTS idx_bookings_interpreter_start
            ON bookings(interpreter_emp_code, start_time);
        CREATE INDEX IF NOT EXISTS idx_bookings_pool
            ON bookings(pool_sub_state, pool_deadline_time);

        CREATE TABLE IF NOT EXISTS interpreters (
            emp_code TEXT PRIMARY KEY,
            active INTEGER NOT NULL DEFAULT 1,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            department_path TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_interpreters_active ON interpreters(active);

        CREATE TABLE IF NOT EXISTS policy (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            mode TEXT NOT NULL,
            w_fair REAL NOT NULL,
            w_urgency REAL NOT NULL,
            w_lrs REAL NOT NULL,
            dr_consecutive_penalty REAL NOT NULL,
            fairness_window_days INTEGER NOT NULL,
            max_gap_hours REAL NOT NULL,
            min_advance_days INTEGER NOT NULL,
            auto_assign_enabled INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS meeting_type_priority (
            meeting_type TEXT PRIMARY KEY,
            priority_value INTEGER NOT NULL,
            urgent_threshold_days INTEGER NOT NULL,
            general_threshold_days INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS assignment_log (
            id TEXT PRIMARY KEY,
            booking_id TEXT NOT NULL,
            interpreter_emp_code TEXT,
            outcome TEXT NOT NULL,
            reason TEXT NOT NULL,
            score_breakdown TEXT NOT NULL,
            conflict_summary TEXT NOT NULL,
            dr_decision TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            system_snapshot TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_assignment_log_booking ON assignment_log(booking_id);
        CREATE INDEX IF NOT EXISTS idx_assignment_log_created_at
            ON assignment_log(created_at DESC);

        CREATE TABLE IF NOT EXISTS pool_entry_history (
            id TEXT PRIMARY KEY,
            booking_id TEXT NOT NULL,
            action TEXT NOT NULL,
            previous_state TEXT NOT NULL,
            new_state TEXT NOT NULL,
            attempts INTEGER NOT NULL,
            error_message TEXT,
            system_state TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_pool_history_booking_created
            ON pool_entry_history(booking_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_pool_history_action ON pool_entry_history(action);
        ",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: reserved for the next schema change. Currently a no-op
/// placeholder so the version counter stays monotonic as the engine grows.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    set_schema_version(conn, 2)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        let version = get_schema_version(&conn);
        assert_eq!(version, 2);
    }

    #[test]
    fn migrate_creates_expected_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        for expected in [
            "bookings",
            "interpreters",
            "policy",
            "meeting_type_priority",
            "assignment_log",
            "pool_entry_history",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }
}
