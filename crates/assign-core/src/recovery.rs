//! Error-Recovery Manager: detects stuck, over-retried, or corrupted pool
//! entries and repairs them. Categorisation by error-message keyword affects
//! only reporting, not correctness (spec §4.12).

use chrono::{Duration, Utc};
use serde_json::json;

use crate::error::EngineError;
use crate::model::{Booking, PoolAction, PoolEntryHistory, PoolSubState};
use crate::storage::Database;

const STUCK_PROCESSING_AGE: Duration = Duration::hours(1);
const EXCESSIVE_RETRY_THRESHOLD: u32 = 6;

/// Non-authoritative bucket for an error message, used only in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Timeout,
    Network,
    Conflict,
    Invalid,
    Business,
    Unknown,
}

pub fn categorize(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains("timeout") {
        ErrorCategory::Timeout
    } else if lower.contains("network") {
        ErrorCategory::Network
    } else if lower.contains("conflict") {
        ErrorCategory::Conflict
    } else if lower.contains("invalid") {
        ErrorCategory::Invalid
    } else if lower.contains("business") {
        ErrorCategory::Business
    } else {
        ErrorCategory::Unknown
    }
}

/// Why a booking failed its corruption check, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionReason {
    DeadlineBeforeEntry,
    DeadlineAfterStart,
    EndNotAfterStart,
}

/// Checks the invariants a pool entry must satisfy; `None` means healthy.
pub fn check_corruption(booking: &Booking) -> Option<CorruptionReason> {
    if let (Some(deadline), Some(entry)) = (booking.pool_deadline_time, booking.pool_entry_time) {
        if deadline < entry {
            return Some(CorruptionReason::DeadlineBeforeEntry);
        }
        if deadline > booking.start {
            return Some(CorruptionReason::DeadlineAfterStart);
        }
    }
    if booking.end <= booking.start {
        return Some(CorruptionReason::EndNotAfterStart);
    }
    None
}

#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub reset_stuck_processing: Vec<String>,
    pub reset_excessive_retries: Vec<String>,
    pub quarantined_corrupted: Vec<(String, String)>,
}

pub struct RecoveryManager {
    db: Database,
}

impl RecoveryManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// `processing` entries older than one hour are reset to `waiting`.
    pub fn cleanup_stuck_processing(&self) -> Result<Vec<String>, EngineError> {
        let now = Utc::now();
        let mut reset = Vec::new();
        for booking in self.db.all_pool_entries()? {
            if booking.pool_sub_state != PoolSubState::Processing {
                continue;
            }
            if now - booking.updated_at > STUCK_PROCESSING_AGE {
                self.transition(&booking, PoolSubState::Waiting, PoolAction::Retried, "stuck processing reset")?;
                reset.push(booking.id);
            }
        }
        Ok(reset)
    }

    /// Entries with `processingAttempts > 6` are reset to `waiting` with a
    /// cleared attempt counter and flagged for admin review.
    pub fn reset_excessive_retries(&self) -> Result<Vec<String>, EngineError> {
        let mut reset = Vec::new();
        for booking in self.db.all_pool_entries()? {
            if booking.processing_attempts > EXCESSIVE_RETRY_THRESHOLD {
                let mut updated = booking.clone();
                updated.processing_attempts = 0;
                updated.pool_sub_state = PoolSubState::Waiting;
                updated.updated_at = Utc::now();
                self.db.update_booking(&updated, booking.version)?;
                self.db.append_pool_history(&PoolEntryHistory {
                    id: uuid::Uuid::new_v4().to_string(),
                    booking_id: booking.id.clone(),
                    action: PoolAction::Retried,
                    previous_state: booking.pool_sub_state,
                    new_state: PoolSubState::Waiting,
                    attempts: 0,
                    error_message: Some("excessive retries, flagged for admin review".into()),
                    system_state: json!({"needsAdminReview": true}),
                    created_at: Utc::now(),
                })?;
                reset.push(booking.id);
            }
        }
        Ok(reset)
    }

    /// Removes entries from the pool (never the booking) whose invariants
    /// are violated.
    pub fn cleanup_corrupted(&self) -> Result<Vec<(String, String)>, EngineError> {
        let mut quarantined = Vec::new();
        for booking in self.db.all_pool_entries()? {
            if let Some(reason) = check_corruption(&booking) {
                let message = format!("{reason:?}");
                let mut updated = booking.clone();
                updated.pool_sub_state = PoolSubState::None;
                updated.pool_deadline_time = None;
                updated.pool_entry_time = None;
                updated.updated_at = Utc::now();
                self.db.update_booking(&updated, booking.version)?;
                self.db.append_pool_history(&PoolEntryHistory {
                    id: uuid::Uuid::new_v4().to_string(),
                    booking_id: booking.id.clone(),
                    action: PoolAction::Failed,
                    previous_state: booking.pool_sub_state,
                    new_state: PoolSubState::None,
                    attempts: booking.processing_attempts,
                    error_message: Some(message.clone()),
                    system_state: json!({"quarantined": true}),
                    created_at: Utc::now(),
                })?;
                quarantined.push((booking.id, message));
            }
        }
        Ok(quarantined)
    }

    pub fn retry_failed_entries(&self) -> Result<Vec<String>, EngineError> {
        let mut reset = Vec::new();
        for booking in self.db.all_pool_entries()? {
            if booking.pool_sub_state == PoolSubState::Failed {
                self.transition(&booking, PoolSubState::Waiting, PoolAction::Retried, "manual retry")?;
                reset.push(booking.id);
            }
        }
        Ok(reset)
    }

    pub fn validate_pool_integrity(&self) -> Result<Vec<(String, CorruptionReason)>, EngineError> {
        Ok(self
            .db
            .all_pool_entries()?
            .iter()
            .filter_map(|b| check_corruption(b).map(|r| (b.id.clone(), r)))
            .collect())
    }

    /// Runs all four repair operations in sequence, as `Repair` would for an
    /// unqualified admin request.
    pub fn repair_all(&self) -> Result<RepairReport, EngineError> {
        Ok(RepairReport {
            reset_stuck_processing: self.cleanup_stuck_processing()?,
            reset_excessive_retries: self.reset_excessive_retries()?,
            quarantined_corrupted: self.cleanup_corrupted()?,
        })
    }

    fn transition(
        &self,
        booking: &Booking,
        new_state: PoolSubState,
        action: PoolAction,
        message: &str,
    ) -> Result<(), EngineError> {
        let mut updated = booking.clone();
        updated.pool_sub_state = new_state;
        updated.updated_at = Utc::now();
        self.db.update_booking(&updated, booking.version)?;
        self.db.append_pool_history(&PoolEntryHistory {
            id: uuid::Uuid::new_v4().to_string(),
            booking_id: booking.id.clone(),
            action,
            previous_state: booking.pool_sub_state,
            new_state,
            attempts: booking.processing_attempts,
            error_message: Some(message.to_string()),
            system_state: json!({}),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupKind, MeetingType};

    fn base_booking(id: &str) -> Booking {
        let now = Utc::now();
        Booking {
            id: id.into(),
            group: GroupKind::Other,
            meeting_type: MeetingType::General,
            dr_sub_type: None,
            start: now + Duration::days(10),
            end: now + Duration::days(10) + Duration::hours(1),
            status: crate::model::BookingStatus::Waiting,
            interpreter_emp_code: None,
            pool_sub_state: PoolSubState::Processing,
            pool_entry_time: Some(now),
            pool_deadline_time: Some(now + Duration::days(9)),
            processing_attempts: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[test]
    fn stuck_processing_entries_are_reset() {
        let db = Database::open_memory().unwrap();
        let mut booking = base_booking("stuck");
        booking.updated_at = Utc::now() - Duration::hours(2);
        db.insert_booking(&booking).unwrap();

        let manager = RecoveryManager::new(db.clone());
        let reset = manager.cleanup_stuck_processing().unwrap();
        assert_eq!(reset, vec!["stuck".to_string()]);
        assert_eq!(db.get_booking("stuck").unwrap().pool_sub_state, PoolSubState::Waiting);
    }

    #[test]
    fn recent_processing_entries_are_untouched() {
        let db = Database::open_memory().unwrap();
        db.insert_booking(&base_booking("fresh")).unwrap();
        let manager = RecoveryManager::new(db.clone());
        assert!(manager.cleanup_stuck_processing().unwrap().is_empty());
    }

    #[test]
    fn corrupted_entry_is_quarantined_not_deleted() {
        let db = Database::open_memory().unwrap();
        let mut booking = base_booking("bad");
        booking.pool_deadline_time = Some(booking.pool_entry_time.unwrap() - Duration::hours(1));
        db.insert_booking(&booking).unwrap();

        let manager = RecoveryManager::new(db.clone());
        let quarantined = manager.cleanup_corrupted().unwrap();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(quarantined[0].1, "DeadlineBeforeEntry");
        assert!(db.get_booking("bad").is_ok());
        assert_eq!(db.get_booking("bad").unwrap().pool_sub_state, PoolSubState::None);
    }

    #[test]
    fn categorize_matches_keywords() {
        assert_eq!(categorize("request timeout"), ErrorCategory::Timeout);
        assert_eq!(categorize("network unreachable"), ErrorCategory::Network);
        assert_eq!(categorize("version conflict"), ErrorCategory::Conflict);
        assert_eq!(categorize("no such thing"), ErrorCategory::Unknown);
    }
}
