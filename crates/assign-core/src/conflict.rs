//! Conflict Detector: at-most-one-concurrent-booking-per-interpreter.
//!
//! Grounded on the teacher's `CalendarEvent::overlaps` half-open interval
//! test, generalized with the classification and batch-availability forms
//! the Runner needs.

use chrono::{DateTime, Utc};

use crate::model::{Booking, BookingStatus};

/// The kind of conflict between two time intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    Overlap,
    Contained,
    Adjacent,
}

/// A single conflicting booking.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub other_booking_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub conflict_type: ConflictType,
}

/// Result of a single-interpreter availability check.
#[derive(Debug, Clone)]
pub enum Availability {
    Available,
    Conflicted(Vec<Conflict>),
}

/// Two half-open intervals `[s1,e1)` and `[s2,e2)` are in conflict iff
/// `s1 < e2 && s2 < e1`. Exact adjacency (`e1 == s2` or `e2 == s1`) is not
/// a conflict.
fn intervals_conflict(s1: DateTime<Utc>, e1: DateTime<Utc>, s2: DateTime<Utc>, e2: DateTime<Utc>) -> bool {
    s1 < e2 && s2 < e1
}

/// Classifies a conflicting pair. One interval lies entirely within the
/// other (including exact equality) -> `CONTAINED`; otherwise `OVERLAP`.
/// `ADJACENT` is never returned by this function -- it is reserved for
/// describing non-conflicting boundary touches, which callers detect
/// separately via `is_adjacent`.
fn classify(s1: DateTime<Utc>, e1: DateTime<Utc>, s2: DateTime<Utc>, e2: DateTime<Utc>) -> ConflictType {
    let contained = (s1 <= s2 && e2 <= e1) || (s2 <= s1 && e1 <= e2);
    if contained {
        ConflictType::Contained
    } else {
        ConflictType::Overlap
    }
}

pub fn is_adjacent(s1: DateTime<Utc>, e1: DateTime<Utc>, s2: DateTime<Utc>, e2: DateTime<Utc>) -> bool {
    e1 == s2 || e2 == s1
}

/// Checks one interpreter's existing bookings (already filtered to that
/// interpreter) against a candidate `[start, end)`, excluding a booking id
/// (used when re-checking a booking against itself) and all cancelled
/// bookings.
pub fn check_availability(
    existing: &[Booking],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_booking_id: Option<&str>,
) -> Availability {
    let mut conflicts = Vec::new();
    for booking in existing {
        if booking.is_cancelled() {
            continue;
        }
        if booking.status == BookingStatus::Cancel {
            continue;
        }
        if let Some(exclude) = exclude_booking_id {
            if booking.id == exclude {
                continue;
            }
        }
        if intervals_conflict(start, end, booking.start, booking.end) {
            conflicts.push(Conflict {
                other_booking_id: booking.id.clone(),
                start: booking.start,
                end: booking.end,
                conflict_type: classify(start, end, booking.start, booking.end),
            });
        }
    }
    if conflicts.is_empty() {
        Availability::Available
    } else {
        Availability::Conflicted(conflicts)
    }
}

/// Batch form: given each interpreter's existing non-cancelled bookings
/// (as `(emp_code, bookings)` pairs), returns the subset of emp codes with
/// no conflict against `[start, end)`. This is the Runner's hot path.
pub fn availability<'a>(
    interpreter_bookings: &'a [(String, Vec<Booking>)],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<&'a str> {
    interpreter_bookings
        .iter()
        .filter_map(|(emp_code, bookings)| {
            match check_availability(bookings, start, end, None) {
                Availability::Available => Some(emp_code.as_str()),
                Availability::Conflicted(_) => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc::now() + Duration::hours(hour)
    }

    fn booking(id: &str, start: DateTime<Utc>, end: DateTime<Utc>, status: BookingStatus) -> Booking {
        Booking {
            id: id.into(),
            group: crate::model::GroupKind::Other,
            meeting_type: crate::model::MeetingType::General,
            dr_sub_type: None,
            start,
            end,
            status,
            interpreter_emp_code: Some("A".into()),
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
    fn adjacency_is_not_a_conflict() {
        let existing = vec![booking("b1", at(0), at(1), BookingStatus::Approve)];
        let result = check_availability(&existing, at(1), at(2), None);
        assert!(matches!(result, Availability::Available));
    }

    #[test]
    fn equal_intervals_are_contained() {
        let existing = vec![booking("b1", at(0), at(1), BookingStatus::Approve)];
        match check_availability(&existing, at(0), at(1), None) {
            Availability::Conflicted(conflicts) => {
                assert_eq!(conflicts[0].conflict_type, ConflictType::Contained);
            }
            Availability::Available => panic!("expected conflict"),
        }
    }

    #[test]
    fn partial_overlap_is_overlap() {
        let existing = vec![booking("b1", at(0), at(2), BookingStatus::Approve)];
        match check_availability(&existing, at(1), at(3), None) {
            Availability::Conflicted(conflicts) => {
                assert_eq!(conflicts[0].conflict_type, ConflictType::Overlap);
            }
            Availability::Available => panic!("expected conflict"),
        }
    }

    #[test]
    fn cancelled_bookings_are_ignored() {
        let existing = vec![booking("b1", at(0), at(2), BookingStatus::Cancel)];
        let result = check_availability(&existing, at(0), at(2), None);
        assert!(matches!(result, Availability::Available));
    }

    #[test]
    fn excluded_booking_id_is_ignored() {
        let existing = vec![booking("b1", at(0), at(2), BookingStatus::Approve)];
        let result = check_availability(&existing, at(0), at(2), Some("b1"));
        assert!(matches!(result, Availability::Available));
    }
}
