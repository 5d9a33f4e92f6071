//! Fairness Accountant: per-interpreter aggregate hours and recency,
//! grounded on the teacher's `Database::stats_today` aggregation pattern.

use chrono::{DateTime, Duration, Utc};

use crate::model::{Booking, BookingStatus};

/// Sum of `end - start` (in hours) over `interpreter`'s assigned,
/// non-cancelled bookings with `start` in `[now - windowDays, now)`.
pub fn hours_in_window(bookings: &[Booking], now: DateTime<Utc>, window_days: i64) -> f64 {
    let window_start = now - Duration::days(window_days);
    bookings
        .iter()
        .filter(|b| b.status != BookingStatus::Cancel && b.interpreter_emp_code.is_some())
        .filter(|b| b.start >= window_start && b.start < now)
        .map(|b| (b.end - b.start).num_seconds() as f64 / 3600.0)
        .sum()
}

/// The most recent assignment start time for this interpreter's bookings,
/// or `None` if they have never been assigned.
pub fn last_assigned_at(bookings: &[Booking]) -> Option<DateTime<Utc>> {
    bookings
        .iter()
        .filter(|b| b.status != BookingStatus::Cancel && b.interpreter_emp_code.is_some())
        .map(|b| b.start)
        .max()
}

/// Days since `last_assigned_at`, or `+inf` if there is no prior assignment.
pub fn days_since_last(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last {
        Some(t) => (now - t).num_seconds() as f64 / 86_400.0,
        None => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: DateTime<Utc>, end: DateTime<Utc>, status: BookingStatus) -> Booking {
        Booking {
            id: "b".into(),
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
    fn sums_hours_inside_window_only() {
        let now = Utc::now();
        let bookings = vec![
            booking(now - Duration::days(5), now - Duration::days(5) + Duration::hours(3), BookingStatus::Approve),
            booking(now - Duration::days(40), now - Duration::days(40) + Duration::hours(10), BookingStatus::Approve),
        ];
        assert_eq!(hours_in_window(&bookings, now, 7), 3.0);
    }

    #[test]
    fn cancelled_bookings_excluded_from_hours() {
        let now = Utc::now();
        let bookings = vec![booking(
            now - Duration::days(1),
            now - Duration::days(1) + Duration::hours(4),
            BookingStatus::Cancel,
        )];
        assert_eq!(hours_in_window(&bookings, now, 7), 0.0);
    }

    #[test]
    fn no_prior_assignment_is_infinite_days_since() {
        assert_eq!(days_since_last(None, Utc::now()), f64::INFINITY);
    }

    #[test]
    fn last_assigned_at_picks_most_recent_start() {
        let now = Utc::now();
        let bookings = vec![
            booking(now - Duration::days(10), now - Duration::days(10) + Duration::hours(1), BookingStatus::Approve),
            booking(now - Duration::days(2), now - Duration::days(2) + Duration::hours(1), BookingStatus::Approve),
        ];
        let last = last_assigned_at(&bookings).unwrap();
        assert_eq!(last, now - Duration::days(2));
    }
}
