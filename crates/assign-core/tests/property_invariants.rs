//! Property tests for invariants that must hold for *any* input, not just
//! the handful of cases covered by example-based unit tests.

use assign_core::conflict::{check_availability, Availability, ConflictType};
use assign_core::model::{Booking, BookingStatus, GroupKind, MeetingType, PoolSubState};
use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

fn booking_at(id: &str, start_offset_mins: i64, duration_mins: i64) -> Booking {
    let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
    let start = base + Duration::minutes(start_offset_mins);
    Booking {
        id: id.into(),
        group: GroupKind::Other,
        meeting_type: MeetingType::General,
        dr_sub_type: None,
        start,
        end: start + Duration::minutes(duration_mins.max(1)),
        status: BookingStatus::Approve,
        interpreter_emp_code: Some("A".into()),
        pool_sub_state: PoolSubState::None,
        pool_entry_time: None,
        pool_deadline_time: None,
        processing_attempts: 0,
        created_at: start,
        updated_at: start,
        version: 0,
    }
}

proptest! {
    /// Conflict detection is symmetric: checking [s1,e1) against an
    /// existing [s2,e2) agrees with checking [s2,e2) against [s1,e1).
    #[test]
    fn conflict_check_is_symmetric(
        s1 in 0i64..10_000, d1 in 1i64..500,
        s2 in 0i64..10_000, d2 in 1i64..500,
    ) {
        let a = booking_at("a", s1, d1);
        let b = booking_at("b", s2, d2);

        let a_vs_b = check_availability(&[b.clone()], a.start, a.end, None);
        let b_vs_a = check_availability(&[a], b.start, b.end, None);

        let a_conflicted = matches!(a_vs_b, Availability::Conflicted(_));
        let b_conflicted = matches!(b_vs_a, Availability::Conflicted(_));
        prop_assert_eq!(a_conflicted, b_conflicted);
    }

    /// A booking never conflicts with itself when excluded by id, regardless
    /// of the interval chosen.
    #[test]
    fn self_exclusion_always_clears_conflict(s in 0i64..10_000, d in 1i64..500) {
        let existing = booking_at("self", s, d);
        let result = check_availability(&[existing.clone()], existing.start, existing.end, Some("self"));
        prop_assert!(matches!(result, Availability::Available));
    }

    /// Exact adjacency (end of one == start of the other) is never reported
    /// as a conflict, no matter the surrounding durations.
    #[test]
    fn adjacent_intervals_never_conflict(d1 in 1i64..1000, d2 in 1i64..1000) {
        let first = booking_at("first", 0, d1);
        let second_start_offset = d1;
        let second = booking_at("second", second_start_offset, d2);

        let result = check_availability(&[first], second.start, second.end, None);
        prop_assert!(matches!(result, Availability::Available));
    }

    /// Any reported conflict is classified as exactly one of
    /// `Contained`/`Overlap` -- never left unclassified -- and `Contained`
    /// only fires when one interval truly encloses the other.
    #[test]
    fn conflicted_pairs_are_consistently_classified(
        s1 in 0i64..10_000, d1 in 1i64..500,
        s2 in 0i64..10_000, d2 in 1i64..500,
    ) {
        let a = booking_at("a", s1, d1);
        let b = booking_at("b", s2, d2);
        if let Availability::Conflicted(conflicts) = check_availability(&[b.clone()], a.start, a.end, None) {
            let c = &conflicts[0];
            if c.conflict_type == ConflictType::Contained {
                let contained = (a.start <= b.start && b.end <= a.end) || (b.start <= a.start && a.end <= b.end);
                prop_assert!(contained);
            }
        }
    }
}
