//! Dynamic Pool Manager: detects changes in the active interpreter set
//! between Runner invocations and produces a fairness adjustment directive.

use std::collections::HashSet;

/// Result of comparing the active interpreter set against the last
/// observed one.
#[derive(Debug, Clone)]
pub struct PoolAdjustment {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub significant: bool,
    pub adjustment_factor: f64,
    pub should_recalculate: bool,
}

/// Median of a slice of hours, used to seed newly added interpreters so
/// they don't appear artificially under-loaded relative to incumbents.
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Computes `{added, removed}` against `previous`, and -- when the change
/// is significant -- an `adjustmentFactor` in `[0.5, 2.0]`.
///
/// A change is significant if `|added ∪ removed| >= max(1, 0.1 * |previous|)`.
pub fn evaluate(previous: &[String], current: &[String]) -> PoolAdjustment {
    let previous_set: HashSet<&str> = previous.iter().map(String::as_str).collect();
    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();

    let added: Vec<String> = current_set
        .difference(&previous_set)
        .map(|s| s.to_string())
        .collect();
    let removed: Vec<String> = previous_set
        .difference(&current_set)
        .map(|s| s.to_string())
        .collect();

    let changed = added.len() + removed.len();
    let threshold = (0.1 * previous.len() as f64).max(1.0);
    let significant = changed as f64 >= threshold;

    let adjustment_factor = if significant && !previous.is_empty() {
        let delta = added.len() as f64 - removed.len() as f64;
        (1.0 + 0.25 * delta / previous.len() as f64).clamp(0.5, 2.0)
    } else {
        1.0
    };

    PoolAdjustment {
        added,
        removed,
        significant,
        adjustment_factor,
        should_recalculate: significant,
    }
}

/// Seed hours for a newly added interpreter: the median of the previous
/// cohort's current hours, to avoid starving historical staff.
pub fn seed_hours_for_new_interpreter(previous_hours: &[f64]) -> f64 {
    median(previous_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_change_is_not_significant() {
        let prev = vec!["A".to_string(), "B".to_string()];
        let result = evaluate(&prev, &prev);
        assert!(!result.significant);
        assert_eq!(result.adjustment_factor, 1.0);
    }

    #[test]
    fn single_addition_to_small_pool_is_significant() {
        let prev = vec!["A".to_string(), "B".to_string()];
        let current = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let result = evaluate(&prev, &current);
        assert!(result.significant);
        assert_eq!(result.added, vec!["C".to_string()]);
        assert!(result.adjustment_factor > 1.0);
    }

    #[test]
    fn removal_lowers_adjustment_factor() {
        let prev: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let current: Vec<String> = (0..9).map(|i| i.to_string()).collect();
        let result = evaluate(&prev, &current);
        assert!(result.significant);
        assert!(result.adjustment_factor < 1.0);
    }

    #[test]
    fn median_handles_even_and_odd_counts() {
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
