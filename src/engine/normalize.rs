//! Self-rating normalization.
//!
//! An employee's raw computed average is snapped to the nearest allowed
//! discrete rating. The scan keeps the current best unless a candidate is
//! strictly closer, so an exact midpoint resolves to the lower value
//! (1.375 snaps to 1.25, not 1.50). That tie behavior is load-bearing: it
//! decides who crosses an expectation boundary, so it is pinned in tests
//! instead of being "fixed" to round-half-up.
//!
//! Only the employee aggregate under normal/goal-weight calculation passes
//! through here. Manager aggregates and actual-vs-target percentages are
//! never snapped.

pub const ALLOWED_SELF_RATINGS: [f64; 3] = [1.00, 1.25, 1.50];

/// Snap a raw average to the nearest allowed self-rating value.
pub fn normalize(raw_average: f64) -> f64 {
    let mut best = ALLOWED_SELF_RATINGS[0];
    let mut best_distance = (raw_average - best).abs();

    for &candidate in &ALLOWED_SELF_RATINGS[1..] {
        let distance = (raw_average - candidate).abs();
        if distance < best_distance {
            best = candidate;
            best_distance = distance;
        }
    }

    best
}

/// Display label for a normalized rating. Never used for recomputation.
pub fn rating_label(value: f64) -> &'static str {
    if value <= 1.00 {
        "Below Expectation"
    } else if value <= 1.25 {
        "Meets Expectation"
    } else {
        "Exceeds Expectation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_correctness() {
        assert_eq!(normalize(1.10), 1.00);
        assert_eq!(normalize(1.30), 1.25);
        assert_eq!(normalize(1.45), 1.50);
    }

    #[test]
    fn test_exact_midpoint_resolves_to_lower_value() {
        // |1.375 - 1.25| == |1.375 - 1.50|; strictly-closer keeps 1.25.
        assert_eq!(normalize(1.375), 1.25);
        assert_eq!(normalize(1.125), 1.00);
    }

    #[test]
    fn test_normalization_is_idempotent_and_closed() {
        for raw in [0.0, 0.9, 1.0, 1.2, 1.375, 1.49, 1.5, 2.0, 10.0] {
            let snapped = normalize(raw);
            assert!(ALLOWED_SELF_RATINGS.contains(&snapped));
            assert_eq!(normalize(snapped), snapped);
        }
    }

    #[test]
    fn test_out_of_range_values_clamp_to_nearest_end() {
        assert_eq!(normalize(0.0), 1.00);
        assert_eq!(normalize(5.0), 1.50);
    }

    #[test]
    fn test_rating_labels() {
        assert_eq!(rating_label(1.00), "Below Expectation");
        assert_eq!(rating_label(1.25), "Meets Expectation");
        assert_eq!(rating_label(1.50), "Exceeds Expectation");
    }
}
