//! Mastery arithmetic

/// Mastery gained by a perfect quiz
pub const MAX_GAIN_PER_QUIZ: f64 = 0.15;

/// Mastery after a quiz scored `score` percent.
///
/// Always in `[current, 1.0]` once `current` is clamped to `[0, 1]`.
pub fn next_mastery(current: f64, score: f64) -> f64 {
    let current = clamp_unit(current);
    let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 100.0) };
    (current + (score / 100.0) * MAX_GAIN_PER_QUIZ).min(1.0)
}

/// Clamp to `[0, 1]`, mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Mastery as a whole percentage, the way feedback text shows it
pub fn as_percent(mastery: f64) -> u32 {
    (clamp_unit(mastery) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_next_mastery_examples() {
        assert!((next_mastery(0.0, 100.0) - 0.15).abs() < 1e-12);
        assert!((next_mastery(0.5, 60.0) - 0.59).abs() < 1e-12);
        assert_eq!(next_mastery(0.95, 100.0), 1.0);
        assert_eq!(next_mastery(0.3, 0.0), 0.3);
    }

    #[test]
    fn test_out_of_range_inputs_are_clamped() {
        assert_eq!(next_mastery(-1.0, 0.0), 0.0);
        assert_eq!(next_mastery(2.0, 50.0), 1.0);
        assert!((next_mastery(0.0, 250.0) - 0.15).abs() < 1e-12);
        assert_eq!(next_mastery(f64::NAN, f64::NAN), 0.0);
    }

    #[test]
    fn test_as_percent() {
        assert_eq!(as_percent(0.456), 46);
        assert_eq!(as_percent(1.3), 100);
    }

    proptest! {
        #[test]
        fn prop_next_mastery_between_current_and_one(
            current in 0.0f64..=1.0,
            score in 0.0f64..=100.0,
        ) {
            let next = next_mastery(current, score);
            prop_assert!(next >= current);
            prop_assert!(next <= 1.0);
            prop_assert!((next - (current + score / 100.0 * 0.15).min(1.0)).abs() < 1e-12);
        }
    }
}
