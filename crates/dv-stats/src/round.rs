//! Two-decimal rounding applied to every yield before it enters the
//! significance statistic.

/// Relative guard absorbing the representation error of decimal inputs:
/// `2.345` scales to `234.49999999999997`, just under the tie point.
const TIE_GUARD: f64 = 1e-12;

/// Round to two decimal digits, half-up.
///
/// The value is scaled by 100, offset by 0.5, and truncated, so a tie at
/// the third decimal rounds to the larger magnitude (`2.345 → 2.35`).
#[inline]
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    (scaled + 0.5 + scaled.abs() * TIE_GUARD).trunc() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_rounds_up() {
        assert_eq!(round2(2.345), 2.35);
        assert_eq!(round2(0.005), 0.01);
    }

    #[test]
    fn test_below_tie_rounds_down() {
        assert_eq!(round2(2.344), 2.34);
        assert_eq!(round2(2.3449), 2.34);
    }

    #[test]
    fn test_integers_unchanged() {
        for v in [0.0, 1.0, 17.0, 250.0] {
            assert_eq!(round2(v), v);
        }
    }

    #[test]
    fn test_two_decimals_fixed_point() {
        for v in [0.01, 0.99, 12.34, 107.25] {
            assert!((round2(v) - v).abs() < 1e-9, "v={v}");
        }
    }
}
