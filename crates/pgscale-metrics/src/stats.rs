//! Numerical helpers shared by the calculator and the analytics engine.
//!
//! All functions are total: empty input yields `0.0`, never a panic or a
//! non-finite value.

use pgscale_core::finite;

/// Percentile of ascending-sorted data at fraction `p` in `[0, 1]`.
///
/// Linear interpolation between adjacent order statistics at rank
/// `p * (n - 1)`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return finite(sorted[lo]);
    }
    let frac = rank - lo as f64;
    finite(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    finite(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    finite(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    finite(variance(values).sqrt())
}

/// Standard scores for each value. All zero when the series is constant.
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let sd = std_dev(values);
    values
        .iter()
        .map(|v| if sd > 0.0 { finite((v - m) / sd) } else { 0.0 })
        .collect()
}

/// `numerator / denominator`, or `0.0` when the quotient is not finite.
#[inline]
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    finite(numerator / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_bounds_and_interpolation() {
        let data = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&data, 0.0), 10.0);
        assert_eq!(percentile(&data, 1.0), 50.0);
        assert_eq!(percentile(&data, 0.5), 30.0);
        // rank 0.95 * 4 = 3.8 → 40 + 0.8 * 10
        assert!((percentile(&data, 0.95) - 48.0).abs() < 1e-9);
    }

    #[test]
    fn percentile_is_monotonic() {
        let data: Vec<f64> = (0..37).map(|i| (i * i) as f64 * 0.5).collect();
        let mut prev = f64::MIN;
        for step in 0..=100 {
            let v = percentile(&data, step as f64 / 100.0);
            assert!(v >= prev, "percentile decreased at p={step}%");
            prev = v;
        }
    }

    #[test]
    fn percentile_empty_and_single() {
        assert_eq!(percentile(&[], 0.5), 0.0);
        assert_eq!(percentile(&[7.0], 0.99), 7.0);
        assert_eq!(percentile(&[1.0, 2.0], f64::NAN), 1.0);
    }

    #[test]
    fn population_std_dev() {
        let data = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(mean(&data), 30.0);
        assert_eq!(variance(&data), 200.0);
        assert!((std_dev(&data) - 14.142_135).abs() < 1e-5);
    }

    #[test]
    fn z_scores_constant_series() {
        assert_eq!(z_scores(&[4.0, 4.0, 4.0]), vec![0.0, 0.0, 0.0]);
        let z = z_scores(&[1.0, 2.0, 3.0]);
        assert!(z[0] < 0.0 && z[1] == 0.0 && z[2] > 0.0);
    }

    #[test]
    fn ratio_guards_division() {
        assert_eq!(ratio(5.0, 0.0), 0.0);
        assert_eq!(ratio(f64::INFINITY, 2.0), 0.0);
        assert_eq!(ratio(6.0, 3.0), 2.0);
    }
}
