//! Exponential model of a sparse background tail.
//!
//! Raw bin counts beyond a tight selection are too sparse to use directly,
//! so the observed distribution is fitted with `N(x) = A * exp(-x / tau)`
//! beyond a reference point and queried through its closed-form integral.

use dv_core::{Error, Hist1D, Result};
use nalgebra::{DMatrix, DVector};

/// A fitted single-exponential tail `N(x) = A * exp(-x / tau)`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialTail {
    amplitude: f64,
    decay: f64,
    range: (f64, f64),
}

impl ExponentialTail {
    /// Fit the exponential over `[fit_range_start, domain_max]` of the
    /// histogram by weighted least squares on log-counts (weights equal to
    /// the counts, the usual linearization of the Poisson chi-square).
    ///
    /// Degenerate input (fewer than two populated bins in range, a
    /// singular system, or a non-positive fitted decay constant) is a
    /// [`Error::FitFailed`], never a silent zero model.
    pub fn fit(hist: &Hist1D, fit_range_start: f64) -> Result<Self> {
        let domain_max = hist.high();

        let mut s_w = 0.0;
        let mut s_wx = 0.0;
        let mut s_wxx = 0.0;
        let mut s_wy = 0.0;
        let mut s_wxy = 0.0;
        let mut populated = 0usize;
        for i in 0..hist.n_bins() {
            let x = hist.bin_center(i);
            let n = hist.counts()[i];
            if x < fit_range_start || n <= 0.0 {
                continue;
            }
            let y = n.ln();
            s_w += n;
            s_wx += n * x;
            s_wxx += n * x * x;
            s_wy += n * y;
            s_wxy += n * x * y;
            populated += 1;
        }
        if populated < 2 {
            return Err(Error::FitFailed(format!(
                "{populated} populated bins in [{fit_range_start}, {domain_max}], need at least 2"
            )));
        }

        let normal = DMatrix::from_row_slice(2, 2, &[s_w, s_wx, s_wx, s_wxx]);
        let rhs = DVector::from_column_slice(&[s_wy, s_wxy]);
        let sol = normal
            .lu()
            .solve(&rhs)
            .ok_or_else(|| Error::FitFailed("singular normal equations".to_string()))?;

        let intercept = sol[0];
        let slope = sol[1];
        let decay = -1.0 / slope;
        let amplitude = intercept.exp();
        if !decay.is_finite() || decay <= 0.0 || !amplitude.is_finite() {
            return Err(Error::FitFailed(format!(
                "non-decaying solution: amplitude={amplitude}, decay={decay}"
            )));
        }

        Ok(Self { amplitude, decay, range: (fit_range_start, domain_max) })
    }

    /// Fitted amplitude `A`.
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// Fitted decay constant `tau`.
    pub fn decay(&self) -> f64 {
        self.decay
    }

    /// Upper edge of the fitted domain.
    pub fn domain_max(&self) -> f64 {
        self.range.1
    }

    /// Closed-form integral of the fitted exponential over `[x0, x1]`:
    /// `A * tau * (exp(-x0/tau) - exp(-x1/tau))`.
    pub fn integral(&self, x0: f64, x1: f64) -> f64 {
        self.amplitude
            * self.decay
            * ((-x0 / self.decay).exp() - (-x1 / self.decay).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential_hist(amplitude: f64, decay: f64, n_bins: usize, low: f64, high: f64) -> Hist1D {
        let mut h = Hist1D::new(n_bins, low, high).unwrap();
        for i in 0..n_bins {
            let x = h.bin_center(i);
            h.set_bin_content(i, amplitude * (-x / decay).exp()).unwrap();
        }
        h
    }

    #[test]
    fn test_recovers_noiseless_parameters() {
        let h = exponential_hist(1000.0, 5.0, 150, -50.0, 100.0);
        let tail = ExponentialTail::fit(&h, -4.0).unwrap();
        assert!((tail.decay() - 5.0).abs() < 1e-6, "decay={}", tail.decay());
        assert!((tail.amplitude() - 1000.0).abs() / 1000.0 < 1e-6);
    }

    #[test]
    fn test_integral_matches_closed_form() {
        let h = exponential_hist(100.0, 2.0, 100, 0.0, 20.0);
        let tail = ExponentialTail::fit(&h, 0.0).unwrap();
        let expected = 100.0 * 2.0 * ((0.0f64).exp() - (-5.0f64).exp());
        assert!((tail.integral(0.0, 10.0) - expected).abs() / expected < 1e-6);
    }

    #[test]
    fn test_integral_monotone_in_lower_bound() {
        let h = exponential_hist(500.0, 4.0, 120, -10.0, 50.0);
        let tail = ExponentialTail::fit(&h, -4.0).unwrap();
        let mut x0 = -4.0;
        let mut last = tail.integral(x0, tail.domain_max());
        while x0 < tail.domain_max() {
            x0 += 0.5;
            let next = tail.integral(x0, tail.domain_max());
            assert!(next <= last + 1e-12, "integral increased at x0={x0}");
            last = next;
        }
    }

    #[test]
    fn test_empty_histogram_fails() {
        let h = Hist1D::new(50, 0.0, 10.0).unwrap();
        assert!(matches!(ExponentialTail::fit(&h, 0.0), Err(Error::FitFailed(_))));
    }

    #[test]
    fn test_rising_distribution_fails() {
        let mut h = Hist1D::new(50, 0.0, 10.0).unwrap();
        for i in 0..50 {
            let x = h.bin_center(i);
            h.set_bin_content(i, (x / 3.0).exp()).unwrap();
        }
        assert!(matches!(ExponentialTail::fit(&h, 0.0), Err(Error::FitFailed(_))));
    }
}
