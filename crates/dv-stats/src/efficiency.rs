//! Binomial efficiency curve: per-bin selected/total ratio with a
//! one-sided lower confidence bound.
//!
//! Numerator and denominator must share one binning; the conservative
//! lower bound `eff - err_low` is what gets folded against absolute yield
//! predictions.

use dv_core::{Error, Hist1D, Result};
use statrs::distribution::{Beta, ContinuousCDF};

/// Central confidence level of the per-bin interval (one Gaussian sigma).
const CONFIDENCE_LEVEL: f64 = 0.682_689_492_137_086;

/// Per-bin ratio-with-uncertainty curve of selected over generated counts.
#[derive(Debug, Clone)]
pub struct EfficiencyCurve {
    n_bins: usize,
    low: f64,
    high: f64,
    eff: Vec<f64>,
    err_low: Vec<f64>,
}

impl EfficiencyCurve {
    /// Build the curve from a selected-counts histogram and a total-counts
    /// histogram sharing an identical binning.
    ///
    /// Bins with zero total count are defined to have zero efficiency and
    /// zero uncertainty; a numerator exceeding its denominator is clamped
    /// with a warning.
    pub fn build(selected: &Hist1D, total: &Hist1D) -> Result<Self> {
        if !selected.same_binning(total) {
            return Err(Error::Validation(format!(
                "efficiency binning mismatch: {} bins over [{}, {}] vs {} bins over [{}, {}]",
                selected.n_bins(),
                selected.low(),
                selected.high(),
                total.n_bins(),
                total.low(),
                total.high()
            )));
        }

        let n_bins = total.n_bins();
        let mut eff = Vec::with_capacity(n_bins);
        let mut err_low = Vec::with_capacity(n_bins);
        for i in 0..n_bins {
            let n = total.counts()[i];
            if n <= 0.0 {
                eff.push(0.0);
                err_low.push(0.0);
                continue;
            }
            let mut k = selected.counts()[i];
            if k > n {
                log::warn!(
                    "efficiency bin {i}: selected count {k} exceeds total {n}, clamping"
                );
                k = n;
            }
            let e = k / n;
            let lower = clopper_pearson_lower(k, n)?;
            eff.push(e);
            err_low.push((e - lower).max(0.0));
        }

        Ok(Self { n_bins, low: total.low(), high: total.high(), eff, err_low })
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Lower edge of the first bin.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Upper edge of the last bin.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Width of one bin.
    pub fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.n_bins as f64
    }

    /// Lower edge of bin `i`.
    pub fn bin_low_edge(&self, i: usize) -> f64 {
        self.low + i as f64 * self.bin_width()
    }

    /// Efficiency in bin `i`.
    pub fn efficiency(&self, i: usize) -> f64 {
        self.eff[i]
    }

    /// One-sided lower uncertainty in bin `i`.
    pub fn error_low(&self, i: usize) -> f64 {
        self.err_low[i]
    }

    /// Conservative efficiency in bin `i`: `efficiency - error_low`.
    pub fn lower_bound(&self, i: usize) -> f64 {
        (self.eff[i] - self.err_low[i]).max(0.0)
    }
}

/// Lower Clopper-Pearson bound for `k` selected out of `n` at the central
/// [`CONFIDENCE_LEVEL`]: the `alpha/2` quantile of `Beta(k, n - k + 1)`.
fn clopper_pearson_lower(k: f64, n: f64) -> Result<f64> {
    if k <= 0.0 {
        return Ok(0.0);
    }
    let alpha = (1.0 - CONFIDENCE_LEVEL) / 2.0;
    let beta = Beta::new(k, n - k + 1.0)
        .map_err(|e| Error::Computation(format!("Clopper-Pearson beta({k}, {}): {e}", n - k + 1.0)))?;
    Ok(beta.inverse_cdf(alpha))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist_from(counts: &[f64], low: f64, high: f64) -> Hist1D {
        let mut h = Hist1D::new(counts.len(), low, high).unwrap();
        for (i, c) in counts.iter().enumerate() {
            h.set_bin_content(i, *c).unwrap();
        }
        h
    }

    #[test]
    fn test_zero_total_bin_is_zero() {
        let selected = hist_from(&[0.0, 5.0], 0.0, 2.0);
        let total = hist_from(&[0.0, 10.0], 0.0, 2.0);
        let curve = EfficiencyCurve::build(&selected, &total).unwrap();
        assert_eq!(curve.efficiency(0), 0.0);
        assert_eq!(curve.error_low(0), 0.0);
        assert!((curve.efficiency(1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_binning_mismatch_rejected() {
        let selected = hist_from(&[1.0, 1.0], 0.0, 2.0);
        let total = hist_from(&[2.0, 2.0, 2.0], 0.0, 3.0);
        assert!(EfficiencyCurve::build(&selected, &total).is_err());
    }

    #[test]
    fn test_lower_bound_within_interval() {
        let selected = hist_from(&[0.0, 25.0, 100.0], 0.0, 3.0);
        let total = hist_from(&[50.0, 100.0, 100.0], 0.0, 3.0);
        let curve = EfficiencyCurve::build(&selected, &total).unwrap();
        for i in 0..curve.n_bins() {
            let e = curve.efficiency(i);
            let lower = curve.lower_bound(i);
            assert!((0.0..=1.0).contains(&e), "bin {i}: eff={e}");
            assert!(lower <= e, "bin {i}: lower={lower} > eff={e}");
            assert!(lower >= 0.0);
        }
        // Fully selected bin still has a nonzero lower error.
        assert!(curve.error_low(2) > 0.0);
        assert!((curve.efficiency(2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_known_clopper_pearson_value() {
        // k=25, n=100: lower bound is the 15.87% quantile of Beta(25, 76),
        // about one sigma below the 0.2475 mean.
        let lower = clopper_pearson_lower(25.0, 100.0).unwrap();
        assert!((lower - 0.205).abs() < 5e-3, "lower={lower}");
    }

    #[test]
    fn test_numerator_clamped() {
        let selected = hist_from(&[12.0], 0.0, 1.0);
        let total = hist_from(&[10.0], 0.0, 1.0);
        let curve = EfficiencyCurve::build(&selected, &total).unwrap();
        assert!((curve.efficiency(0) - 1.0).abs() < 1e-12);
    }
}
