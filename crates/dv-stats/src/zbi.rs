//! One-sided binomial Z-significance (ZBi).
//!
//! Follows the on/off-counting formulation: the p-value is the regularized
//! incomplete beta `I_{1/(1+tau)}(n_on, n_off + 1)` and the significance is
//! its Gaussian equivalent `sqrt(2) * erf_inv(1 - 2p)`.

use dv_core::{Error, Result};
use statrs::function::beta::beta_reg;
use statrs::function::erf::erf_inv;

/// Compute the one-sided binomial Z-significance for an on/off counting
/// experiment.
///
/// `n_on` is the on-source count (signal region), `n_off` the off-source
/// count, and `tau` the off-to-on background-normalization ratio.
///
/// The statistic is undefined for non-positive `n_on` or `n_off + 1`; such
/// inputs are reported as [`Error::InvalidSignificance`] rather than being
/// coerced to a number.
pub fn z_bi(n_on: f64, n_off: f64, tau: f64) -> Result<f64> {
    if !tau.is_finite() || tau <= 0.0 {
        return Err(Error::Validation(format!("tau must be finite and > 0, got {tau}")));
    }
    if !n_on.is_finite() || !n_off.is_finite() {
        return Err(Error::InvalidSignificance(format!(
            "counts must be finite, got n_on={n_on}, n_off={n_off}"
        )));
    }
    if n_on <= 0.0 || n_off + 1.0 <= 0.0 {
        return Err(Error::InvalidSignificance(format!(
            "requires n_on > 0 and n_off + 1 > 0, got n_on={n_on}, n_off={n_off}"
        )));
    }

    let p_bi = beta_reg(n_on, n_off + 1.0, 1.0 / (1.0 + tau));
    let z = std::f64::consts::SQRT_2 * erf_inv(1.0 - 2.0 * p_bi);
    if !z.is_finite() {
        return Err(Error::InvalidSignificance(format!(
            "non-finite significance for n_on={n_on}, n_off={n_off}, tau={tau} (p={p_bi})"
        )));
    }
    Ok(z)
}
