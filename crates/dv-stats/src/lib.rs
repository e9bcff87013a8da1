//! # dv-stats
//!
//! Statistical building blocks for the iterative cut optimization:
//! two-decimal yield rounding, the one-sided binomial Z-significance,
//! the exponential background-tail model, and the binomial efficiency
//! curve with Clopper-Pearson lower bounds.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Binomial efficiency curve with asymmetric uncertainties.
pub mod efficiency;
/// Two-decimal round-half-up used to stabilize fitted yields.
pub mod round;
/// Exponential extrapolation of a sparse background tail.
pub mod tail;
/// One-sided binomial discovery significance.
pub mod zbi;

pub use efficiency::EfficiencyCurve;
pub use round::round2;
pub use tail::ExponentialTail;
pub use zbi::z_bi;
