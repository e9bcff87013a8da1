//! Configuration surface for the optimization driver.
//!
//! Concrete keys only; how the bytes reach [`OptimizationConfig`] (file,
//! embedded JSON, test literal) is an external concern. Semantic
//! validation runs once at driver construction and inconsistencies are
//! fatal before any iteration executes.

use std::collections::BTreeMap;

use dv_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::cuts::CutSpec;

/// Uniform histogram binning: bin count plus axis range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Binning {
    /// Number of bins.
    pub bins: usize,
    /// Lower edge of the first bin.
    pub low: f64,
    /// Upper edge of the last bin.
    pub high: f64,
}

impl Binning {
    fn validate(&self, what: &str) -> Result<()> {
        if self.bins == 0 || !self.low.is_finite() || !self.high.is_finite() || self.low >= self.high
        {
            return Err(Error::Config(format!(
                "invalid {what} binning: {} bins over [{}, {}]",
                self.bins, self.low, self.high
            )));
        }
        Ok(())
    }
}

/// Which table a column shift applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftTarget {
    /// Signal-proxy table only.
    Signal,
    /// Background-proxy table only.
    Background,
    /// Both tables.
    Both,
}

/// A constant additive correction applied to a named column before the
/// optimization starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnShift {
    /// Table(s) to correct.
    pub target: ShiftTarget,
    /// Column name.
    pub column: String,
    /// Additive shift.
    pub delta: f64,
}

fn default_max_iteration() -> usize {
    10
}
fn default_step_size() -> f64 {
    0.01
}
fn default_min_tail_events() -> f64 {
    1.0
}
fn default_mass_window_nsigma() -> f64 {
    2.0
}
fn default_reference_energy() -> f64 {
    1.35
}
fn default_production_anchor() -> f64 {
    -4.3
}
fn default_scan_anchor() -> f64 {
    -4.0
}
fn default_tail_fit_max_events() -> f64 {
    200.0
}
fn default_recon_z_column() -> String {
    "recon_z".to_string()
}
fn default_true_z_column() -> String {
    "true_z".to_string()
}
fn default_mass_column() -> String {
    "mass".to_string()
}
fn default_tail_binning() -> Binning {
    Binning { bins: 150, low: -50.0, high: 100.0 }
}
fn default_map_binning() -> Binning {
    Binning { bins: 1500, low: -50.0, high: 100.0 }
}
fn default_truth_binning() -> Binning {
    Binning { bins: 200, low: -50.3, high: 149.7 }
}

/// Full configuration of one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Iteration cap; the effective round count is
    /// `min(max_iteration, floor(1 / step_size))`.
    #[serde(default = "default_max_iteration")]
    pub max_iteration: usize,
    /// Fraction of the original signal distribution removed per round.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// Minimum fitted background-tail content required beyond the cut.
    #[serde(default = "default_min_tail_events")]
    pub min_tail_events: f64,
    /// Scan cut positions below the maximum; when false the scan collapses
    /// to the single maximum position.
    #[serde(default)]
    pub scan_cut_position: bool,

    /// Signal hypothesis mass.
    pub signal_mass: f64,
    /// Detector mass resolution at the hypothesis mass.
    pub mass_resolution: f64,
    /// Mass-window half-width in resolution units (full window is
    /// `signal_mass ± nsigma * resolution / 2`).
    #[serde(default = "default_mass_window_nsigma")]
    pub mass_window_nsigma: f64,

    /// Coupling exponent: the coupling handed to the expected-signal
    /// function is `sqrt(10^log_eps2)`.
    pub log_eps2: f64,
    /// Reference energy forwarded to the expected-signal function.
    #[serde(default = "default_reference_energy")]
    pub reference_energy: f64,
    /// Production-position anchor forwarded to the expected-signal function.
    #[serde(default = "default_production_anchor")]
    pub production_anchor: f64,
    /// Starting position of the maximum-cut-position search.
    #[serde(default = "default_scan_anchor")]
    pub scan_anchor: f64,
    /// The tail fit starts where the observed right-tail content drops to
    /// this many events.
    #[serde(default = "default_tail_fit_max_events")]
    pub tail_fit_max_events: f64,

    /// Variables the optimization may cut on; both cut sets are restricted
    /// to this list.
    pub cut_variables: Vec<String>,
    /// Derived-variable kinds to install before the run.
    #[serde(default)]
    pub new_variables: Vec<String>,
    /// Parameters for `new_variables`, index-aligned; a length mismatch is
    /// fatal.
    #[serde(default)]
    pub new_variable_params: Vec<f64>,
    /// Constant column corrections applied before the run.
    #[serde(default)]
    pub shifts: Vec<ColumnShift>,

    /// Reconstructed-displacement column name.
    #[serde(default = "default_recon_z_column")]
    pub recon_z_column: String,
    /// Truth-displacement column name.
    #[serde(default = "default_true_z_column")]
    pub true_z_column: String,
    /// Invariant-mass column name (mass-window bookkeeping).
    #[serde(default = "default_mass_column")]
    pub mass_column: String,

    /// Binning of the per-candidate background tail histograms.
    #[serde(default = "default_tail_binning")]
    pub tail_binning: Binning,
    /// Reconstructed axis binning of the per-candidate truth map.
    #[serde(default = "default_map_binning")]
    pub map_binning: Binning,
    /// Truth-displacement binning; must match the externally supplied
    /// pre-trigger spectrum.
    #[serde(default = "default_truth_binning")]
    pub truth_binning: Binning,
    /// Per-variable binning of the signal working histograms; required for
    /// every entry of `cut_variables`.
    #[serde(default)]
    pub variable_binning: BTreeMap<String, Binning>,

    /// Persistent cut definitions.
    pub persistent_cuts: Vec<CutSpec>,
    /// Candidate cut definitions.
    pub candidate_cuts: Vec<CutSpec>,
}

impl OptimizationConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation; every violation here aborts the run before any
    /// iteration executes.
    pub fn validate(&self) -> Result<()> {
        if self.max_iteration == 0 {
            return Err(Error::Config("max_iteration must be at least 1".to_string()));
        }
        if !(self.step_size > 0.0 && self.step_size <= 1.0) {
            return Err(Error::Config(format!(
                "step_size must be in (0, 1], got {}",
                self.step_size
            )));
        }
        if !(self.min_tail_events > 0.0) {
            return Err(Error::Config(format!(
                "min_tail_events must be > 0, got {}",
                self.min_tail_events
            )));
        }
        if !(self.tail_fit_max_events > 0.0) {
            return Err(Error::Config(format!(
                "tail_fit_max_events must be > 0, got {}",
                self.tail_fit_max_events
            )));
        }
        if !(self.mass_resolution > 0.0) {
            return Err(Error::Config(format!(
                "mass_resolution must be > 0, got {}",
                self.mass_resolution
            )));
        }
        if !(self.mass_window_nsigma > 0.0) {
            return Err(Error::Config(format!(
                "mass_window_nsigma must be > 0, got {}",
                self.mass_window_nsigma
            )));
        }
        if self.new_variables.len() != self.new_variable_params.len() {
            return Err(Error::Config(format!(
                "new_variables ({}) and new_variable_params ({}) must be equal length and \
                 index-aligned",
                self.new_variables.len(),
                self.new_variable_params.len()
            )));
        }
        if self.cut_variables.is_empty() {
            return Err(Error::Config("cut_variables must not be empty".to_string()));
        }
        self.tail_binning.validate("tail")?;
        self.map_binning.validate("map")?;
        self.truth_binning.validate("truth")?;
        for var in &self.cut_variables {
            match self.variable_binning.get(var) {
                Some(b) => b.validate(var)?,
                None => {
                    return Err(Error::Config(format!(
                        "no variable_binning entry for cut variable '{var}'"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Mass window derived from the hypothesis mass and resolution.
    pub fn mass_window(&self) -> (f64, f64) {
        let half = self.mass_window_nsigma * self.mass_resolution / 2.0;
        (self.signal_mass - half, self.signal_mass + half)
    }
}
