//! The iterative optimization loop.
//!
//! Each round removes a fixed additional fraction of the original signal
//! distribution per candidate variable, extrapolates the surviving
//! background tail with an exponential model, folds the signal selection
//! efficiency into an externally supplied expected-signal function, and
//! promotes the candidate with the best binomial Z-significance into the
//! persistent cut set.
//!
//! Candidate thresholds are always measured against the iteration-0
//! integrals, so they advance monotonically in "fraction of original
//! signal removed" regardless of how earlier promotions shrink the
//! sample.

use std::collections::BTreeMap;

use dv_core::{Error, Hist1D, Hist2D, Result};
use dv_stats::{round2, z_bi, EfficiencyCurve, ExponentialTail};

use crate::config::{OptimizationConfig, ShiftTarget};
use crate::cuts::{Cut, CutDirection, CutSet};
use crate::derive;
use crate::sink::{
    BestScan, CandidateOutcome, IterationSummary, PromotedCut, ResultsSink, RunReport, ScanPoint,
};
use crate::table::RowTable;

/// Step of the maximum-cut-position search.
const MAX_POSITION_STEP: f64 = 0.1;
/// Step of the cut-position scan.
const SCAN_STEP: f64 = 1.0;

/// Externally supplied physics function converting a coupling hypothesis
/// into an absolute expected-signal yield.
///
/// The driver calls it once per hypothesis component per scanned position
/// and sums the results; the component flags select which of the two
/// hypothesis components is evaluated.
pub trait SignalYieldModel {
    /// Expected signal yield beyond `cut_position` for one hypothesis
    /// component, weighted by the selection-efficiency curve.
    #[allow(clippy::too_many_arguments)]
    fn expected_signal(
        &self,
        hypothesis_mass: f64,
        coupling: f64,
        component_a: bool,
        component_b: bool,
        reference_energy: f64,
        efficiency: &EfficiencyCurve,
        production_anchor: f64,
        cut_position: f64,
    ) -> Result<f64>;
}

/// Per-candidate working state, allocated fresh every iteration and
/// discarded at iteration end.
struct CandidateWorkspace {
    /// Background displacement distribution surviving this candidate's cut.
    tail: Hist1D,
    /// (reconstructed, truth) displacement pairs surviving the cut.
    map: Hist2D,
}

impl CandidateWorkspace {
    fn new(config: &OptimizationConfig) -> Result<Self> {
        let tb = config.tail_binning;
        let mb = config.map_binning;
        let yb = config.truth_binning;
        Ok(Self {
            tail: Hist1D::new(tb.bins, tb.low, tb.high)?,
            map: Hist2D::new(mb.bins, mb.low, mb.high, yb.bins, yb.low, yb.high)?,
        })
    }
}

/// The iterative cut-optimization driver.
pub struct OptimizationDriver<M: SignalYieldModel> {
    config: OptimizationConfig,
    signal: RowTable,
    background: RowTable,
    persistent: CutSet,
    candidates: CutSet,
    truth_spectrum: Hist1D,
    /// Per-round working distributions (reset and refilled every iteration).
    signal_histos: BTreeMap<String, Hist1D>,
    /// Frozen iteration-0 distributions; every removed-fraction lookup runs
    /// against these, so earlier promotions cannot move a later threshold.
    initial_histos: BTreeMap<String, Hist1D>,
    initial_integrals: BTreeMap<String, f64>,
    model: M,
}

impl<M: SignalYieldModel> OptimizationDriver<M> {
    /// Build a driver from configuration, the two event tables, the
    /// externally supplied pre-trigger truth spectrum, and the
    /// expected-signal function.
    ///
    /// All configuration inconsistencies are fatal here, before any
    /// iteration executes. The truth spectrum is copied into a locally
    /// owned histogram, decoupling the run from the source object's
    /// lifetime.
    pub fn new(
        config: OptimizationConfig,
        mut signal: RowTable,
        mut background: RowTable,
        truth_spectrum: &Hist1D,
        model: M,
    ) -> Result<Self> {
        config.validate()?;

        for (kind, param) in config.new_variables.iter().zip(&config.new_variable_params) {
            derive::install(&mut signal, kind, *param, &config.recon_z_column)?;
            derive::install(&mut background, kind, *param, &config.recon_z_column)?;
        }

        for shift in &config.shifts {
            if matches!(shift.target, ShiftTarget::Signal | ShiftTarget::Both) {
                apply_shift(&mut signal, &shift.column, shift.delta, "signal")?;
            }
            if matches!(shift.target, ShiftTarget::Background | ShiftTarget::Both) {
                apply_shift(&mut background, &shift.column, shift.delta, "background")?;
            }
        }

        let (mass_low, mass_high) = config.mass_window();
        log::info!("mass window: [{mass_low}, {mass_high}]");
        signal.define_mass_window(&config.mass_column, mass_low, mass_high)?;
        background.define_mass_window(&config.mass_column, mass_low, mass_high)?;

        let mut persistent = CutSet::from_specs("persistent", &config.persistent_cuts)?;
        persistent.restrict_to(&config.cut_variables);
        let mut candidates = CutSet::from_specs("candidate", &config.candidate_cuts)?;
        candidates.restrict_to(&config.cut_variables);
        if candidates.is_empty() {
            return Err(Error::Config(
                "no candidate cuts survive the cut_variables restriction".to_string(),
            ));
        }

        let tb = config.truth_binning;
        let mut truth = Hist1D::new(tb.bins, tb.low, tb.high)?;
        if !truth.same_binning(truth_spectrum) {
            return Err(Error::Validation(format!(
                "pre-trigger spectrum binning ({} bins over [{}, {}]) does not match the \
                 configured truth binning ({} bins over [{}, {}])",
                truth_spectrum.n_bins(),
                truth_spectrum.low(),
                truth_spectrum.high(),
                tb.bins,
                tb.low,
                tb.high
            )));
        }
        for i in 0..tb.bins {
            truth.set_bin_content(i, truth_spectrum.counts()[i])?;
        }

        let mut signal_histos = BTreeMap::new();
        for var in &config.cut_variables {
            let Some(binning) = config.variable_binning.get(var) else {
                // validate() already rejects this; keep the invariant local.
                return Err(Error::Config(format!("no variable_binning entry for '{var}'")));
            };
            signal_histos.insert(var.clone(), Hist1D::new(binning.bins, binning.low, binning.high)?);
        }

        let mut driver = Self {
            config,
            signal,
            background,
            persistent,
            candidates,
            truth_spectrum: truth,
            signal_histos,
            initial_histos: BTreeMap::new(),
            initial_integrals: BTreeMap::new(),
            model,
        };

        // Iteration-0 distributions: mass window only, no cuts. They are
        // frozen as the fixed reference of every later removed-fraction
        // lookup.
        driver.fill_signal_histograms(false)?;
        driver.initial_histos = driver.signal_histos.clone();
        for (var, hist) in &driver.initial_histos {
            driver.initial_integrals.insert(var.clone(), hist.integral());
        }

        // Start every persistent cut where 0% of its signal distribution
        // is removed.
        let initial: Vec<(String, String, CutDirection)> = driver
            .persistent
            .iter()
            .map(|c| (c.name.clone(), c.variable.clone(), c.direction))
            .collect();
        for (name, var, direction) in initial {
            let threshold = driver.removal_threshold(&var, direction, 0.0)?;
            driver.persistent.set_threshold(&name, threshold)?;
            log::debug!("persistent cut '{name}' initialized at {threshold}");
        }

        Ok(driver)
    }

    /// The persistent cut set in its current state.
    pub fn persistent_cuts(&self) -> &CutSet {
        &self.persistent
    }

    /// The candidate cut set in its current state.
    pub fn candidate_cuts(&self) -> &CutSet {
        &self.candidates
    }

    /// Iteration-0 integral of one candidate variable.
    pub fn initial_integral(&self, variable: &str) -> Option<f64> {
        self.initial_integrals.get(variable).copied()
    }

    /// Run the full optimization, emitting one summary per iteration into
    /// `sink`.
    pub fn run(&mut self, sink: &mut dyn ResultsSink) -> Result<RunReport> {
        let rounds =
            self.config.max_iteration.min((1.0 / self.config.step_size).floor() as usize);

        for iteration in 0..rounds {
            let removed_pct = round2(iteration as f64 * self.config.step_size * 100.0);
            log::info!(
                "iteration {iteration}: removing {removed_pct}% of the original signal per \
                 candidate variable"
            );

            for hist in self.signal_histos.values_mut() {
                hist.reset();
            }
            let persistent_snapshot: Vec<(String, f64)> =
                self.persistent.iter().map(|c| (c.name.clone(), c.threshold)).collect();

            self.fill_signal_histograms(true)?;

            // New candidate thresholds, measured against the iteration-0
            // integrals.
            let fraction = iteration as f64 * self.config.step_size;
            let targets: Vec<(String, String, CutDirection)> = self
                .candidates
                .iter()
                .map(|c| (c.name.clone(), c.variable.clone(), c.direction))
                .collect();
            for (name, var, direction) in &targets {
                let threshold = self.removal_threshold(var, *direction, fraction)?;
                self.candidates.set_threshold(name, threshold)?;
                log::debug!(
                    "candidate '{name}': threshold {threshold} removes {removed_pct}% of the \
                     original '{var}' distribution"
                );
            }

            let mut workspaces: BTreeMap<String, CandidateWorkspace> = BTreeMap::new();
            for (name, _, _) in &targets {
                workspaces.insert(name.clone(), CandidateWorkspace::new(&self.config)?);
            }

            self.accumulate_background(&mut workspaces)?;
            self.accumulate_truth_map(&mut workspaces)?;

            let candidate_cuts: Vec<Cut> = self.candidates.iter().cloned().collect();
            let mut outcomes = Vec::with_capacity(candidate_cuts.len());
            let mut winner: Option<PromotedCut> = None;
            for cut in &candidate_cuts {
                let Some(workspace) = workspaces.get(&cut.name) else {
                    continue;
                };
                let outcome = self.evaluate_candidate(cut, workspace);
                if let Some(best) = &outcome.best {
                    let better =
                        winner.as_ref().map_or(true, |w| best.significance > w.significance);
                    if better {
                        winner = Some(PromotedCut {
                            cut_name: cut.name.clone(),
                            threshold: cut.threshold,
                            significance: best.significance,
                        });
                    }
                }
                outcomes.push(outcome);
            }

            // The winning candidate is applied to every event from the
            // next iteration on.
            match &winner {
                Some(w) => {
                    log::info!(
                        "iteration {iteration}: promoting '{}' at {} (ZBi {})",
                        w.cut_name,
                        w.threshold,
                        w.significance
                    );
                    self.persistent.set_threshold(&w.cut_name, w.threshold)?;
                }
                None => log::warn!(
                    "iteration {iteration}: no candidate produced a valid significance; \
                     persistent cuts unchanged"
                ),
            }

            sink.on_iteration(&IterationSummary {
                iteration,
                removed_signal_pct: removed_pct,
                persistent: persistent_snapshot,
                candidates: outcomes,
                winner,
            })?;
        }

        let report = RunReport {
            iterations_run: rounds,
            final_cuts: self.persistent.iter().map(|c| (c.name.clone(), c.threshold)).collect(),
        };
        sink.on_finalize(&report)?;
        Ok(report)
    }

    /// Threshold in `variable` that removes `fraction` of its iteration-0
    /// integral, anchored by the cut direction.
    ///
    /// The lookup runs on the frozen iteration-0 distribution: the removed
    /// fraction is measured against what the sample looked like before any
    /// promotion, not against the current round's shrunken sample.
    fn removal_threshold(
        &self,
        variable: &str,
        direction: CutDirection,
        fraction: f64,
    ) -> Result<f64> {
        let hist = self.initial_histos.get(variable).ok_or_else(|| {
            Error::Validation(format!("no iteration-0 histogram for variable '{variable}'"))
        })?;
        let baseline = self.initial_integrals.get(variable).copied().unwrap_or(0.0);
        Ok(hist.threshold_for_removed_fraction(direction.removes_from_low(), fraction, baseline))
    }

    /// Current-round working distribution of one variable (diagnostics).
    pub fn signal_histogram(&self, variable: &str) -> Option<&Hist1D> {
        self.signal_histos.get(variable)
    }

    /// Fill the per-variable signal histograms from rows inside the mass
    /// window, optionally applying the persistent cuts.
    fn fill_signal_histograms(&mut self, apply_persistent: bool) -> Result<()> {
        for row in 0..self.signal.n_rows() {
            self.signal.advance_to(row)?;
            if !self.signal.in_mass_window()? {
                continue;
            }
            if apply_persistent && self.persistent.fails_row(&self.signal)? {
                continue;
            }
            for (var, hist) in self.signal_histos.iter_mut() {
                if self.signal.column_exists(var) {
                    hist.fill(self.signal.value(var)?);
                }
            }
        }
        Ok(())
    }

    /// Background pass: rows surviving persistent cuts and the mass window
    /// deposit their reconstructed displacement into the tail histogram of
    /// every candidate whose cut they additionally pass.
    fn accumulate_background(
        &mut self,
        workspaces: &mut BTreeMap<String, CandidateWorkspace>,
    ) -> Result<()> {
        if !self.background.column_exists(&self.config.recon_z_column) {
            log::warn!(
                "background table lacks '{}'; tail histograms stay empty",
                self.config.recon_z_column
            );
            return Ok(());
        }
        for row in 0..self.background.n_rows() {
            self.background.advance_to(row)?;
            if !self.background.in_mass_window()? {
                continue;
            }
            if self.persistent.fails_row(&self.background)? {
                continue;
            }
            let recon = self.background.value(&self.config.recon_z_column)?;
            for cut in self.candidates.iter() {
                // A candidate cut on an absent variable never rejects.
                if self.background.column_exists(&cut.variable)
                    && !cut.passes(self.background.value(&cut.variable)?)
                {
                    continue;
                }
                if let Some(workspace) = workspaces.get_mut(&cut.name) {
                    workspace.tail.fill(recon);
                }
            }
        }
        Ok(())
    }

    /// Signal mapping pass: surviving rows deposit (reconstructed, truth)
    /// displacement pairs into the 2-D map of every candidate whose cut
    /// they pass. This map is the raw material for the efficiency model.
    fn accumulate_truth_map(
        &mut self,
        workspaces: &mut BTreeMap<String, CandidateWorkspace>,
    ) -> Result<()> {
        let recon_col = self.config.recon_z_column.clone();
        let true_col = self.config.true_z_column.clone();
        if !self.signal.column_exists(&recon_col) || !self.signal.column_exists(&true_col) {
            log::warn!(
                "signal table lacks '{recon_col}' or '{true_col}'; truth maps stay empty"
            );
            return Ok(());
        }
        for row in 0..self.signal.n_rows() {
            self.signal.advance_to(row)?;
            if !self.signal.in_mass_window()? {
                continue;
            }
            if self.persistent.fails_row(&self.signal)? {
                continue;
            }
            let recon = self.signal.value(&recon_col)?;
            let truth = self.signal.value(&true_col)?;
            for cut in self.candidates.iter() {
                if self.signal.column_exists(&cut.variable)
                    && !cut.passes(self.signal.value(&cut.variable)?)
                {
                    continue;
                }
                if let Some(workspace) = workspaces.get_mut(&cut.name) {
                    workspace.map.fill(recon, truth);
                }
            }
        }
        Ok(())
    }

    /// Evaluate one candidate: fit the background tail, bound the scan,
    /// and find the cut position with the best significance.
    ///
    /// A fit failure aborts only this candidate's scan for the current
    /// iteration; invalid significance inputs are surfaced per scan point.
    fn evaluate_candidate(&self, cut: &Cut, workspace: &CandidateWorkspace) -> CandidateOutcome {
        let mut outcome = CandidateOutcome {
            cut_name: cut.name.clone(),
            cut_id: cut.id,
            variable: cut.variable.clone(),
            threshold: cut.threshold,
            fit_converged: false,
            best: None,
            scan: Vec::new(),
        };

        let fit_start = workspace.tail.tail_start_for_count(self.config.tail_fit_max_events);
        let tail = match ExponentialTail::fit(&workspace.tail, fit_start) {
            Ok(t) => t,
            Err(e) => {
                log::warn!(
                    "candidate '{}': background tail fit failed, skipping this round: {e}",
                    cut.name
                );
                return outcome;
            }
        };
        outcome.fit_converged = true;

        // Smallest position whose extrapolated tail drops below the
        // required minimum; the significance needs non-zero background.
        let mut max_position = self.config.scan_anchor;
        while tail.integral(max_position, tail.domain_max()) > self.config.min_tail_events {
            max_position += MAX_POSITION_STEP;
        }
        log::debug!(
            "candidate '{}': maximum cut position {max_position} leaves {} background events",
            cut.name,
            tail.integral(max_position, tail.domain_max())
        );

        let min_position =
            if self.config.scan_cut_position { self.config.scan_anchor } else { max_position };
        let stop = (max_position + 1.0).round();
        let coupling = 10f64.powf(self.config.log_eps2).sqrt();

        let mut best: Option<BestScan> = None;
        let mut position = min_position;
        while position < stop {
            let background_yield = round2(tail.integral(position, tail.domain_max()));

            let selected = workspace.map.projection_y(workspace.map.x_bin_after(position));
            let efficiency = match EfficiencyCurve::build(&selected, &self.truth_spectrum) {
                Ok(curve) => curve,
                Err(e) => {
                    log::warn!("candidate '{}' at position {position}: {e}", cut.name);
                    position += SCAN_STEP;
                    continue;
                }
            };

            let mut signal_yield = 0.0;
            let mut component_failed = false;
            for (component_a, component_b) in [(true, false), (false, true)] {
                match self.model.expected_signal(
                    self.config.signal_mass,
                    coupling,
                    component_a,
                    component_b,
                    self.config.reference_energy,
                    &efficiency,
                    self.config.production_anchor,
                    position,
                ) {
                    Ok(y) => signal_yield += y,
                    Err(e) => {
                        log::warn!(
                            "candidate '{}' at position {position}: expected-signal evaluation \
                             failed: {e}",
                            cut.name
                        );
                        component_failed = true;
                        break;
                    }
                }
            }
            if component_failed {
                position += SCAN_STEP;
                continue;
            }
            let signal_yield = round2(signal_yield);

            let significance =
                match z_bi(signal_yield + background_yield, background_yield, 1.0) {
                    Ok(z) => Some(round2(z)),
                    Err(e) => {
                        log::warn!("candidate '{}' at position {position}: {e}", cut.name);
                        None
                    }
                };

            outcome.scan.push(ScanPoint {
                position,
                signal_yield,
                background_yield,
                significance,
            });
            if let Some(z) = significance {
                let better = best.map_or(true, |b| z > b.significance);
                if better {
                    best = Some(BestScan {
                        position,
                        significance: z,
                        signal_yield,
                        background_yield,
                    });
                }
            }
            position += SCAN_STEP;
        }

        outcome.best = best;
        outcome
    }
}

fn apply_shift(table: &mut RowTable, column: &str, delta: f64, label: &str) -> Result<()> {
    if !table.column_exists(column) {
        log::warn!("{label} table lacks column '{column}'; shift skipped");
        return Ok(());
    }
    log::info!("shifting {label} column '{column}' by {delta}");
    table.shift_column(column, delta)
}
