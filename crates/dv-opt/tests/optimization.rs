//! End-to-end optimization scenarios on synthetic event samples.
//!
//! Covers the driver's structural guarantees: fixed iteration count,
//! monotone tightening of promoted cuts, removed-fraction thresholds
//! measured against the iteration-0 distribution, and fatal
//! initialization errors.

use std::collections::BTreeMap;

use dv_core::{Hist1D, Result};
use dv_opt::{
    Binning, CutDirection, CutSpec, MemorySink, OptimizationConfig, OptimizationDriver, RowTable,
    SignalYieldModel,
};
use dv_stats::EfficiencyCurve;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_SIGNAL: usize = 1000;
const N_BACKGROUND: usize = 50_000;
const BKG_DECAY: f64 = 5.0;
const BKG_ORIGIN: f64 = -4.0;

/// Toy expected-signal function: integrates the conservative efficiency
/// beyond the cut position. Only the first hypothesis component
/// contributes.
struct ToyYield {
    scale: f64,
}

impl SignalYieldModel for ToyYield {
    fn expected_signal(
        &self,
        _hypothesis_mass: f64,
        _coupling: f64,
        component_a: bool,
        _component_b: bool,
        _reference_energy: f64,
        efficiency: &EfficiencyCurve,
        _production_anchor: f64,
        cut_position: f64,
    ) -> Result<f64> {
        if !component_a {
            return Ok(0.0);
        }
        let mut sum = 0.0;
        for i in 0..efficiency.n_bins() {
            if efficiency.bin_low_edge(i) < cut_position {
                continue;
            }
            sum += efficiency.lower_bound(i) * efficiency.bin_width();
        }
        Ok(self.scale * sum)
    }
}

/// Signal: 1000 rows uniform in `v` over [0, 10] (deterministic grid), a
/// displacement spread over [-4, 96], and an in-window mass. `w` is an
/// independent permuted uniform used as a second candidate variable.
fn signal_table() -> RowTable {
    let mut v = Vec::with_capacity(N_SIGNAL);
    let mut w = Vec::with_capacity(N_SIGNAL);
    let mut z = Vec::with_capacity(N_SIGNAL);
    for i in 0..N_SIGNAL {
        v.push((i as f64 + 0.5) * 0.01);
        w.push(((i * 7 % N_SIGNAL) as f64 + 0.5) * 0.01);
        z.push(-4.0 + 100.0 * (i as f64 + 0.5) / N_SIGNAL as f64);
    }
    RowTable::from_columns([
        ("v".to_string(), v),
        ("w".to_string(), w),
        ("recon_z".to_string(), z.clone()),
        ("true_z".to_string(), z),
        ("mass".to_string(), vec![55.0; N_SIGNAL]),
    ])
    .unwrap()
}

/// Background: displacement exponential with decay 5 beyond -4, cut
/// variables uniform and independent of the displacement.
fn background_table(seed: u64) -> RowTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut v = Vec::with_capacity(N_BACKGROUND);
    let mut w = Vec::with_capacity(N_BACKGROUND);
    let mut z = Vec::with_capacity(N_BACKGROUND);
    for _ in 0..N_BACKGROUND {
        v.push(rng.gen::<f64>() * 10.0);
        w.push(rng.gen::<f64>() * 10.0);
        let u: f64 = rng.gen();
        z.push(BKG_ORIGIN - BKG_DECAY * (1.0 - u).ln());
    }
    RowTable::from_columns([
        ("v".to_string(), v),
        ("w".to_string(), w),
        ("recon_z".to_string(), z),
        ("mass".to_string(), vec![55.0; N_BACKGROUND]),
    ])
    .unwrap()
}

fn truth_spectrum(signal: &RowTable) -> Hist1D {
    let mut h = Hist1D::new(200, -50.3, 149.7).unwrap();
    for &z in signal.column("true_z").unwrap() {
        h.fill(z);
    }
    h
}

fn gt_cut(name: &str, variable: &str) -> CutSpec {
    CutSpec {
        name: name.to_string(),
        variable: variable.to_string(),
        direction: CutDirection::GreaterThan,
        threshold: 0.0,
    }
}

fn config(cut_variables: &[&str]) -> OptimizationConfig {
    let cuts: Vec<CutSpec> =
        cut_variables.iter().map(|v| gt_cut(&format!("{v}_min"), v)).collect();
    let binning: BTreeMap<String, Binning> = cut_variables
        .iter()
        .map(|v| (v.to_string(), Binning { bins: 100, low: 0.0, high: 10.0 }))
        .collect();
    OptimizationConfig {
        max_iteration: 10,
        step_size: 0.1,
        min_tail_events: 1.0,
        scan_cut_position: false,
        signal_mass: 55.0,
        mass_resolution: 3.0,
        mass_window_nsigma: 2.0,
        log_eps2: -6.5,
        reference_energy: 1.35,
        production_anchor: -4.3,
        scan_anchor: -4.0,
        tail_fit_max_events: 200.0,
        cut_variables: cut_variables.iter().map(|v| v.to_string()).collect(),
        new_variables: vec![],
        new_variable_params: vec![],
        shifts: vec![],
        recon_z_column: "recon_z".to_string(),
        true_z_column: "true_z".to_string(),
        mass_column: "mass".to_string(),
        tail_binning: Binning { bins: 150, low: -50.0, high: 100.0 },
        map_binning: Binning { bins: 300, low: -50.0, high: 100.0 },
        truth_binning: Binning { bins: 200, low: -50.3, high: 149.7 },
        variable_binning: binning,
        persistent_cuts: cuts.clone(),
        candidate_cuts: cuts,
    }
}

#[test]
fn test_end_to_end_single_candidate() {
    let signal = signal_table();
    let truth = truth_spectrum(&signal);
    let driver = OptimizationDriver::new(
        config(&["v"]),
        signal,
        background_table(7),
        &truth,
        ToyYield { scale: 0.5 },
    );
    let mut driver = driver.unwrap();
    let mut sink = MemorySink::default();
    let report = driver.run(&mut sink).unwrap();

    // step_size 0.1 caps the run at exactly 10 iterations.
    assert_eq!(report.iterations_run, 10);
    assert_eq!(sink.iterations.len(), 10);

    // With a single candidate every iteration with a converged fit
    // promotes it, and its persistent threshold tightens monotonically.
    let mut last = f64::NEG_INFINITY;
    for summary in &sink.iterations {
        let threshold = summary.persistent[0].1;
        assert!(threshold >= last, "persistent cut loosened: {threshold} < {last}");
        last = threshold;
        assert!(summary.winner.is_some(), "iteration {} had no winner", summary.iteration);
    }

    // Iteration 5's candidate threshold removes ~50% of the original
    // uniform distribution in v (tolerance 1%).
    let it5 = &sink.iterations[5];
    let threshold = it5.candidates[0].threshold;
    let removed = (0..N_SIGNAL)
        .filter(|&i| (i as f64 + 0.5) * 0.01 <= threshold)
        .count() as f64
        / N_SIGNAL as f64;
    assert!((removed - 0.5).abs() <= 0.01, "threshold {threshold} removes {removed}");

    // Every candidate record carries a usable scan.
    for summary in &sink.iterations {
        let outcome = &summary.candidates[0];
        assert!(outcome.fit_converged, "iteration {}", summary.iteration);
        assert!(!outcome.scan.is_empty());
        let best = outcome.best.as_ref().unwrap();
        assert!(best.significance.is_finite());
        assert!(best.background_yield >= 0.0);
    }

    // The final report snapshots the tightened persistent set.
    assert_eq!(report.final_cuts.len(), 1);
    assert!(report.final_cuts[0].1 >= last);
}

#[test]
fn test_thresholds_follow_iteration0_distribution() {
    let signal = signal_table();
    let truth = truth_spectrum(&signal);

    // Independent replica of the iteration-0 lookup for variable v.
    let mut original_v = Hist1D::new(100, 0.0, 10.0).unwrap();
    for &x in signal.column("v").unwrap() {
        original_v.fill(x);
    }
    let baseline = original_v.integral();

    let mut driver = OptimizationDriver::new(
        config(&["v", "w"]),
        signal,
        background_table(11),
        &truth,
        ToyYield { scale: 0.5 },
    )
    .unwrap();
    let mut sink = MemorySink::default();
    driver.run(&mut sink).unwrap();

    // Promotions on either variable shrink the surviving sample, but every
    // later candidate threshold must still match the lookup on the frozen
    // iteration-0 distribution.
    for summary in &sink.iterations {
        let fraction = summary.iteration as f64 * 0.1;
        let expected = original_v.threshold_for_removed_fraction(true, fraction, baseline);
        let outcome = summary
            .candidates
            .iter()
            .find(|c| c.variable == "v")
            .expect("candidate on v");
        assert_eq!(
            outcome.threshold, expected,
            "iteration {}: threshold drifted from the iteration-0 baseline",
            summary.iteration
        );
    }

    // Both variables' distributions are symmetric here, so each
    // iteration still finds some winner.
    assert!(sink.iterations.iter().filter(|s| s.winner.is_some()).count() >= 8);
}

#[test]
fn test_scan_enabled_explores_positions() {
    let signal = signal_table();
    let truth = truth_spectrum(&signal);
    let mut cfg = config(&["v"]);
    cfg.scan_cut_position = true;
    cfg.max_iteration = 2;
    let mut driver = OptimizationDriver::new(
        cfg,
        signal,
        background_table(13),
        &truth,
        ToyYield { scale: 0.5 },
    )
    .unwrap();
    let mut sink = MemorySink::default();
    driver.run(&mut sink).unwrap();

    // With scanning on, the scan starts at the anchor and steps in units
    // of one.
    let outcome = &sink.iterations[0].candidates[0];
    assert!(outcome.scan.len() > 1, "expected a multi-point scan");
    assert_eq!(outcome.scan[0].position, -4.0);
    assert!((outcome.scan[1].position - outcome.scan[0].position - 1.0).abs() < 1e-12);

    // Background yields fall as the cut position tightens.
    for pair in outcome.scan.windows(2) {
        assert!(pair[1].background_yield <= pair[0].background_yield + 1e-9);
    }
}

#[test]
fn test_misaligned_derived_variable_params_are_fatal() {
    let signal = signal_table();
    let truth = truth_spectrum(&signal);
    let mut cfg = config(&["v"]);
    cfg.new_variables = vec!["zalpha".to_string()];
    cfg.new_variable_params = vec![];
    let result = OptimizationDriver::new(
        cfg,
        signal,
        background_table(17),
        &truth,
        ToyYield { scale: 0.5 },
    );
    assert!(result.is_err());
}

#[test]
fn test_truth_binning_mismatch_is_fatal() {
    let signal = signal_table();
    let mut wrong = Hist1D::new(100, -50.0, 150.0).unwrap();
    for &z in signal.column("true_z").unwrap() {
        wrong.fill(z);
    }
    let result = OptimizationDriver::new(
        config(&["v"]),
        signal,
        background_table(19),
        &wrong,
        ToyYield { scale: 0.5 },
    );
    assert!(result.is_err());
}

#[test]
fn test_cut_on_absent_variable_changes_nothing() {
    let signal = signal_table();
    let truth = truth_spectrum(&signal);

    // "ghost" exists in neither table: its cut must never reject a row,
    // so the run behaves exactly like the v-only run.
    let mut with_ghost = OptimizationDriver::new(
        config(&["v", "ghost"]),
        signal_table(),
        background_table(23),
        &truth,
        ToyYield { scale: 0.5 },
    )
    .unwrap();
    let mut without = OptimizationDriver::new(
        config(&["v"]),
        signal_table(),
        background_table(23),
        &truth,
        ToyYield { scale: 0.5 },
    )
    .unwrap();

    let mut sink_a = MemorySink::default();
    let mut sink_b = MemorySink::default();
    with_ghost.run(&mut sink_a).unwrap();
    without.run(&mut sink_b).unwrap();

    // Thresholds come from the frozen iteration-0 distribution, so the
    // ghost cut can never move them.
    for (a, b) in sink_a.iterations.iter().zip(&sink_b.iterations) {
        let va = a.candidates.iter().find(|c| c.variable == "v").unwrap();
        let vb = b.candidates.iter().find(|c| c.variable == "v").unwrap();
        assert_eq!(va.threshold, vb.threshold, "iteration {}", a.iteration);
    }

    // At iteration 0 both runs apply identical selections, so the v
    // candidate sees the same background sample in each.
    let va = sink_a.iterations[0].candidates.iter().find(|c| c.variable == "v").unwrap();
    let vb = sink_b.iterations[0].candidates.iter().find(|c| c.variable == "v").unwrap();
    let (ba, bb) = (va.best.as_ref().unwrap(), vb.best.as_ref().unwrap());
    assert_eq!(ba.background_yield, bb.background_yield);
}
