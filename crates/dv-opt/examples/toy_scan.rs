//! Runs the iterative optimization on a synthetic signal/background pair
//! and prints the per-iteration winners.
//!
//! ```sh
//! RUST_LOG=info cargo run -p dv-opt --example toy_scan
//! ```

use std::collections::BTreeMap;

use dv_core::{Hist1D, Result};
use dv_opt::{
    Binning, CutDirection, CutSpec, MemorySink, OptimizationConfig, OptimizationDriver, RowTable,
    SignalYieldModel,
};
use dv_stats::EfficiencyCurve;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Decayed-flux toy model: exponential production weight folded with the
/// conservative selection efficiency beyond the cut.
struct DecayedFlux {
    normalization: f64,
    decay_length: f64,
}

impl SignalYieldModel for DecayedFlux {
    fn expected_signal(
        &self,
        _hypothesis_mass: f64,
        coupling: f64,
        component_a: bool,
        _component_b: bool,
        _reference_energy: f64,
        efficiency: &EfficiencyCurve,
        production_anchor: f64,
        cut_position: f64,
    ) -> Result<f64> {
        if !component_a {
            return Ok(0.0);
        }
        let mut acceptance = 0.0;
        for i in 0..efficiency.n_bins() {
            let z = efficiency.bin_low_edge(i);
            if z < cut_position {
                continue;
            }
            let weight = ((production_anchor - z) / self.decay_length).exp() / self.decay_length;
            acceptance += weight * efficiency.lower_bound(i) * efficiency.bin_width();
        }
        Ok(self.normalization * coupling * coupling * acceptance)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let n_signal = 2000;
    let n_background = 50_000;
    let mut rng = StdRng::seed_from_u64(42);

    let mut sig_v = Vec::with_capacity(n_signal);
    let mut sig_z = Vec::with_capacity(n_signal);
    for _ in 0..n_signal {
        sig_v.push(rng.gen::<f64>() * 10.0);
        sig_z.push(-4.0 - 20.0 * (1.0 - rng.gen::<f64>()).ln());
    }
    let mut truth = Hist1D::new(200, -50.3, 149.7)?;
    for &z in &sig_z {
        truth.fill(z);
    }
    let signal = RowTable::from_columns([
        ("v".to_string(), sig_v),
        ("recon_z".to_string(), sig_z.clone()),
        ("true_z".to_string(), sig_z),
        ("mass".to_string(), vec![55.0; n_signal]),
    ])?;

    let mut bkg_v = Vec::with_capacity(n_background);
    let mut bkg_z = Vec::with_capacity(n_background);
    for _ in 0..n_background {
        // Background leaks toward low v and falls steeply in displacement.
        bkg_v.push(10.0 * rng.gen::<f64>().powi(2));
        bkg_z.push(-4.0 - 5.0 * (1.0 - rng.gen::<f64>()).ln());
    }
    let background = RowTable::from_columns([
        ("v".to_string(), bkg_v),
        ("recon_z".to_string(), bkg_z),
        ("mass".to_string(), vec![55.0; n_background]),
    ])?;

    let cut = CutSpec {
        name: "v_min".to_string(),
        variable: "v".to_string(),
        direction: CutDirection::GreaterThan,
        threshold: 0.0,
    };
    let config = OptimizationConfig {
        max_iteration: 8,
        step_size: 0.05,
        min_tail_events: 1.0,
        scan_cut_position: true,
        signal_mass: 55.0,
        mass_resolution: 3.0,
        mass_window_nsigma: 2.0,
        log_eps2: -6.5,
        reference_energy: 1.35,
        production_anchor: -4.3,
        scan_anchor: -4.0,
        tail_fit_max_events: 200.0,
        cut_variables: vec!["v".to_string()],
        new_variables: vec![],
        new_variable_params: vec![],
        shifts: vec![],
        recon_z_column: "recon_z".to_string(),
        true_z_column: "true_z".to_string(),
        mass_column: "mass".to_string(),
        tail_binning: Binning { bins: 150, low: -50.0, high: 100.0 },
        map_binning: Binning { bins: 300, low: -50.0, high: 100.0 },
        truth_binning: Binning { bins: 200, low: -50.3, high: 149.7 },
        variable_binning: BTreeMap::from([(
            "v".to_string(),
            Binning { bins: 100, low: 0.0, high: 10.0 },
        )]),
        persistent_cuts: vec![cut.clone()],
        candidate_cuts: vec![cut],
    };

    let mut driver = OptimizationDriver::new(
        config,
        signal,
        background,
        &truth,
        DecayedFlux { normalization: 1.5e8, decay_length: 20.0 },
    )?;
    let mut sink = MemorySink::default();
    let report = driver.run(&mut sink)?;

    for summary in &sink.iterations {
        match &summary.winner {
            Some(w) => println!(
                "iteration {:>2}: {:>5.1}% removed, promoted {} at {:.3} (ZBi {:.2})",
                summary.iteration, summary.removed_signal_pct, w.cut_name, w.threshold, w.significance
            ),
            None => println!("iteration {:>2}: no promotable candidate", summary.iteration),
        }
    }
    println!("final cuts: {}", serde_json::to_string(&report.final_cuts)?);
    Ok(())
}
