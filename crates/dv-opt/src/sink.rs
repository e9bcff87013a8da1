//! Results-sink interface and the summary records flowing through it.
//!
//! The driver writes only at iteration boundaries and at finalize; how the
//! records are persisted (JSON file, database, nothing) is the sink
//! implementation's concern. All records are `Serialize` so an external
//! collaborator can store them without this crate defining a format.

use dv_core::Result;
use serde::Serialize;

/// One evaluated position of a candidate's cut-position scan.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScanPoint {
    /// Scanned cut position.
    pub position: f64,
    /// Expected signal yield (two-decimal rounded).
    pub signal_yield: f64,
    /// Extrapolated background yield (two-decimal rounded).
    pub background_yield: f64,
    /// Z-significance at this position; `None` when the inputs were
    /// outside the statistic's domain (surfaced, not coerced to zero).
    pub significance: Option<f64>,
}

/// The best-performing position of one candidate's scan.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BestScan {
    /// Cut position with the highest significance.
    pub position: f64,
    /// Significance at that position.
    pub significance: f64,
    /// Signal yield at that position.
    pub signal_yield: f64,
    /// Background yield at that position.
    pub background_yield: f64,
}

/// Per-candidate record of one iteration.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateOutcome {
    /// Candidate cut name.
    pub cut_name: String,
    /// Stable cut id (load order).
    pub cut_id: u32,
    /// Variable the cut applies to.
    pub variable: String,
    /// Threshold used this iteration (removes the round's fraction of the
    /// original signal distribution).
    pub threshold: f64,
    /// Whether the background tail fit converged; when false the scan was
    /// skipped for this round.
    pub fit_converged: bool,
    /// Best scan position, if any position produced a valid significance.
    pub best: Option<BestScan>,
    /// Full scan curve for diagnostics.
    pub scan: Vec<ScanPoint>,
}

/// The candidate promoted into the persistent set at the end of a round.
#[derive(Debug, Clone, Serialize)]
pub struct PromotedCut {
    /// Winning cut name.
    pub cut_name: String,
    /// Threshold written into the persistent set.
    pub threshold: f64,
    /// Best significance that won the round.
    pub significance: f64,
}

/// Summary of one optimization iteration.
#[derive(Debug, Clone, Serialize)]
pub struct IterationSummary {
    /// Iteration index (0-based).
    pub iteration: usize,
    /// Percent of the original signal distribution removed this round.
    pub removed_signal_pct: f64,
    /// Persistent cut thresholds at the start of the round.
    pub persistent: Vec<(String, f64)>,
    /// Per-candidate outcomes, in candidate load order.
    pub candidates: Vec<CandidateOutcome>,
    /// Promoted winner; `None` when every candidate failed this round.
    pub winner: Option<PromotedCut>,
}

/// Final report of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Number of iterations executed.
    pub iterations_run: usize,
    /// Final persistent cut thresholds.
    pub final_cuts: Vec<(String, f64)>,
}

/// Destination for per-iteration summaries and the final report.
pub trait ResultsSink {
    /// Called once at the end of every iteration.
    fn on_iteration(&mut self, summary: &IterationSummary) -> Result<()>;
    /// Called once after the last iteration.
    fn on_finalize(&mut self, report: &RunReport) -> Result<()>;
}

/// In-memory sink, used by tests and small drivers.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Collected iteration summaries.
    pub iterations: Vec<IterationSummary>,
    /// Final report, set at finalize.
    pub report: Option<RunReport>,
}

impl ResultsSink for MemorySink {
    fn on_iteration(&mut self, summary: &IterationSummary) -> Result<()> {
        self.iterations.push(summary.clone());
        Ok(())
    }

    fn on_finalize(&mut self, report: &RunReport) -> Result<()> {
        self.report = Some(report.clone());
        Ok(())
    }
}
