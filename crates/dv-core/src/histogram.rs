//! Fixed-binning histograms used as the working distributions of the
//! optimization loop.
//!
//! Binning is uniform and immutable after construction; fills outside the
//! axis range are dropped. `Hist1D` additionally provides the cumulative
//! one-sided threshold lookup the driver uses to remove a target fraction
//! of a baseline integral, and the right-tail statistics anchor used to
//! choose a fit range.

use crate::error::{Error, Result};

fn check_axis(n_bins: usize, low: f64, high: f64, axis: &str) -> Result<()> {
    if n_bins == 0 {
        return Err(Error::Validation(format!("{axis} axis requires at least one bin")));
    }
    if !low.is_finite() || !high.is_finite() || low >= high {
        return Err(Error::Validation(format!(
            "invalid {axis} axis range: expected finite low < high, got ({low}, {high})"
        )));
    }
    Ok(())
}

/// A 1D histogram with uniform binning.
#[derive(Debug, Clone)]
pub struct Hist1D {
    n_bins: usize,
    low: f64,
    high: f64,
    counts: Vec<f64>,
    entries: u64,
}

impl Hist1D {
    /// Create an empty histogram with `n_bins` uniform bins over `[low, high)`.
    pub fn new(n_bins: usize, low: f64, high: f64) -> Result<Self> {
        check_axis(n_bins, low, high, "x")?;
        Ok(Self { n_bins, low, high, counts: vec![0.0; n_bins], entries: 0 })
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

    /// Bin index containing `x`, or `None` when `x` is outside `[low, high)`.
    pub fn bin_index(&self, x: f64) -> Option<usize> {
        if !x.is_finite() || x < self.low || x >= self.high {
            return None;
        }
        let i = ((x - self.low) / self.bin_width()) as usize;
        Some(i.min(self.n_bins - 1))
    }

    /// Lower edge of bin `i`.
    pub fn bin_low_edge(&self, i: usize) -> f64 {
        self.low + i as f64 * self.bin_width()
    }

    /// Upper edge of bin `i`.
    pub fn bin_up_edge(&self, i: usize) -> f64 {
        self.low + (i + 1) as f64 * self.bin_width()
    }

    /// Center of bin `i`.
    pub fn bin_center(&self, i: usize) -> f64 {
        self.low + (i as f64 + 0.5) * self.bin_width()
    }

    /// Fill with unit weight.
    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    /// Fill with weight `w`. Out-of-range values are dropped.
    pub fn fill_weighted(&mut self, x: f64, w: f64) {
        if let Some(i) = self.bin_index(x) {
            self.counts[i] += w;
            self.entries += 1;
        }
    }

    /// Zero all bin contents and the entry count.
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0.0);
        self.entries = 0;
    }

    /// Bin contents.
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Number of stored fills.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Overwrite the content of bin `i` (used when copying an externally
    /// supplied spectrum into a locally owned histogram).
    pub fn set_bin_content(&mut self, i: usize, value: f64) -> Result<()> {
        if i >= self.n_bins {
            return Err(Error::Validation(format!(
                "bin index {i} out of range for {} bins",
                self.n_bins
            )));
        }
        self.counts[i] = value;
        Ok(())
    }

    /// True when this histogram shares the exact binning of `other`.
    pub fn same_binning(&self, other: &Hist1D) -> bool {
        self.n_bins == other.n_bins && self.low == other.low && self.high == other.high
    }

    /// Sum of all bin contents.
    pub fn integral(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Threshold that removes at least `fraction` of `baseline` from this
    /// distribution, looked up on cumulative bin sums.
    ///
    /// `remove_from_low` selects the side the cut consumes: a greater-than
    /// cut keeps the high side, so removal accumulates from the low edge
    /// upward and the returned threshold is a bin edge; a less-than cut
    /// accumulates from the high edge downward. With `fraction = 0` the
    /// untouched outer edge is returned. When the cumulative sum never
    /// reaches the target the far edge is returned (the whole distribution
    /// is removed).
    pub fn threshold_for_removed_fraction(
        &self,
        remove_from_low: bool,
        fraction: f64,
        baseline: f64,
    ) -> f64 {
        let target = fraction * baseline;
        if remove_from_low {
            let mut removed = 0.0;
            for i in 0..self.n_bins {
                if removed >= target {
                    return self.bin_low_edge(i);
                }
                removed += self.counts[i];
            }
            self.high
        } else {
            let mut removed = 0.0;
            for i in (0..self.n_bins).rev() {
                if removed >= target {
                    return self.bin_up_edge(i);
                }
                removed += self.counts[i];
            }
            self.low
        }
    }

    /// Lowest bin edge from which the right-tail content is at most
    /// `max_events`; used to anchor a tail fit on the sparse part of the
    /// distribution. Returns the axis low edge when the whole histogram
    /// holds no more than `max_events`.
    pub fn tail_start_for_count(&self, max_events: f64) -> f64 {
        let mut tail: f64 = self.integral();
        for i in 0..self.n_bins {
            if tail <= max_events {
                return self.bin_low_edge(i);
            }
            tail -= self.counts[i];
        }
        self.bin_low_edge(self.n_bins - 1)
    }
}

/// A 2D histogram with uniform binning on both axes.
#[derive(Debug, Clone)]
pub struct Hist2D {
    nx: usize,
    x_low: f64,
    x_high: f64,
    ny: usize,
    y_low: f64,
    y_high: f64,
    // x-major: counts[ix * ny + iy]
    counts: Vec<f64>,
    entries: u64,
}

impl Hist2D {
    /// Create an empty 2D histogram.
    pub fn new(
        nx: usize,
        x_low: f64,
        x_high: f64,
        ny: usize,
        y_low: f64,
        y_high: f64,
    ) -> Result<Self> {
        check_axis(nx, x_low, x_high, "x")?;
        check_axis(ny, y_low, y_high, "y")?;
        Ok(Self { nx, x_low, x_high, ny, y_low, y_high, counts: vec![0.0; nx * ny], entries: 0 })
    }

    /// Number of x bins.
    pub fn n_bins_x(&self) -> usize {
        self.nx
    }

    /// Number of y bins.
    pub fn n_bins_y(&self) -> usize {
        self.ny
    }

    fn x_bin_index(&self, x: f64) -> Option<usize> {
        if !x.is_finite() || x < self.x_low || x >= self.x_high {
            return None;
        }
        let w = (self.x_high - self.x_low) / self.nx as f64;
        Some((((x - self.x_low) / w) as usize).min(self.nx - 1))
    }

    fn y_bin_index(&self, y: f64) -> Option<usize> {
        if !y.is_finite() || y < self.y_low || y >= self.y_high {
            return None;
        }
        let w = (self.y_high - self.y_low) / self.ny as f64;
        Some((((y - self.y_low) / w) as usize).min(self.ny - 1))
    }

    /// First x-bin index strictly beyond the bin containing `x`.
    ///
    /// Returns `0` for `x` below the axis (every bin qualifies) and `nx`
    /// for `x` at or beyond the upper edge (no bin qualifies).
    pub fn x_bin_after(&self, x: f64) -> usize {
        if x < self.x_low {
            return 0;
        }
        match self.x_bin_index(x) {
            Some(i) => i + 1,
            None => self.nx,
        }
    }

    /// Fill with unit weight.
    pub fn fill(&mut self, x: f64, y: f64) {
        self.fill_weighted(x, y, 1.0);
    }

    /// Fill with weight `w`. Out-of-range values are dropped.
    pub fn fill_weighted(&mut self, x: f64, y: f64, w: f64) {
        if let (Some(ix), Some(iy)) = (self.x_bin_index(x), self.y_bin_index(y)) {
            self.counts[ix * self.ny + iy] += w;
            self.entries += 1;
        }
    }

    /// Zero all bin contents and the entry count.
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0.0);
        self.entries = 0;
    }

    /// Number of stored fills.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Marginal projection onto the y axis over x bins `x_from..nx`.
    ///
    /// The result carries the y-axis binning, so it can be compared
    /// bin-for-bin with any histogram sharing that binning.
    pub fn projection_y(&self, x_from: usize) -> Hist1D {
        let mut out = Hist1D {
            n_bins: self.ny,
            low: self.y_low,
            high: self.y_high,
            counts: vec![0.0; self.ny],
            entries: 0,
        };
        for ix in x_from.min(self.nx)..self.nx {
            for iy in 0..self.ny {
                out.counts[iy] += self.counts[ix * self.ny + iy];
            }
        }
        out
    }
}
