//! Mutable in-memory row table (Structure-of-Arrays).
//!
//! One row per event, named numeric columns of equal length. The table is
//! built once from externally loaded columns and then mutated in place:
//! derived columns are computed and inserted as ordinary columns, constant
//! shifts correct known biases, and a mass window is recorded on a
//! designated column for later acceptance bookkeeping (rows are never
//! removed). Row access is cursor-based.

use std::collections::HashMap;

use dv_core::{Error, Result};

/// Scalar validity window recorded on a designated mass column.
#[derive(Debug, Clone)]
pub struct MassWindow {
    /// Column the window applies to.
    pub column: String,
    /// Inclusive lower bound.
    pub low: f64,
    /// Inclusive upper bound.
    pub high: f64,
}

/// Mutable per-event table with named numeric columns.
#[derive(Debug, Clone)]
pub struct RowTable {
    n_rows: usize,
    column_names: Vec<String>,
    columns: Vec<Vec<f64>>,
    name_to_index: HashMap<String, usize>,
    cursor: Option<usize>,
    mass_window: Option<MassWindow>,
}

impl RowTable {
    /// Build a table from materialized columns.
    ///
    /// Column names must be unique and all columns must have equal length;
    /// a malformed table is fatal at initialization.
    pub fn from_columns(columns: impl IntoIterator<Item = (String, Vec<f64>)>) -> Result<Self> {
        let mut column_names = Vec::new();
        let mut cols: Vec<Vec<f64>> = Vec::new();
        let mut name_to_index = HashMap::new();
        let mut n_rows: Option<usize> = None;

        for (name, col) in columns {
            if name_to_index.contains_key(&name) {
                return Err(Error::Validation(format!("duplicate column name '{name}'")));
            }
            if let Some(n) = n_rows {
                if col.len() != n {
                    return Err(Error::Validation(format!(
                        "column length mismatch for '{name}': expected {n}, got {}",
                        col.len()
                    )));
                }
            } else {
                n_rows = Some(col.len());
            }
            name_to_index.insert(name.clone(), cols.len());
            column_names.push(name);
            cols.push(col);
        }

        if column_names.is_empty() {
            return Err(Error::Validation("table requires at least one column".to_string()));
        }

        Ok(Self {
            n_rows: n_rows.unwrap_or(0),
            column_names,
            columns: cols,
            name_to_index,
            cursor: None,
            mass_window: None,
        })
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Names of stored columns (insertion order).
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Existence probe used to keep downstream logic tolerant of optional
    /// columns.
    pub fn column_exists(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Bulk access to a column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let idx = self.name_to_index.get(name).copied()?;
        self.columns.get(idx).map(|c| c.as_slice())
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.name_to_index
            .get(name)
            .copied()
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    /// Compute a new column from existing ones and insert it.
    ///
    /// `f` is evaluated once per row over the values of `inputs` (in
    /// order). Referencing an unknown input column is an error, as is
    /// re-using an existing column name.
    pub fn add_derived_column<F>(&mut self, name: &str, inputs: &[&str], f: F) -> Result<()>
    where
        F: Fn(&[f64]) -> f64,
    {
        if self.name_to_index.contains_key(name) {
            return Err(Error::Validation(format!("column '{name}' already exists")));
        }
        let input_idx: Vec<usize> =
            inputs.iter().map(|c| self.index_of(c)).collect::<Result<_>>()?;

        let mut out = Vec::with_capacity(self.n_rows);
        let mut buf = vec![0.0f64; input_idx.len()];
        for row in 0..self.n_rows {
            for (slot, &idx) in buf.iter_mut().zip(&input_idx) {
                *slot = self.columns[idx][row];
            }
            out.push(f(&buf));
        }

        self.name_to_index.insert(name.to_string(), self.columns.len());
        self.column_names.push(name.to_string());
        self.columns.push(out);
        Ok(())
    }

    /// Add a constant to every stored value of a column.
    pub fn shift_column(&mut self, name: &str, delta: f64) -> Result<()> {
        let idx = self.index_of(name)?;
        for v in &mut self.columns[idx] {
            *v += delta;
        }
        Ok(())
    }

    /// Record a validity window on a designated mass column.
    ///
    /// Rows outside the window are not removed; they are excluded through
    /// [`RowTable::in_mass_window`] wherever acceptance matters. The
    /// column is allowed to be absent, in which case the predicate always
    /// passes.
    pub fn define_mass_window(&mut self, column: &str, low: f64, high: f64) -> Result<()> {
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(Error::Validation(format!(
                "invalid mass window: expected finite low < high, got ({low}, {high})"
            )));
        }
        if !self.column_exists(column) {
            log::warn!("mass window on absent column '{column}': every row will pass");
        }
        self.mass_window = Some(MassWindow { column: column.to_string(), low, high });
        Ok(())
    }

    /// The recorded mass window, if any.
    pub fn mass_window(&self) -> Option<&MassWindow> {
        self.mass_window.as_ref()
    }

    /// Move the row cursor.
    pub fn advance_to(&mut self, row: usize) -> Result<()> {
        if row >= self.n_rows {
            return Err(Error::Cursor(format!(
                "row {row} out of range for {} rows",
                self.n_rows
            )));
        }
        self.cursor = Some(row);
        Ok(())
    }

    /// Value of `name` at the current cursor position.
    ///
    /// Fails if the cursor was never advanced or the column is unknown.
    pub fn value(&self, name: &str) -> Result<f64> {
        let row = self
            .cursor
            .ok_or_else(|| Error::Cursor("cursor was never advanced".to_string()))?;
        let idx = self.index_of(name)?;
        Ok(self.columns[idx][row])
    }

    /// Whether the current row lies inside the recorded mass window.
    ///
    /// True when no window was defined or the designated column is absent.
    pub fn in_mass_window(&self) -> Result<bool> {
        let Some(window) = &self.mass_window else {
            return Ok(true);
        };
        if !self.column_exists(&window.column) {
            return Ok(true);
        }
        let mass = self.value(&window.column)?;
        Ok(mass >= window.low && mass <= window.high)
    }
}
