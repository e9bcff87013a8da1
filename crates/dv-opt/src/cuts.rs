//! Cut definitions and pass/fail evaluation.
//!
//! A cut is a (variable, threshold, direction) triple with a stable id
//! assigned in load order. Two sets coexist at runtime: the persistent
//! set, applied to every event and monotonically tightened, and the
//! candidate set, whose thresholds are re-derived every iteration.

use std::collections::HashMap;

use dv_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::table::RowTable;

/// Which side of the threshold a value must fall on to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutDirection {
    /// Pass iff `value > threshold`.
    GreaterThan,
    /// Pass iff `value < threshold`.
    LessThan,
}

impl CutDirection {
    /// Whether tightening this cut consumes the distribution from the low
    /// side (greater-than keeps the high side).
    pub fn removes_from_low(self) -> bool {
        matches!(self, CutDirection::GreaterThan)
    }
}

/// Serde-facing cut definition as it appears in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutSpec {
    /// Unique cut identifier.
    pub name: String,
    /// Column the cut applies to.
    pub variable: String,
    /// Pass direction.
    pub direction: CutDirection,
    /// Initial threshold; overwritten by the driver before use.
    #[serde(default)]
    pub threshold: f64,
}

/// A single loaded cut.
#[derive(Debug, Clone)]
pub struct Cut {
    /// Unique name within the set.
    pub name: String,
    /// Column the cut applies to.
    pub variable: String,
    /// Pass direction (fixed after load).
    pub direction: CutDirection,
    /// Current threshold (mutable).
    pub threshold: f64,
    /// Stable id assigned in load order, used in summary records.
    pub id: u32,
}

impl Cut {
    /// Strict-inequality pass test; a value exactly at the threshold fails.
    pub fn passes(&self, value: f64) -> bool {
        match self.direction {
            CutDirection::GreaterThan => value > self.threshold,
            CutDirection::LessThan => value < self.threshold,
        }
    }
}

/// A named, ordered collection of cuts.
#[derive(Debug, Clone)]
pub struct CutSet {
    label: String,
    cuts: Vec<Cut>,
    name_to_index: HashMap<String, usize>,
}

impl CutSet {
    /// Load cuts from configuration, assigning stable ids in load order.
    pub fn from_specs(label: &str, specs: &[CutSpec]) -> Result<Self> {
        let mut cuts = Vec::with_capacity(specs.len());
        let mut name_to_index = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if name_to_index.contains_key(&spec.name) {
                return Err(Error::Config(format!(
                    "duplicate cut name '{}' in {label} cuts",
                    spec.name
                )));
            }
            name_to_index.insert(spec.name.clone(), i);
            cuts.push(Cut {
                name: spec.name.clone(),
                variable: spec.variable.clone(),
                direction: spec.direction,
                threshold: spec.threshold,
                id: i as u32,
            });
        }
        Ok(Self { label: label.to_string(), cuts, name_to_index })
    }

    /// Drop every cut whose variable is not in `variables`, so one cut
    /// configuration can serve runs over different variable subsets.
    /// Original load-order ids are kept.
    pub fn restrict_to(&mut self, variables: &[String]) {
        self.cuts.retain(|c| variables.iter().any(|v| v == &c.variable));
        self.name_to_index =
            self.cuts.iter().enumerate().map(|(i, c)| (c.name.clone(), i)).collect();
    }

    /// Set label given at load time.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of cuts.
    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    /// True when the set holds no cuts.
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// Iterate cuts in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Cut> {
        self.cuts.iter()
    }

    /// Look up a cut by name.
    pub fn cut(&self, name: &str) -> Option<&Cut> {
        self.name_to_index.get(name).map(|&i| &self.cuts[i])
    }

    fn cut_mut(&mut self, name: &str) -> Result<&mut Cut> {
        let label = self.label.clone();
        match self.name_to_index.get(name) {
            Some(&i) => Ok(&mut self.cuts[i]),
            None => Err(Error::Validation(format!("no cut '{name}' in {label} cuts"))),
        }
    }

    /// Current threshold of a cut.
    pub fn threshold(&self, name: &str) -> Result<f64> {
        self.cut(name)
            .map(|c| c.threshold)
            .ok_or_else(|| Error::Validation(format!("no cut '{name}' in {} cuts", self.label)))
    }

    /// Update the threshold of a cut.
    pub fn set_threshold(&mut self, name: &str, value: f64) -> Result<()> {
        self.cut_mut(name)?.threshold = value;
        Ok(())
    }

    /// Strict pass test for one cut by name.
    pub fn passes(&self, name: &str, value: f64) -> Result<bool> {
        self.cut(name)
            .map(|c| c.passes(value))
            .ok_or_else(|| Error::Validation(format!("no cut '{name}' in {} cuts", self.label)))
    }

    /// Whether the current row of `table` fails any cut in the set.
    ///
    /// Cuts whose variable does not exist in the table are skipped and can
    /// never cause failure; not every variable is present in every
    /// dataset.
    pub fn fails_row(&self, table: &RowTable) -> Result<bool> {
        for cut in &self.cuts {
            if !table.column_exists(&cut.variable) {
                continue;
            }
            if !cut.passes(table.value(&cut.variable)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
