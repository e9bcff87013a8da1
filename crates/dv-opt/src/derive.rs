//! Named derived-variable kinds.
//!
//! The configuration lists derived-variable kinds and an index-aligned
//! parameter list; each kind expands into one or more ordinary columns on
//! a table before the optimization starts. An unknown kind is a fatal
//! configuration error; a kind whose input columns are absent from a
//! particular table is skipped with a warning, matching the tolerance for
//! optional columns elsewhere.

use dv_core::{Error, Result};

use crate::table::RowTable;

/// The two track sides contributing per-track columns.
const TRACK_SIDES: [&str; 2] = ["ele", "pos"];

/// Install a named derived-variable kind on `table`.
///
/// `recon_z` names the reconstructed-displacement column used by
/// projection-style kinds. Returns `true` when at least one column was
/// added.
///
/// Kinds:
/// - `"zalpha"`: per-track skew-corrected displacement projection
///   `<side>_track_zalpha = recon_z - <side>_track_z0 / slope`, with
///   `slope` the aligned parameter (must be nonzero);
/// - `"z0sum"`: summed track impact parameters
///   `track_z0_sum = ele_track_z0 + pos_track_z0` (parameter unused).
pub fn install(table: &mut RowTable, kind: &str, param: f64, recon_z: &str) -> Result<bool> {
    match kind {
        "zalpha" => {
            if param == 0.0 || !param.is_finite() {
                return Err(Error::Config(format!(
                    "derived variable 'zalpha' requires a finite nonzero slope, got {param}"
                )));
            }
            let mut added = false;
            for side in TRACK_SIDES {
                let z0 = format!("{side}_track_z0");
                let name = format!("{side}_track_zalpha");
                if !table.column_exists(recon_z) || !table.column_exists(&z0) {
                    log::warn!(
                        "skipping derived column '{name}': missing input '{}'",
                        if table.column_exists(recon_z) { z0.as_str() } else { recon_z }
                    );
                    continue;
                }
                table.add_derived_column(&name, &[recon_z, &z0], move |v| v[0] - v[1] / param)?;
                added = true;
            }
            Ok(added)
        }
        "z0sum" => {
            let inputs = ["ele_track_z0", "pos_track_z0"];
            if inputs.iter().any(|c| !table.column_exists(c)) {
                log::warn!("skipping derived column 'track_z0_sum': missing track inputs");
                return Ok(false);
            }
            table.add_derived_column("track_z0_sum", &inputs, |v| v[0] + v[1])?;
            Ok(true)
        }
        other => Err(Error::Config(format!("unknown derived variable kind '{other}'"))),
    }
}
