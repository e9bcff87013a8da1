//! # dv-core
//!
//! Core types shared across the dv workspace: the error type and the
//! histogram primitives every other crate fills, projects, and fits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod histogram;

pub use error::{Error, Result};
pub use histogram::{Hist1D, Hist2D};
