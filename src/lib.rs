//! R2*-Core: dual-echo relaxometry and MR thermometry
//!
//! Computes T2*/R2* maps from pairs of magnitude echoes and maps R2* to
//! temperature, absolute or relative to a baseline acquisition.
//!
//! # Modules
//! - `field`: Scalar fields and masks on a voxel grid
//! - `utils`: Image algebra, noise correction, validity masks, ROI statistics
//! - `relaxometry`: T2*/R2* engine
//! - `temperature`: R2* → temperature mapping
//! - `calibration`: Scale factor and noise level from reference regions
//! - `config`: JSON parameter files
//! - `nifti_io`: NIfTI load/save

// Core modules
pub mod error;
pub mod field;

// Algorithm modules
pub mod utils;
pub mod relaxometry;
pub mod temperature;
pub mod calibration;

// Configuration and I/O
pub mod config;
pub mod nifti_io;

pub use error::{Error, Result};
pub use field::{Geometry, Mask, ScalarField};
pub use relaxometry::{compute_relaxation_maps, MapSelection, RelaxationMaps, RelaxometryParams};
pub use temperature::{TemperatureCalibration, TemperatureParams};
