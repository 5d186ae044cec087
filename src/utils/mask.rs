//! Validity masks
//!
//! The validity mask marks voxels where the dual-echo decay model can hold:
//! both echoes clear their intensity cutoffs and the signal actually decays
//! between echoes.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::{Mask, ScalarField};
use crate::utils::algebra;

/// Minimum-intensity cutoffs for each echo
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputThreshold {
    pub min1: f64,
    pub min2: f64,
}

impl Default for InputThreshold {
    /// No lower bound beyond the non-negativity left by noise correction
    fn default() -> Self {
        Self { min1: 0.0, min2: 0.0 }
    }
}

/// Validity mask = (echo1 >= min1) AND (echo2 >= min2) AND (echo2 > echo1)
///
/// `echo2` is the longer echo after scaling. A zero cutoff lets zero-valued
/// voxels through the first two terms; choose a positive cutoff to keep
/// log(0) out of the log-ratio.
pub fn validity_mask(
    echo1: &ScalarField,
    echo2: &ScalarField,
    threshold: &InputThreshold,
) -> Result<Mask> {
    let above1 = algebra::threshold_mask(echo1, threshold.min1, f64::INFINITY);
    let above2 = algebra::threshold_mask(echo2, threshold.min2, f64::INFINITY);
    let decays = algebra::greater_than(echo2, echo1)?;
    above1.and(&above2)?.and(&decays)
}
