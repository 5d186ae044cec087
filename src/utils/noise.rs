//! Rician noise-bias correction for magnitude images
//!
//! Magnitude MR images carry a noise floor that lifts low-signal voxels. For a
//! known noise level sigma the first-order bias is removed with
//! `sqrt(max(m² − sigma², 0))`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::ScalarField;
use crate::utils::simd_ops;

/// Rician noise sigma for each echo
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseLevel {
    pub sigma1: f64,
    pub sigma2: f64,
}

impl NoiseLevel {
    pub fn new(sigma1: f64, sigma2: f64) -> Result<Self> {
        let level = Self { sigma1, sigma2 };
        level.validate()?;
        Ok(level)
    }

    /// Same sigma for both echoes
    pub fn uniform(sigma: f64) -> Result<Self> {
        Self::new(sigma, sigma)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, sigma) in [("sigma1", self.sigma1), ("sigma2", self.sigma2)] {
            if !(sigma >= 0.0) || !sigma.is_finite() {
                return Err(Error::InvalidParameter(format!(
                    "Noise level {} must be finite and >= 0, got {}",
                    name, sigma
                )));
            }
        }
        Ok(())
    }
}

/// Remove Rician noise bias from a magnitude image
///
/// Output is never negative and is exactly 0 wherever `m² <= sigma²`.
pub fn rician_correct(image: &ScalarField, sigma: f64) -> ScalarField {
    let mut out = vec![0.0; image.len()];
    simd_ops::rician_correct_f64(&mut out, image.data(), sigma);
    image.with_data(out)
}

/// Fallback when no noise level is known: clamp negatives to 0
pub fn clamp_non_negative(image: &ScalarField) -> ScalarField {
    crate::utils::algebra::clamp_min(image, 0.0)
}

/// Correct both echoes, each with its own sigma, or clamp both if `noise` is None
pub fn correct_echo_pair(
    echo1: &ScalarField,
    echo2: &ScalarField,
    noise: Option<&NoiseLevel>,
) -> (ScalarField, ScalarField) {
    match noise {
        Some(level) => (
            rician_correct(echo1, level.sigma1),
            rician_correct(echo2, level.sigma2),
        ),
        None => (clamp_non_negative(echo1), clamp_non_negative(echo2)),
    }
}
