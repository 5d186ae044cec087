//! Calibration of relaxometry inputs from a reference region
//!
//! Two quantities feed the relaxometry engine:
//!
//! - The echo-2 scale factor, from a reference material of known R2*:
//!   `scale = mean(S1) / (mean(S2) · exp(R2*_ref · (TE2 − TE1)))`
//! - The Rician noise sigma, from two repeated acquisitions of a static
//!   object: `sigma = mean(|A − B|) / sqrt(π/2)`, or from the spread of a
//!   single image inside a background region.
//!
//! Region means and deviations come from a `RoiStatistics` provider.

use std::f64::consts::PI;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::field::ScalarField;
use crate::relaxometry::RelaxometryParams;
use crate::utils::algebra;
use crate::utils::noise::NoiseLevel;
use crate::utils::statistics::RoiStatistics;

/// A labelled region used for calibration statistics
#[derive(Clone, Copy)]
pub struct Region<'a> {
    pub labels: &'a ScalarField,
    pub label: i64,
}

impl<'a> Region<'a> {
    pub fn new(labels: &'a ScalarField, label: i64) -> Self {
        Self { labels, label }
    }
}

/// Derived calibration values
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Calibration {
    pub scale_factor: Option<f64>,
    pub noise_level: Option<NoiseLevel>,
}

impl Calibration {
    /// Copy the derived values into a parameter set, leaving others untouched
    pub fn apply_to(&self, params: &mut RelaxometryParams) {
        if let Some(scale) = self.scale_factor {
            params.scale_factor = scale;
        }
        if let Some(noise) = self.noise_level {
            params.noise_level = Some(noise);
        }
    }
}

/// Echo-2 gain from a reference region of known R2*
///
/// # Arguments
/// * `echo1`, `echo2` - Magnitude echoes
/// * `region` - Reference material region
/// * `te1`, `te2` - Echo times in seconds
/// * `ref_r2star` - Known R2* of the reference material in 1/s
pub fn estimate_scale_factor<S: RoiStatistics + ?Sized>(
    stats: &S,
    echo1: &ScalarField,
    echo2: &ScalarField,
    region: Region<'_>,
    te1: f64,
    te2: f64,
    ref_r2star: f64,
) -> Result<f64> {
    let mean1 = stats.region_stats(echo1, region.labels, region.label)?.mean;
    let mean2 = stats.region_stats(echo2, region.labels, region.label)?.mean;

    let expected_decay = (ref_r2star * (te2 - te1)).exp();
    let denominator = mean2 * expected_decay;
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(Error::InvalidParameter(format!(
            "Cannot derive scale factor: mean echo 2 = {}, decay factor = {}",
            mean2, expected_decay
        )));
    }

    let scale = mean1 / denominator;
    debug!(
        "Scale factor: mean1={:.4} mean2={:.4} decay={:.6} -> {:.6}",
        mean1, mean2, expected_decay, scale
    );
    if !(scale >= 0.0) {
        warn!("Derived scale factor {} is negative", scale);
    }
    Ok(scale)
}

/// Rician sigma from two repeated acquisitions of a static object
pub fn estimate_noise_from_pair<S: RoiStatistics + ?Sized>(
    stats: &S,
    image_a: &ScalarField,
    image_b: &ScalarField,
    region: Region<'_>,
) -> Result<f64> {
    let abs_diff = algebra::abs_difference(image_a, image_b)?;
    let mean_abs_diff = stats.region_stats(&abs_diff, region.labels, region.label)?.mean;
    Ok(mean_abs_diff / (PI / 2.0).sqrt())
}

/// Rician sigma from the spread of one image inside a region
pub fn estimate_noise_from_region<S: RoiStatistics + ?Sized>(
    stats: &S,
    image: &ScalarField,
    region: Region<'_>,
) -> Result<f64> {
    Ok(stats.region_stats(image, region.labels, region.label)?.stddev)
}

/// Sigma from the first candidate pair that yields an estimate
///
/// Repeated acquisitions are not always available for every time point; the
/// next candidate is tried whenever one fails.
pub fn estimate_noise_from_candidates<S: RoiStatistics + ?Sized>(
    stats: &S,
    candidates: &[(&ScalarField, &ScalarField)],
    region: Region<'_>,
) -> Result<f64> {
    let mut last_error = Error::MissingInput("noise estimation image pair".to_string());
    for (i, (a, b)) in candidates.iter().enumerate() {
        match estimate_noise_from_pair(stats, a, b, region) {
            Ok(sigma) => return Ok(sigma),
            Err(e) => {
                warn!("Noise estimate from candidate pair {} failed: {}", i, e);
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Noise level for both echoes from repeated acquisitions of each echo
pub fn estimate_noise_level<S: RoiStatistics + ?Sized>(
    stats: &S,
    echo1_pair: (&ScalarField, &ScalarField),
    echo2_pair: (&ScalarField, &ScalarField),
    region: Region<'_>,
) -> Result<NoiseLevel> {
    let sigma1 = estimate_noise_from_pair(stats, echo1_pair.0, echo1_pair.1, region)?;
    let sigma2 = estimate_noise_from_pair(stats, echo2_pair.0, echo2_pair.1, region)?;
    info!("Estimated noise level: sigma1={:.4}, sigma2={:.4}", sigma1, sigma2);
    NoiseLevel::new(sigma1, sigma2)
}

/// Derive whatever calibration the available inputs allow
///
/// # Arguments
/// * `echo1`, `echo2` - Magnitude echoes of the acquisition being calibrated
/// * `region` - Reference region, used for both estimates
/// * `params` - Echo times
/// * `reference_r2star` - Known R2* of the reference material; enables the scale factor
/// * `repeats` - Repeated acquisitions `(echo1, echo2)`; enables the noise level
pub fn calibrate<S: RoiStatistics + ?Sized>(
    stats: &S,
    echo1: &ScalarField,
    echo2: &ScalarField,
    region: Region<'_>,
    params: &RelaxometryParams,
    reference_r2star: Option<f64>,
    repeats: Option<(&ScalarField, &ScalarField)>,
) -> Result<Calibration> {
    let scale_factor = match reference_r2star {
        Some(r2) => Some(estimate_scale_factor(
            stats, echo1, echo2, region, params.te1, params.te2, r2,
        )?),
        None => None,
    };
    let noise_level = match repeats {
        Some((repeat1, repeat2)) => Some(estimate_noise_level(
            stats, (echo1, repeat1), (echo2, repeat2), region,
        )?),
        None => None,
    };
    Ok(Calibration { scale_factor, noise_level })
}
