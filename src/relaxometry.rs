//! Dual-echo T2* / R2* relaxometry
//!
//! For two magnitude echoes acquired at TE1 and TE2 the mono-exponential
//! decay model gives
//!
//! ```text
//! T2* = (TE1 − TE2) / ln(S2 / S1)
//! R2* = ln(S2 / S1) / (TE1 − TE2)
//! ```
//!
//! The pipeline per call:
//! 1. Rician noise correction per echo (or a clamp to `[0, ∞)` without a noise level)
//! 2. Scale echo 2 by the inter-echo gain factor
//! 3. Validity mask (only when a `min_t2star` fill is given)
//! 4. Log-ratio and the requested maps
//! 5. Invalid voxels replaced by the fill (`min_t2star`, `1 / min_t2star` for R2*)
//! 6. Optional output window (out-of-range → 0)
//!
//! The validity mask is what keeps log(0) and division by zero out of the
//! maps. With the default zero input threshold a voxel with echo 1 = 0 and
//! echo 2 > 0 passes the mask; it is logged as degenerate and filled. Pick a
//! positive threshold so the mask excludes such voxels up front.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::{Mask, ScalarField};
use crate::utils::algebra::{self, OutputRange};
use crate::utils::mask::{validity_mask, InputThreshold};
use crate::utils::noise::{correct_echo_pair, NoiseLevel};

/// Acquisition and masking parameters for one relaxometry computation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaxometryParams {
    /// First echo time in seconds
    pub te1: f64,
    /// Second echo time in seconds
    pub te2: f64,
    /// Gain applied to echo 2 before the log-ratio
    pub scale_factor: f64,
    /// Rician noise sigma per echo; None clamps negatives instead
    pub noise_level: Option<NoiseLevel>,
    /// Minimum echo intensities for a voxel to count as valid
    pub input_threshold: Option<InputThreshold>,
    /// T2* fill for invalid voxels in seconds; enables the validity mask
    pub min_t2star: Option<f64>,
    /// Window applied to each finished map
    pub output_range: Option<OutputRange>,
}

impl Default for RelaxometryParams {
    fn default() -> Self {
        Self {
            // UTE dual-echo protocol
            te1: 0.00007,
            te2: 0.002,
            scale_factor: 1.0,
            noise_level: None,
            input_threshold: None,
            min_t2star: None,
            output_range: None,
        }
    }
}

impl RelaxometryParams {
    pub fn new(te1: f64, te2: f64) -> Self {
        Self { te1, te2, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, te) in [("te1", self.te1), ("te2", self.te2)] {
            if !(te > 0.0) || !te.is_finite() {
                return Err(Error::InvalidParameter(format!(
                    "Echo time {} must be finite and > 0, got {}", name, te
                )));
            }
        }
        if self.te1 == self.te2 {
            return Err(Error::InvalidParameter(format!(
                "Echo times must differ, both are {}", self.te1
            )));
        }
        if !(self.scale_factor >= 0.0) || !self.scale_factor.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "Scale factor must be finite and >= 0, got {}", self.scale_factor
            )));
        }
        if let Some(noise) = &self.noise_level {
            noise.validate()?;
        }
        if let Some(min_t2star) = self.min_t2star {
            if !(min_t2star >= 0.0) || !min_t2star.is_finite() {
                return Err(Error::InvalidParameter(format!(
                    "min_t2star must be finite and >= 0, got {}", min_t2star
                )));
            }
        }
        if self.input_threshold.is_some() && self.min_t2star.is_none() {
            return Err(Error::MissingInput(
                "min_t2star (required when an input threshold is set)".to_string(),
            ));
        }
        if let Some(range) = &self.output_range {
            range.validate()?;
        }
        Ok(())
    }

    /// Fill values (T2*, R2*) for invalid voxels
    pub fn fill_values(&self) -> Option<(f64, f64)> {
        self.min_t2star.map(|t2| {
            let r2 = if t2 == 0.0 { 0.0 } else { 1.0 / t2 };
            (t2, r2)
        })
    }
}

/// Which maps to produce
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapSelection {
    pub t2star: bool,
    pub r2star: bool,
}

impl MapSelection {
    pub const BOTH: MapSelection = MapSelection { t2star: true, r2star: true };
    pub const T2STAR: MapSelection = MapSelection { t2star: true, r2star: false };
    pub const R2STAR: MapSelection = MapSelection { t2star: false, r2star: true };
}

impl Default for MapSelection {
    fn default() -> Self {
        Self::BOTH
    }
}

/// Result of a relaxometry computation
#[derive(Clone, Debug)]
pub struct RelaxationMaps {
    /// T2* in seconds, if requested
    pub t2star: Option<ScalarField>,
    /// R2* in 1/s, if requested
    pub r2star: Option<ScalarField>,
    /// Voxels that passed the validity mask (all voxels when masking is off)
    pub valid_voxels: usize,
    /// Voxels that passed the validity mask but had a zero, infinite or NaN
    /// log-ratio
    pub degenerate_voxels: usize,
}

/// Unwrap an optional image or fail with `MissingInput`
pub fn require<'a>(image: Option<&'a ScalarField>, name: &str) -> Result<&'a ScalarField> {
    image.ok_or_else(|| Error::MissingInput(name.to_string()))
}

/// Compute T2* and/or R2* maps from two magnitude echoes
///
/// # Arguments
/// * `echo1` - Magnitude image at TE1
/// * `echo2` - Magnitude image at TE2, same grid as `echo1`
/// * `params` - Echo times, noise, masking and output parameters
/// * `selection` - Maps to compute
///
/// # Returns
/// RelaxationMaps with the requested maps. Without `min_t2star` no mask is
/// applied and voxels with a degenerate log-ratio keep their Inf/NaN value;
/// with it, the final maps are finite everywhere.
pub fn compute_relaxation_maps(
    echo1: &ScalarField,
    echo2: &ScalarField,
    params: &RelaxometryParams,
    selection: MapSelection,
) -> Result<RelaxationMaps> {
    if !selection.t2star && !selection.r2star {
        return Err(Error::MissingInput("output map (T2* or R2*)".to_string()));
    }
    params.validate()?;
    echo1.geometry().ensure_compatible(echo2.geometry())?;

    debug!(
        "Relaxometry: TE1={} s, TE2={} s, scale={}, noise={:?}, threshold={:?}, min_t2star={:?}, range={:?}",
        params.te1, params.te2, params.scale_factor, params.noise_level,
        params.input_threshold, params.min_t2star, params.output_range
    );
    if params.te2 < params.te1 {
        warn!(
            "TE2 ({}) < TE1 ({}): T2* and R2* change sign",
            params.te2, params.te1
        );
    }
    if params.min_t2star == Some(0.0) {
        warn!("min_t2star is 0: invalid voxels are filled with 0 in both maps");
    }

    // Steps 1-2: noise correction, echo-2 gain
    let (echo1, echo2) = correct_echo_pair(echo1, echo2, params.noise_level.as_ref());
    let echo2 = algebra::multiply_scalar(&echo2, params.scale_factor);

    // Step 3: validity mask
    let fills = params.fill_values();
    let mask = match fills {
        Some(_) => {
            let threshold = params.input_threshold.unwrap_or_default();
            validity_mask(&echo1, &echo2, &threshold)?
        }
        None => Mask::filled(echo1.geometry().clone(), true),
    };

    // Step 4: log-ratio. A zero echo or a ratio of exactly 1 leaves no usable
    // value; such voxels inside the mask are reported and then filled.
    let log_ratio = algebra::ln(&algebra::divide(&echo2, &echo1)?);
    let usable = Mask::from_predicate(&log_ratio, |l| l.is_finite() && l != 0.0);
    let degenerate_voxels = mask.and(&usable.not())?.count();
    if degenerate_voxels > 0 {
        warn!(
            "{} of {} voxels passing the validity mask have a degenerate echo ratio; check the input threshold",
            degenerate_voxels,
            mask.count()
        );
    }
    let mask = match fills {
        Some(_) => mask.and(&usable)?,
        None => mask,
    };
    let valid_voxels = mask.count();

    let delta_te = params.te1 - params.te2;
    let finish = |map: ScalarField, fill: Option<f64>| -> Result<ScalarField> {
        // Step 5: fill invalid voxels
        let map = match fill {
            Some(value) => algebra::select(&mask, &map, value)?,
            None => map,
        };
        // Step 6: output window
        Ok(match &params.output_range {
            Some(range) => range.apply(&map),
            None => map,
        })
    };

    let t2star = if selection.t2star {
        let map = log_ratio.map(|l| delta_te / l);
        Some(finish(map, fills.map(|(t2, _)| t2))?)
    } else {
        None
    };
    let r2star = if selection.r2star {
        let map = log_ratio.map(|l| l / delta_te);
        Some(finish(map, fills.map(|(_, r2)| r2))?)
    } else {
        None
    };

    info!(
        "Relaxometry completed: {} / {} voxels valid",
        valid_voxels,
        echo1.len()
    );

    Ok(RelaxationMaps { t2star, r2star, valid_voxels, degenerate_voxels })
}

/// T2* map only
pub fn compute_t2star(
    echo1: &ScalarField,
    echo2: &ScalarField,
    params: &RelaxometryParams,
) -> Result<ScalarField> {
    let maps = compute_relaxation_maps(echo1, echo2, params, MapSelection::T2STAR)?;
    maps.t2star.ok_or_else(|| Error::MissingInput("T2* map".to_string()))
}

/// R2* map only
pub fn compute_r2star(
    echo1: &ScalarField,
    echo2: &ScalarField,
    params: &RelaxometryParams,
) -> Result<ScalarField> {
    let maps = compute_relaxation_maps(echo1, echo2, params, MapSelection::R2STAR)?;
    maps.r2star.ok_or_else(|| Error::MissingInput("R2* map".to_string()))
}

//=============================================================================
// Series processing
//=============================================================================

/// A named dual-echo acquisition (e.g. baseline, or one time point)
pub struct EchoPair<'a> {
    pub name: String,
    pub echo1: &'a ScalarField,
    pub echo2: &'a ScalarField,
}

impl<'a> EchoPair<'a> {
    pub fn new(name: impl Into<String>, echo1: &'a ScalarField, echo2: &'a ScalarField) -> Self {
        Self { name: name.into(), echo1, echo2 }
    }
}

/// Run the engine over a series of acquisitions sharing one parameter set
///
/// Fails on the first error; no maps are returned in that case.
pub fn compute_series(
    pairs: &[EchoPair<'_>],
    params: &RelaxometryParams,
    selection: MapSelection,
) -> Result<Vec<(String, RelaxationMaps)>> {
    compute_series_with_progress(pairs, params, selection, |_, _| {})
}

/// Series processing with a progress callback `(done, total)`
pub fn compute_series_with_progress<F>(
    pairs: &[EchoPair<'_>],
    params: &RelaxometryParams,
    selection: MapSelection,
    mut progress: F,
) -> Result<Vec<(String, RelaxationMaps)>>
where
    F: FnMut(usize, usize),
{
    let total = pairs.len();
    let mut results = Vec::with_capacity(total);
    for (i, pair) in pairs.iter().enumerate() {
        info!("Processing acquisition '{}' ({}/{})", pair.name, i + 1, total);
        let maps = compute_relaxation_maps(pair.echo1, pair.echo2, params, selection)?;
        results.push((pair.name.clone(), maps));
        progress(i + 1, total);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Geometry;

    fn line(values: &[f64]) -> ScalarField {
        let g = Geometry::new((values.len(), 1, 1), (1.0, 1.0, 1.0));
        ScalarField::new(g, values.to_vec()).unwrap()
    }

    #[test]
    fn test_uniform_decay() {
        let echo1 = line(&[1000.0; 4]);
        let echo2 = line(&[500.0; 4]);
        let params = RelaxometryParams::new(0.00007, 0.002);
        let maps = compute_relaxation_maps(&echo1, &echo2, &params, MapSelection::BOTH).unwrap();

        let expected_r2 = 0.5_f64.ln() / (0.00007 - 0.002);
        for &r2 in maps.r2star.as_ref().unwrap().data() {
            assert!((r2 - expected_r2).abs() < 1e-9);
        }
        for &t2 in maps.t2star.as_ref().unwrap().data() {
            assert!((t2 - 1.0 / expected_r2).abs() < 1e-12);
        }
        assert_eq!(maps.valid_voxels, 4);
        assert_eq!(maps.degenerate_voxels, 0);
    }

    #[test]
    fn test_selection() {
        let echo1 = line(&[1000.0]);
        let echo2 = line(&[500.0]);
        let params = RelaxometryParams::default();
        let maps = compute_relaxation_maps(&echo1, &echo2, &params, MapSelection::R2STAR).unwrap();
        assert!(maps.t2star.is_none());
        assert!(maps.r2star.is_some());

        let none = MapSelection { t2star: false, r2star: false };
        assert!(matches!(
            compute_relaxation_maps(&echo1, &echo2, &params, none),
            Err(Error::MissingInput(_))
        ));
    }

    #[test]
    fn test_fill_values() {
        let mut params = RelaxometryParams::default();
        assert_eq!(params.fill_values(), None);
        params.min_t2star = Some(0.00125);
        let (t2, r2) = params.fill_values().unwrap();
        assert_eq!(t2, 0.00125);
        assert_eq!(r2, 800.0);
        params.min_t2star = Some(0.0);
        assert_eq!(params.fill_values(), Some((0.0, 0.0)));
    }

    #[test]
    fn test_threshold_without_fill_is_missing_input() {
        let params = RelaxometryParams {
            input_threshold: Some(InputThreshold { min1: 10.0, min2: 10.0 }),
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(Error::MissingInput(_))));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(RelaxometryParams::new(0.0, 0.002).validate().is_err());
        assert!(RelaxometryParams::new(0.002, 0.002).validate().is_err());
        let params = RelaxometryParams { scale_factor: -1.0, ..Default::default() };
        assert!(params.validate().is_err());
        let params = RelaxometryParams { min_t2star: Some(-0.001), ..Default::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_mismatched_echoes() {
        let echo1 = line(&[1000.0, 1000.0]);
        let echo2 = line(&[500.0]);
        let result = compute_relaxation_maps(&echo1, &echo2, &RelaxometryParams::default(), MapSelection::BOTH);
        assert!(matches!(result, Err(Error::GeometryMismatch { .. })));
    }

    #[test]
    fn test_require() {
        let echo = line(&[1.0]);
        assert!(require(Some(&echo), "echo1").is_ok());
        assert!(matches!(require(None, "echo2"), Err(Error::MissingInput(name)) if name == "echo2"));
    }

    #[test]
    fn test_scale_factor_applied_to_echo2() {
        // echo2 * 2 = echo1 * 2 -> ratio 2
        let echo1 = line(&[100.0]);
        let echo2 = line(&[100.0]);
        let params = RelaxometryParams { scale_factor: 2.0, ..RelaxometryParams::new(0.001, 0.002) };
        let r2 = compute_r2star(&echo1, &echo2, &params).unwrap();
        assert!((r2.data()[0] - 2.0_f64.ln() / -0.001).abs() < 1e-9);
    }

    #[test]
    fn test_series() {
        let e1 = line(&[1000.0]);
        let e2a = line(&[500.0]);
        let e2b = line(&[250.0]);
        let pairs = vec![EchoPair::new("baseline", &e1, &e2a), EchoPair::new("fz1", &e1, &e2b)];
        let mut calls = Vec::new();
        let results = compute_series_with_progress(
            &pairs, &RelaxometryParams::default(), MapSelection::R2STAR,
            |done, total| calls.push((done, total)),
        ).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "baseline");
        assert_eq!(calls, vec![(1, 2), (2, 2)]);
    }
}
