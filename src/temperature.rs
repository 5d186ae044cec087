//! Temperature mapping from R2*
//!
//! Temperature is a linear function of R2*, either absolute
//! (`T = A·R2* + B`) or relative to a baseline acquisition
//! (`T = A·(R2*_ref − R2*_base) + B`).
//!
//! Source maps can be gated by an upper R2* bound: voxels whose R2* falls
//! outside `[0, upper − ε]` in any participating map get a fixed sentinel
//! temperature instead of the linear mapping.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::{Mask, ScalarField};
use crate::relaxometry::{compute_r2star, RelaxometryParams};
use crate::utils::algebra::{self, OutputRange};

/// Sentinel temperature for voxels rejected by the input bound
pub const DEFAULT_INVALID_TEMPERATURE: f64 = -40.0;

/// Margin below the upper input bound; a source value equal to the bound is
/// rejected even after float rounding
pub const INPUT_THRESHOLD_EPSILON: f64 = 1e-9;

/// Linear calibration `T = param_a * X + param_b`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureCalibration {
    pub param_a: f64,
    pub param_b: f64,
}

impl Default for TemperatureCalibration {
    fn default() -> Self {
        // Absolute-mode cryoablation calibration, R2* in 1/s
        Self { param_a: 0.15798, param_b: -9.92 }
    }
}

impl TemperatureCalibration {
    pub fn new(param_a: f64, param_b: f64) -> Self {
        Self { param_a, param_b }
    }

    /// Temperature for a single R2* (or R2* difference) value
    pub fn temperature(&self, x: f64) -> f64 {
        self.param_a * x + self.param_b
    }
}

/// Parameters for a temperature computation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureParams {
    #[serde(flatten)]
    pub calibration: TemperatureCalibration,
    /// Upper validity bound on every source R2* map
    pub input_upper_threshold: Option<f64>,
    /// Temperature written to voxels rejected by the input bound
    pub invalid_fill: f64,
    /// Window applied to the final temperature map
    pub output_range: Option<OutputRange>,
}

impl Default for TemperatureParams {
    fn default() -> Self {
        Self {
            calibration: TemperatureCalibration::default(),
            input_upper_threshold: None,
            invalid_fill: DEFAULT_INVALID_TEMPERATURE,
            output_range: None,
        }
    }
}

impl TemperatureParams {
    pub fn new(calibration: TemperatureCalibration) -> Self {
        Self { calibration, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        let cal = &self.calibration;
        if !cal.param_a.is_finite() || !cal.param_b.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "Calibration parameters must be finite, got A={} B={}",
                cal.param_a, cal.param_b
            )));
        }
        if let Some(upper) = self.input_upper_threshold {
            if upper.is_nan() {
                return Err(Error::InvalidParameter("Input threshold is NaN".to_string()));
            }
        }
        if let Some(range) = &self.output_range {
            range.validate()?;
        }
        Ok(())
    }
}

/// Voxels where every source map lies within `[0, upper − ε]`
fn input_validity(sources: &[&ScalarField], upper: f64) -> Result<Mask> {
    let bound = upper - INPUT_THRESHOLD_EPSILON;
    let mut mask = Mask::filled(sources[0].geometry().clone(), true);
    for source in sources {
        mask = mask.and(&algebra::threshold_mask(source, 0.0, bound))?;
    }
    Ok(mask)
}

/// Apply the linear mapping, input gate and output window to `x`
fn map_temperature(
    x: &ScalarField,
    sources: &[&ScalarField],
    params: &TemperatureParams,
) -> Result<ScalarField> {
    let cal = &params.calibration;
    let mut temp = algebra::affine(x, cal.param_a, cal.param_b);

    if let Some(upper) = params.input_upper_threshold {
        let mask = input_validity(sources, upper)?;
        debug!(
            "Temperature input gate (upper={}): {} / {} voxels valid",
            upper, mask.count(), mask.len()
        );
        temp = algebra::select(&mask, &temp, params.invalid_fill)?;
    }

    if let Some(range) = &params.output_range {
        temp = range.apply(&temp);
    }
    Ok(temp)
}

/// Absolute temperature from one R2* map: `A·R2* + B`
pub fn temperature_absolute(r2star: &ScalarField, params: &TemperatureParams) -> Result<ScalarField> {
    params.validate()?;
    let temp = map_temperature(r2star, &[r2star], params)?;
    info!("Absolute temperature map computed ({} voxels)", temp.len());
    Ok(temp)
}

/// Temperature relative to a baseline: `A·(reference − baseline) + B`
pub fn temperature_relative(
    baseline: &ScalarField,
    reference: &ScalarField,
    params: &TemperatureParams,
) -> Result<ScalarField> {
    params.validate()?;
    let diff = algebra::subtract(reference, baseline)?;
    let temp = map_temperature(&diff, &[baseline, reference], params)?;
    info!("Relative temperature map computed ({} voxels)", temp.len());
    Ok(temp)
}

/// Absolute temperature straight from a dual-echo acquisition
///
/// The intermediate R2* map lives only for the duration of the call.
pub fn temperature_from_echoes(
    echo1: &ScalarField,
    echo2: &ScalarField,
    relaxometry: &RelaxometryParams,
    params: &TemperatureParams,
) -> Result<ScalarField> {
    params.validate()?;
    let r2star = compute_r2star(echo1, echo2, relaxometry)?;
    temperature_absolute(&r2star, params)
}

/// Relative temperature from baseline and reference dual-echo acquisitions
pub fn temperature_relative_from_echoes(
    baseline: (&ScalarField, &ScalarField),
    reference: (&ScalarField, &ScalarField),
    relaxometry: &RelaxometryParams,
    params: &TemperatureParams,
) -> Result<ScalarField> {
    params.validate()?;
    let baseline_r2star = compute_r2star(baseline.0, baseline.1, relaxometry)?;
    let reference_r2star = compute_r2star(reference.0, reference.1, relaxometry)?;
    temperature_relative(&baseline_r2star, &reference_r2star, params)
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
    fn test_absolute_linear_map() {
        let r2 = line(&[0.0, 100.0, 359.2]);
        let temp = temperature_absolute(&r2, &TemperatureParams::default()).unwrap();
        assert!((temp.data()[0] + 9.92).abs() < 1e-12);
        assert!((temp.data()[1] - (15.798 - 9.92)).abs() < 1e-9);
        assert!((temp.data()[2] - 46.826416).abs() < 1e-6);
    }

    #[test]
    fn test_relative_linear_map() {
        let baseline = line(&[100.0, 200.0]);
        let reference = line(&[150.0, 180.0]);
        let params = TemperatureParams::new(TemperatureCalibration::new(-0.1282, 43.8461));
        let temp = temperature_relative(&baseline, &reference, &params).unwrap();
        assert!((temp.data()[0] - (-0.1282 * 50.0 + 43.8461)).abs() < 1e-9);
        assert!((temp.data()[1] - (-0.1282 * -20.0 + 43.8461)).abs() < 1e-9);
    }

    #[test]
    fn test_input_gate_uses_both_maps() {
        let baseline = line(&[100.0, 900.0, 100.0, -5.0, 800.0]);
        let reference = line(&[100.0, 100.0, 900.0, 100.0, 100.0]);
        let params = TemperatureParams {
            calibration: TemperatureCalibration::new(1.0, 0.0),
            input_upper_threshold: Some(800.0),
            ..Default::default()
        };
        let temp = temperature_relative(&baseline, &reference, &params).unwrap();
        assert_eq!(temp.data()[0], 0.0);
        assert_eq!(&temp.data()[1..], &[-40.0, -40.0, -40.0, -40.0]);
    }

    #[test]
    fn test_custom_invalid_fill() {
        let r2 = line(&[10.0, 1000.0]);
        let params = TemperatureParams {
            input_upper_threshold: Some(500.0),
            invalid_fill: -100.0,
            ..Default::default()
        };
        let temp = temperature_absolute(&r2, &params).unwrap();
        assert_eq!(temp.data()[1], -100.0);
    }

    #[test]
    fn test_output_range_zeroes() {
        let r2 = line(&[0.0, 100.0, 1000.0]);
        let params = TemperatureParams {
            calibration: TemperatureCalibration::new(1.0, 0.0),
            output_range: Some(OutputRange::new(50.0, 500.0).unwrap()),
            ..Default::default()
        };
        let temp = temperature_absolute(&r2, &params).unwrap();
        assert_eq!(temp.data(), &[0.0, 100.0, 0.0]);
    }

    #[test]
    fn test_gate_then_window() {
        // The sentinel itself is subject to the output window
        let r2 = line(&[1000.0]);
        let params = TemperatureParams {
            input_upper_threshold: Some(800.0),
            output_range: Some(OutputRange::new(-10.0, 100.0).unwrap()),
            ..Default::default()
        };
        let temp = temperature_absolute(&r2, &params).unwrap();
        assert_eq!(temp.data(), &[0.0]);
    }

    #[test]
    fn test_relative_mismatch() {
        let baseline = line(&[1.0, 2.0]);
        let reference = line(&[1.0]);
        assert!(matches!(
            temperature_relative(&baseline, &reference, &TemperatureParams::default()),
            Err(Error::GeometryMismatch { .. })
        ));
    }

    #[test]
    fn test_from_echoes() {
        let echo1 = line(&[1000.0; 3]);
        let echo2 = line(&[500.0; 3]);
        let temp = temperature_from_echoes(
            &echo1, &echo2, &RelaxometryParams::default(), &TemperatureParams::default(),
        ).unwrap();
        let r2 = 0.5_f64.ln() / (0.00007 - 0.002);
        for &t in temp.data() {
            assert!((t - (0.15798 * r2 - 9.92)).abs() < 1e-9);
        }
    }
}
