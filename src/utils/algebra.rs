//! Elementwise image algebra on scalar fields
//!
//! Every operation returns a new field and leaves its inputs untouched.
//! Binary operations require both operands to share one grid and fail with
//! `GeometryMismatch` otherwise; nothing is resampled. Arithmetic follows
//! IEEE-754, so division by zero and logarithms of non-positive values yield
//! ±Inf/NaN unless the caller masks them out.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::{Mask, ScalarField};
use crate::utils::simd_ops;

/// Inclusive `[lower, upper]` window applied to a finished map
///
/// Voxels outside the window are set to 0, not clipped to the bounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputRange {
    pub lower: f64,
    pub upper: f64,
}

impl OutputRange {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        let range = Self { lower, upper };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lower.is_nan() || self.upper.is_nan() || self.lower > self.upper {
            return Err(Error::InvalidParameter(format!(
                "Output range requires lower <= upper, got [{}, {}]",
                self.lower, self.upper
            )));
        }
        Ok(())
    }

    /// Zero every voxel outside the window
    pub fn apply(&self, field: &ScalarField) -> ScalarField {
        threshold(field, self.lower, self.upper, 0.0)
    }
}

fn binary(
    a: &ScalarField,
    b: &ScalarField,
    kernel: fn(&mut [f64], &[f64], &[f64]),
) -> Result<ScalarField> {
    a.geometry().ensure_compatible(b.geometry())?;
    let mut out = vec![0.0; a.len()];
    kernel(&mut out, a.data(), b.data());
    Ok(a.with_data(out))
}

fn unary(a: &ScalarField, kernel: impl FnOnce(&mut [f64], &[f64])) -> ScalarField {
    let mut out = vec![0.0; a.len()];
    kernel(&mut out, a.data());
    a.with_data(out)
}

//=============================================================================
// Binary operations
//=============================================================================

pub fn add(a: &ScalarField, b: &ScalarField) -> Result<ScalarField> {
    binary(a, b, simd_ops::add_f64)
}

pub fn subtract(a: &ScalarField, b: &ScalarField) -> Result<ScalarField> {
    binary(a, b, simd_ops::subtract_f64)
}

pub fn multiply(a: &ScalarField, b: &ScalarField) -> Result<ScalarField> {
    binary(a, b, simd_ops::multiply_f64)
}

pub fn divide(a: &ScalarField, b: &ScalarField) -> Result<ScalarField> {
    binary(a, b, simd_ops::divide_f64)
}

/// Voxelwise a^b
pub fn pow(a: &ScalarField, b: &ScalarField) -> Result<ScalarField> {
    a.zip_map(b, f64::powf)
}

/// Voxelwise |a - b|
pub fn abs_difference(a: &ScalarField, b: &ScalarField) -> Result<ScalarField> {
    a.zip_map(b, |x, y| (x - y).abs())
}

//=============================================================================
// Scalar operations
//=============================================================================

pub fn add_scalar(a: &ScalarField, beta: f64) -> ScalarField {
    unary(a, |out, x| simd_ops::offset_f64(out, x, beta))
}

pub fn multiply_scalar(a: &ScalarField, alpha: f64) -> ScalarField {
    unary(a, |out, x| simd_ops::scale_f64(out, x, alpha))
}

/// alpha * a + beta
pub fn affine(a: &ScalarField, alpha: f64, beta: f64) -> ScalarField {
    unary(a, |out, x| simd_ops::affine_f64(out, x, alpha, beta))
}

pub fn pow_scalar(a: &ScalarField, exponent: f64) -> ScalarField {
    if exponent == 2.0 {
        return square(a);
    }
    a.map(|v| v.powf(exponent))
}

//=============================================================================
// Unary operations
//=============================================================================

/// Natural logarithm (−Inf at 0, NaN below 0)
pub fn ln(a: &ScalarField) -> ScalarField {
    a.map(f64::ln)
}

pub fn sqrt(a: &ScalarField) -> ScalarField {
    unary(a, simd_ops::sqrt_f64)
}

pub fn abs(a: &ScalarField) -> ScalarField {
    a.map(f64::abs)
}

pub fn square(a: &ScalarField) -> ScalarField {
    unary(a, simd_ops::square_f64)
}

/// Clamp from below: max(a, lower). NaN stays NaN.
pub fn clamp_min(a: &ScalarField, lower: f64) -> ScalarField {
    a.map(|v| if v < lower { lower } else { v })
}

//=============================================================================
// Thresholding and masking
//=============================================================================

/// Replace every voxel outside `[lower, upper]` with `fill`
///
/// This masks rather than clips: an out-of-range voxel becomes `fill`, never
/// the nearest bound. Bounds are inclusive. NaN voxels are outside every
/// range and are replaced as well.
pub fn threshold(a: &ScalarField, lower: f64, upper: f64, fill: f64) -> ScalarField {
    a.map(|v| if v >= lower && v <= upper { v } else { fill })
}

/// Indicator field: `in_val` inside `[lower, upper]`, `out_val` elsewhere
pub fn binary_threshold(
    a: &ScalarField,
    lower: f64,
    upper: f64,
    in_val: f64,
    out_val: f64,
) -> ScalarField {
    a.map(|v| if v >= lower && v <= upper { in_val } else { out_val })
}

/// Boolean mask of voxels inside `[lower, upper]`
pub fn threshold_mask(a: &ScalarField, lower: f64, upper: f64) -> Mask {
    Mask::from_predicate(a, |v| v >= lower && v <= upper)
}

/// Boolean mask of voxels where a > b
pub fn greater_than(a: &ScalarField, b: &ScalarField) -> Result<Mask> {
    let diff = a.zip_map(b, |x, y| if x > y { 1.0 } else { 0.0 })?;
    Ok(Mask::from_predicate(&diff, |v| v > 0.0))
}

/// Keep `a` where `mask` is set, substitute `fill` everywhere else
///
/// The substitution overwrites whatever `a` held, including Inf and NaN.
pub fn select(mask: &Mask, a: &ScalarField, fill: f64) -> Result<ScalarField> {
    mask.geometry().ensure_compatible(a.geometry())?;
    let data = a.data().iter().zip(mask.data().iter())
        .map(|(&v, &m)| if m > 0 { v } else { fill })
        .collect();
    Ok(a.with_data(data))
}
