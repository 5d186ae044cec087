//! Region-of-interest statistics over a label map

use crate::error::{Error, Result};
use crate::field::ScalarField;

/// Mean and spread of a field inside one labelled region
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoiStats {
    pub mean: f64,
    /// Sample standard deviation (n − 1); 0 for single-voxel regions
    pub stddev: f64,
    /// Number of voxels in the region
    pub count: usize,
}

/// Source of region statistics
///
/// Calibration only consumes `{mean, stddev}`; hosts with their own label
/// statistics can plug them in here.
pub trait RoiStatistics {
    fn region_stats(&self, field: &ScalarField, labels: &ScalarField, label: i64) -> Result<RoiStats>;
}

/// Label statistics computed in voxel order
///
/// Accumulation is sequential in Fortran order, so results are bit-for-bit
/// reproducible.
#[derive(Clone, Copy, Debug, Default)]
pub struct LabelStatistics;

impl RoiStatistics for LabelStatistics {
    fn region_stats(&self, field: &ScalarField, labels: &ScalarField, label: i64) -> Result<RoiStats> {
        field.geometry().ensure_compatible(labels.geometry())?;

        let in_region = |l: f64| l.is_finite() && l.round() as i64 == label;

        let mut sum = 0.0;
        let mut count = 0usize;
        for (&v, &l) in field.data().iter().zip(labels.data()) {
            if in_region(l) {
                sum += v;
                count += 1;
            }
        }
        if count == 0 {
            return Err(Error::EmptyRegion(label));
        }
        let mean = sum / count as f64;

        // Second pass for the variance to avoid cancellation
        let mut sum_sq = 0.0;
        for (&v, &l) in field.data().iter().zip(labels.data()) {
            if in_region(l) {
                let d = v - mean;
                sum_sq += d * d;
            }
        }
        let stddev = if count > 1 {
            (sum_sq / (count - 1) as f64).sqrt()
        } else {
            0.0
        };

        Ok(RoiStats { mean, stddev, count })
    }
}
