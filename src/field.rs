//! Scalar fields and boolean masks on a shared voxel grid
//!
//! Volumes are stored flattened in Fortran (column-major) order to match the
//! NIfTI convention: index = x + y*nx + z*nx*ny.

use crate::error::{Error, Result};

/// Relative tolerance for comparing voxel sizes and affine entries.
///
/// Geometry read back from a float32 NIfTI header differs from the f64
/// value by up to one float32 ulp (about 6e-8 relative). Entries below 1 in
/// magnitude are compared absolutely.
pub const GEOMETRY_TOLERANCE: f64 = 1e-6;

#[inline]
fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= GEOMETRY_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Shape and spatial placement of a volume
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    /// Dimensions (nx, ny, nz)
    pub dims: (usize, usize, usize),
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
}

impl Geometry {
    /// Geometry with unit-free voxel scaling on the diagonal and zero origin
    pub fn new(dims: (usize, usize, usize), voxel_size: (f64, f64, f64)) -> Self {
        let (vsx, vsy, vsz) = voxel_size;
        Self {
            dims,
            voxel_size,
            affine: [
                vsx, 0.0, 0.0, 0.0,
                0.0, vsy, 0.0, 0.0,
                0.0, 0.0, vsz, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    pub fn with_affine(mut self, affine: [f64; 16]) -> Self {
        self.affine = affine;
        self
    }

    /// Total number of voxels
    pub fn len(&self) -> usize {
        let (nx, ny, nz) = self.dims;
        nx * ny * nz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index of voxel (i, j, k)
    #[inline(always)]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        let (nx, ny, _) = self.dims;
        i + j * nx + k * nx * ny
    }

    /// True when both grids have identical shape and matching placement
    pub fn is_compatible(&self, other: &Geometry) -> bool {
        if self.dims != other.dims {
            return false;
        }
        close(self.voxel_size.0, other.voxel_size.0)
            && close(self.voxel_size.1, other.voxel_size.1)
            && close(self.voxel_size.2, other.voxel_size.2)
            && self.affine.iter().zip(other.affine.iter()).all(|(&a, &b)| close(a, b))
    }

    /// Fail with `GeometryMismatch` unless `other` is compatible with `self`
    pub fn ensure_compatible(&self, other: &Geometry) -> Result<()> {
        if self.is_compatible(other) {
            Ok(())
        } else {
            Err(Error::GeometryMismatch {
                expected: self.describe(),
                actual: other.describe(),
            })
        }
    }

    fn describe(&self) -> String {
        let (nx, ny, nz) = self.dims;
        let (vsx, vsy, vsz) = self.voxel_size;
        format!(
            "{}x{}x{} @ {}x{}x{} mm, origin ({}, {}, {})",
            nx, ny, nz, vsx, vsy, vsz, self.affine[3], self.affine[7], self.affine[11]
        )
    }
}

/// Floating-point samples on a voxel grid
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    geometry: Geometry,
    data: Vec<f64>,
}

impl ScalarField {
    /// Wrap existing samples; the sample count must match the geometry
    pub fn new(geometry: Geometry, data: Vec<f64>) -> Result<Self> {
        if data.len() != geometry.len() {
            return Err(Error::InvalidParameter(format!(
                "Field has {} samples but geometry {:?} needs {}",
                data.len(),
                geometry.dims,
                geometry.len()
            )));
        }
        Ok(Self { geometry, data })
    }

    /// Field with every voxel set to `value`
    pub fn filled(geometry: Geometry, value: f64) -> Self {
        let n = geometry.len();
        Self { geometry, data: vec![value; n] }
    }

    /// Build a field from a per-voxel function of (i, j, k)
    pub fn from_fn(geometry: Geometry, mut f: impl FnMut(usize, usize, usize) -> f64) -> Self {
        let (nx, ny, nz) = geometry.dims;
        let mut data = Vec::with_capacity(geometry.len());
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data.push(f(i, j, k));
                }
            }
        }
        Self { geometry, data }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at voxel (i, j, k)
    pub fn at(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[self.geometry.index(i, j, k)]
    }

    /// New field on the same grid with `f` applied to every sample
    pub fn map(&self, f: impl Fn(f64) -> f64) -> ScalarField {
        ScalarField {
            geometry: self.geometry.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// New field on the same grid with `f` applied pairwise
    ///
    /// Fails with `GeometryMismatch` when the grids differ.
    pub fn zip_map(&self, other: &ScalarField, f: impl Fn(f64, f64) -> f64) -> Result<ScalarField> {
        self.geometry.ensure_compatible(&other.geometry)?;
        Ok(ScalarField {
            geometry: self.geometry.clone(),
            data: self.data.iter().zip(other.data.iter()).map(|(&a, &b)| f(a, b)).collect(),
        })
    }

    /// Replace the samples while keeping the grid
    pub(crate) fn with_data(&self, data: Vec<f64>) -> ScalarField {
        debug_assert_eq!(data.len(), self.data.len());
        ScalarField { geometry: self.geometry.clone(), data }
    }
}

/// Boolean field on a voxel grid (1 = true, 0 = false)
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    geometry: Geometry,
    data: Vec<u8>,
}

impl Mask {
    pub fn new(geometry: Geometry, data: Vec<u8>) -> Result<Self> {
        if data.len() != geometry.len() {
            return Err(Error::InvalidParameter(format!(
                "Mask has {} voxels but geometry {:?} needs {}",
                data.len(),
                geometry.dims,
                geometry.len()
            )));
        }
        Ok(Self { geometry, data })
    }

    pub fn filled(geometry: Geometry, value: bool) -> Self {
        let n = geometry.len();
        Self { geometry, data: vec![value as u8; n] }
    }

    pub(crate) fn from_predicate(field: &ScalarField, pred: impl Fn(f64) -> bool) -> Mask {
        Mask {
            geometry: field.geometry().clone(),
            data: field.data().iter().map(|&v| pred(v) as u8).collect(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        self.data[index] > 0
    }

    /// Number of true voxels
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m > 0).count()
    }

    /// Voxelwise logical AND
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        self.geometry.ensure_compatible(&other.geometry)?;
        Ok(Mask {
            geometry: self.geometry.clone(),
            data: self.data.iter().zip(other.data.iter())
                .map(|(&a, &b)| (a > 0 && b > 0) as u8)
                .collect(),
        })
    }

    /// Voxelwise logical NOT
    pub fn not(&self) -> Mask {
        Mask {
            geometry: self.geometry.clone(),
            data: self.data.iter().map(|&a| (a == 0) as u8).collect(),
        }
    }

    /// Indicator field: 1.0 where set, 0.0 elsewhere
    pub fn to_field(&self) -> ScalarField {
        ScalarField {
            geometry: self.geometry.clone(),
            data: self.data.iter().map(|&m| if m > 0 { 1.0 } else { 0.0 }).collect(),
        }
    }
}
