//! NIfTI file I/O for scalar fields
//!
//! Loads and saves NIfTI-1 volumes from/to byte arrays or files, converting
//! to and from `ScalarField`. Gzip compression (.nii.gz) is auto-detected on
//! read and chosen by file extension on write.
//!
//! The numeric pipeline never touches files; this module is the image
//! provider for tooling built around it.

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::{Error, Result};
use crate::field::{Geometry, ScalarField};

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Get header info for diagnostics
fn get_header_info(bytes: &[u8]) -> String {
    if bytes.len() < 348 {
        return format!("File too small ({} bytes, need at least 348)", bytes.len());
    }

    // NIfTI-1 header size at offset 0, magic at 344, datatype at 70
    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);

    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

/// Get affine transformation matrix from header
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    // Prefer sform if available (sform_code > 0)
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        let vsx = header.pixdim[1] as f64;
        let vsy = header.pixdim[2] as f64;
        let vsz = header.pixdim[3] as f64;
        [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

/// Load a NIfTI volume from bytes
///
/// Supports both .nii and .nii.gz content. 4D volumes yield their first
/// time point.
pub fn load_nifti(bytes: &[u8]) -> Result<ScalarField> {
    let obj: InMemNiftiObject = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes)))
            .map_err(|e| {
                let mut decompressed = Vec::new();
                let info = match GzDecoder::new(Cursor::new(bytes)).read_to_end(&mut decompressed) {
                    Ok(_) => get_header_info(&decompressed),
                    Err(_) => "Could not decompress".to_string(),
                };
                Error::Nifti(format!("Failed to read gzipped NIfTI: {} ({})", e, info))
            })?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| Error::Nifti(format!("Failed to read NIfTI: {} ({})", e, get_header_info(bytes))))?
    };

    let header = obj.header();
    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(Error::Nifti(format!("Expected at least 3D volume, got {}D", ndim)));
    }

    let voxel_size = (
        header.pixdim[1] as f64,
        header.pixdim[2] as f64,
        header.pixdim[3] as f64,
    );
    let affine = get_affine(header);

    // Slope and intercept are applied during conversion
    let array: Array<f64, _> = obj.into_volume().into_ndarray()
        .map_err(|e| Error::Nifti(format!("Failed to convert to ndarray: {}", e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(Error::Nifti(format!("Expected at least 3D array, got {}D", shape.len())));
    }

    // Use the array shape for dimensions (nifti-rs may reorder)
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let mut data = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let v = if shape.len() == 3 {
                    array[[i, j, k]]
                } else {
                    array[[i, j, k, 0]]
                };
                data.push(v);
            }
        }
    }

    debug!("Loaded NIfTI volume {}x{}x{}", nx, ny, nz);
    let geometry = Geometry { dims: (nx, ny, nz), voxel_size, affine };
    ScalarField::new(geometry, data)
}

/// Encode a field as uncompressed NIfTI-1 bytes (float32 samples)
pub fn save_nifti(field: &ScalarField) -> Result<Vec<u8>> {
    let geometry = field.geometry();
    let (nx, ny, nz) = geometry.dims;
    let (vsx, vsy, vsz) = geometry.voxel_size;
    let affine = &geometry.affine;

    for (name, n) in [("nx", nx), ("ny", ny), ("nz", nz)] {
        if n > i16::MAX as usize {
            return Err(Error::Nifti(format!("{} = {} exceeds NIfTI-1 limit", name, n)));
        }
    }

    let mut header = [0u8; 348];

    // sizeof_hdr = 348
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    // dim[0..7]
    let dim: [i16; 8] = [3, nx as i16, ny as i16, nz as i16, 1, 1, 1, 1];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype = 16 (FLOAT32), bitpix = 32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    // pixdim[0..7]
    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset = 352 (header + 4 bytes extension), scl_slope = 1, scl_inter = 0
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    // srow_x, srow_y, srow_z
    for row in 0..3 {
        for col in 0..4 {
            let offset = 280 + row * 16 + col * 4;
            header[offset..offset + 4].copy_from_slice(&(affine[row * 4 + col] as f32).to_le_bytes());
        }
    }

    // magic = "n+1\0" for NIfTI-1 single file
    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(352 + field.len() * 4);
    buffer.extend_from_slice(&header);
    // Extension flag: no extension
    buffer.extend_from_slice(&[0u8; 4]);
    for &val in field.data() {
        buffer.extend_from_slice(&(val as f32).to_le_bytes());
    }

    Ok(buffer)
}

/// Encode a field as gzipped NIfTI bytes (.nii.gz)
pub fn save_nifti_gz(field: &ScalarField) -> Result<Vec<u8>> {
    let uncompressed = save_nifti(field)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&uncompressed)?;
    Ok(encoder.finish()?)
}

/// Read a NIfTI file (.nii or .nii.gz) from a filesystem path
pub fn read_nifti_file(path: &Path) -> Result<ScalarField> {
    let bytes = std::fs::read(path)?;
    load_nifti(&bytes).map_err(|e| Error::Nifti(format!("'{}': {}", path.display(), e)))
}

/// Save a field to a file, gzip compressed when the path ends with .nii.gz
pub fn save_nifti_to_file(path: &Path, field: &ScalarField) -> Result<()> {
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        save_nifti_gz(field)?
    } else {
        save_nifti(field)?
    };
    std::fs::write(path, &bytes)?;
    Ok(())
}

//=============================================================================
// Image provider
//=============================================================================

/// Loads and stores scalar fields by identifier
pub trait ImageProvider {
    fn load_scalar_field(&self, identifier: &str) -> Result<ScalarField>;
    fn save_scalar_field(&self, field: &ScalarField, identifier: &str) -> Result<()>;
}

/// NIfTI files under a root directory
///
/// An identifier `name` resolves to `<root>/name.nii.gz` or
/// `<root>/name.nii`, whichever exists; new files are written gzipped.
#[derive(Clone, Debug)]
pub struct NiftiFileProvider {
    root: PathBuf,
}

impl NiftiFileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an identifier resolves to when loading
    pub fn resolve(&self, identifier: &str) -> Result<PathBuf> {
        for ext in ["nii.gz", "nii"] {
            let path = self.root.join(format!("{}.{}", identifier, ext));
            if path.is_file() {
                return Ok(path);
            }
        }
        Err(Error::MissingInput(format!(
            "image '{}' under {}",
            identifier,
            self.root.display()
        )))
    }
}

impl ImageProvider for NiftiFileProvider {
    fn load_scalar_field(&self, identifier: &str) -> Result<ScalarField> {
        read_nifti_file(&self.resolve(identifier)?)
    }

    fn save_scalar_field(&self, field: &ScalarField, identifier: &str) -> Result<()> {
        save_nifti_to_file(&self.root.join(format!("{}.nii.gz", identifier)), field)
    }
}
