//! Voxel-wise building blocks
//!
//! - Elementwise image algebra and thresholding
//! - Rician noise-bias correction
//! - Validity masks
//! - Region-of-interest statistics
//! - SIMD-accelerated kernels (optional, with `simd` feature)

pub mod algebra;
pub mod noise;
pub mod mask;
pub mod statistics;
pub mod simd_ops;

pub use algebra::OutputRange;
pub use noise::{clamp_non_negative, correct_echo_pair, rician_correct, NoiseLevel};
pub use mask::{validity_mask, InputThreshold};
pub use statistics::{LabelStatistics, RoiStatistics, RoiStats};
