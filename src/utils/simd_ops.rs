//! SIMD-accelerated elementwise kernels
//!
//! Flat-slice kernels behind the image algebra. When the `simd` feature is
//! enabled, these use 256-bit lanes (f64x4) via `wide`, which lowers to
//! SSE/AVX/NEON or WASM SIMD. Every kernel is strictly elementwise, so the
//! SIMD and scalar paths produce identical results.
//!
//! All operations have scalar fallbacks when SIMD is disabled.

#[cfg(feature = "simd")]
use wide::f64x4;

/// SIMD lane width (4 for f64x4)
#[cfg(feature = "simd")]
pub const SIMD_WIDTH: usize = 4;

#[cfg(not(feature = "simd"))]
pub const SIMD_WIDTH: usize = 1;

/// Lane type the kernels are written against
#[cfg(feature = "simd")]
type Lane = f64x4;

#[cfg(not(feature = "simd"))]
type Lane = f64;

#[inline(always)]
fn splat(v: f64) -> Lane {
    #[cfg(feature = "simd")]
    {
        f64x4::splat(v)
    }
    #[cfg(not(feature = "simd"))]
    {
        v
    }
}

#[cfg(feature = "simd")]
#[inline(always)]
fn load(a: &[f64], idx: usize) -> Lane {
    f64x4::new([a[idx], a[idx + 1], a[idx + 2], a[idx + 3]])
}

/// out[i] = f(a[i], b[i]), `vf` on full lanes and `sf` on the remainder
#[inline(always)]
fn binary_lanes(
    out: &mut [f64], a: &[f64], b: &[f64],
    vf: impl Fn(Lane, Lane) -> Lane,
    sf: impl Fn(f64, f64) -> f64,
) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(out.len(), a.len());
    let n = a.len();

    #[cfg(feature = "simd")]
    let start = {
        let chunks = n / SIMD_WIDTH;
        for c in 0..chunks {
            let idx = c * SIMD_WIDTH;
            let result = vf(load(a, idx), load(b, idx));
            out[idx..idx + SIMD_WIDTH].copy_from_slice(&result.to_array());
        }
        chunks * SIMD_WIDTH
    };
    #[cfg(not(feature = "simd"))]
    let start = {
        let _ = &vf;
        0
    };

    for i in start..n {
        out[i] = sf(a[i], b[i]);
    }
}

/// out[i] = f(a[i]), `vf` on full lanes and `sf` on the remainder
#[inline(always)]
fn unary_lanes(
    out: &mut [f64], a: &[f64],
    vf: impl Fn(Lane) -> Lane,
    sf: impl Fn(f64) -> f64,
) {
    debug_assert_eq!(out.len(), a.len());
    let n = a.len();

    #[cfg(feature = "simd")]
    let start = {
        let chunks = n / SIMD_WIDTH;
        for c in 0..chunks {
            let idx = c * SIMD_WIDTH;
            let result = vf(load(a, idx));
            out[idx..idx + SIMD_WIDTH].copy_from_slice(&result.to_array());
        }
        chunks * SIMD_WIDTH
    };
    #[cfg(not(feature = "simd"))]
    let start = {
        let _ = &vf;
        0
    };

    for i in start..n {
        out[i] = sf(a[i]);
    }
}

// ============================================================================
// Binary Operations
// ============================================================================

/// Add arrays element-wise: out[i] = a[i] + b[i]
#[inline]
pub fn add_f64(out: &mut [f64], a: &[f64], b: &[f64]) {
    binary_lanes(out, a, b, |x, y| x + y, |x, y| x + y);
}

/// Subtract arrays element-wise: out[i] = a[i] - b[i]
#[inline]
pub fn subtract_f64(out: &mut [f64], a: &[f64], b: &[f64]) {
    binary_lanes(out, a, b, |x, y| x - y, |x, y| x - y);
}

/// Multiply arrays element-wise: out[i] = a[i] * b[i]
#[inline]
pub fn multiply_f64(out: &mut [f64], a: &[f64], b: &[f64]) {
    binary_lanes(out, a, b, |x, y| x * y, |x, y| x * y);
}

/// Divide arrays element-wise: out[i] = a[i] / b[i] (IEEE semantics, no guard)
#[inline]
pub fn divide_f64(out: &mut [f64], a: &[f64], b: &[f64]) {
    binary_lanes(out, a, b, |x, y| x / y, |x, y| x / y);
}

// ============================================================================
// Scalar Operations
// ============================================================================

/// Scale array: out[i] = alpha * a[i]
#[inline]
pub fn scale_f64(out: &mut [f64], a: &[f64], alpha: f64) {
    let valpha = splat(alpha);
    unary_lanes(out, a, move |x| x * valpha, |x| x * alpha);
}

/// Offset array: out[i] = a[i] + beta
#[inline]
pub fn offset_f64(out: &mut [f64], a: &[f64], beta: f64) {
    let vbeta = splat(beta);
    unary_lanes(out, a, move |x| x + vbeta, |x| x + beta);
}

/// Affine map: out[i] = alpha * a[i] + beta
#[inline]
pub fn affine_f64(out: &mut [f64], a: &[f64], alpha: f64, beta: f64) {
    let (valpha, vbeta) = (splat(alpha), splat(beta));
    unary_lanes(out, a, move |x| x * valpha + vbeta, |x| alpha * x + beta);
}

// ============================================================================
// Unary Operations
// ============================================================================

/// Square: out[i] = a[i]^2
#[inline]
pub fn square_f64(out: &mut [f64], a: &[f64]) {
    unary_lanes(out, a, |x| x * x, |x| x * x);
}

/// Square root: out[i] = sqrt(a[i]) (NaN for negative input)
#[inline]
pub fn sqrt_f64(out: &mut [f64], a: &[f64]) {
    unary_lanes(out, a, |x| x.sqrt(), |x| x.sqrt());
}

/// Rician bias removal: out[i] = sqrt(max(a[i]^2 - sigma^2, 0))
#[inline]
pub fn rician_correct_f64(out: &mut [f64], a: &[f64], sigma: f64) {
    let noise_power = sigma * sigma;
    let (vpower, vzero) = (splat(noise_power), splat(0.0));
    unary_lanes(
        out, a,
        move |x| (x * x - vpower).max(vzero).sqrt(),
        |x| (x * x - noise_power).max(0.0).sqrt(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_ops_with_remainder() {
        // 7 elements: one full lane plus a remainder of 3
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let b = vec![2.0; 7];
        let mut out = vec![0.0; 7];

        add_f64(&mut out, &a, &b);
        assert_eq!(out, vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);

        subtract_f64(&mut out, &a, &b);
        assert_eq!(out, vec![-1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

        multiply_f64(&mut out, &a, &b);
        assert_eq!(out, vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0]);

        divide_f64(&mut out, &a, &b);
        assert_eq!(out, vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5]);
    }

    #[test]
    fn test_divide_by_zero_is_ieee() {
        let a = vec![1.0, -1.0, 0.0, 2.0, 0.0];
        let b = vec![0.0; 5];
        let mut out = vec![0.0; 5];
        divide_f64(&mut out, &a, &b);
        assert_eq!(out[0], f64::INFINITY);
        assert_eq!(out[1], f64::NEG_INFINITY);
        assert!(out[2].is_nan());
        assert!(out[4].is_nan());
    }

    #[test]
    fn test_affine() {
        let a = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let mut out = vec![0.0; 5];
        affine_f64(&mut out, &a, 2.0, -1.0);
        assert_eq!(out, vec![-1.0, 1.0, 3.0, 5.0, 7.0]);

        scale_f64(&mut out, &a, 0.5);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5, 2.0]);

        offset_f64(&mut out, &a, 10.0);
        assert_eq!(out, vec![10.0, 11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn test_square_and_sqrt() {
        let a = vec![3.0, 4.0, 0.0, 9.0, 16.0];
        let mut out = vec![0.0; 5];
        square_f64(&mut out, &a);
        assert_eq!(out, vec![9.0, 16.0, 0.0, 81.0, 256.0]);

        sqrt_f64(&mut out, &a);
        assert!((out[0] - 3.0_f64.sqrt()).abs() < 1e-15);
        assert_eq!(out[3], 3.0);
        assert_eq!(out[4], 4.0);
    }

    #[test]
    fn test_rician_correct_floor() {
        let a = vec![5.0, 3.0, 1.0, -5.0, 0.0];
        let mut out = vec![0.0; 5];
        rician_correct_f64(&mut out, &a, 3.0);
        assert!((out[0] - 4.0).abs() < 1e-12);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 0.0);
        // Squaring discards the sign of the input
        assert!((out[3] - 4.0).abs() < 1e-12);
        assert_eq!(out[4], 0.0);
    }
}
