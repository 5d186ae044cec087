//! Common test utilities for r2star-core integration tests

#![allow(dead_code)]

use r2star_core::{Geometry, Mask, ScalarField};

/// Small anisotropic grid with a non-trivial origin
pub fn test_geometry(dims: (usize, usize, usize)) -> Geometry {
    let (vsx, vsy, vsz) = (0.9375, 0.9375, 2.5);
    Geometry::new(dims, (vsx, vsy, vsz)).with_affine([
        vsx, 0.0, 0.0, -120.0,
        0.0, vsy, 0.0, -110.0,
        0.0, 0.0, vsz, -30.0,
        0.0, 0.0, 0.0, 1.0,
    ])
}

pub fn uniform(dims: (usize, usize, usize), value: f64) -> ScalarField {
    ScalarField::filled(test_geometry(dims), value)
}

/// Deterministic pseudo-random field in [lo, hi) (LCG, reproducible across runs)
pub fn pseudo_random(dims: (usize, usize, usize), lo: f64, hi: f64, seed: u64) -> ScalarField {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    ScalarField::from_fn(test_geometry(dims), |_, _, _| {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
        lo + (hi - lo) * unit
    })
}

/// Label map with `label` inside a sphere (radius in voxels) and 0 elsewhere
pub fn sphere_labels(
    dims: (usize, usize, usize),
    center: (f64, f64, f64),
    radius: f64,
    label: i64,
) -> ScalarField {
    let (cx, cy, cz) = center;
    ScalarField::from_fn(test_geometry(dims), |i, j, k| {
        let dx = i as f64 - cx;
        let dy = j as f64 - cy;
        let dz = k as f64 - cz;
        if dx * dx + dy * dy + dz * dz <= radius * radius { label as f64 } else { 0.0 }
    })
}

/// Echo pair following S(TE) = S0 · exp(−R2* · TE)
pub fn synthetic_echoes(
    s0: &ScalarField,
    r2star: &ScalarField,
    te1: f64,
    te2: f64,
) -> (ScalarField, ScalarField) {
    let echo = |te: f64| {
        let data = s0.data().iter().zip(r2star.data())
            .map(|(&s, &r)| s * (-r * te).exp())
            .collect();
        ScalarField::new(s0.geometry().clone(), data).unwrap()
    };
    (echo(te1), echo(te2))
}

/// Compute RMSE between two fields, only within mask
pub fn rmse(a: &ScalarField, b: &ScalarField, mask: &Mask) -> f64 {
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for i in 0..a.len() {
        if mask.is_set(i) {
            let diff = a.data()[i] - b.data()[i];
            sum_sq += diff * diff;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum_sq / count as f64).sqrt()
}

pub fn assert_all_close(field: &ScalarField, expected: f64, tol: f64) {
    for (i, &v) in field.data().iter().enumerate() {
        assert!(
            (v - expected).abs() <= tol,
            "voxel {}: {} differs from {} by more than {}",
            i, v, expected, tol
        );
    }
}

pub fn assert_all_finite(field: &ScalarField) {
    for (i, &v) in field.data().iter().enumerate() {
        assert!(v.is_finite(), "voxel {} is not finite: {}", i, v);
    }
}
