//! Temperature maps from synthetic R2* and dual-echo volumes

mod common;

use common::*;
use r2star_core::temperature::{
    temperature_absolute, temperature_from_echoes, temperature_relative,
    temperature_relative_from_echoes, DEFAULT_INVALID_TEMPERATURE,
};
use r2star_core::utils::OutputRange;
use r2star_core::{Error, RelaxometryParams, TemperatureCalibration, TemperatureParams};

const DIMS: (usize, usize, usize) = (5, 4, 3);

#[test]
fn test_absolute_from_known_r2star() {
    let r2 = uniform(DIMS, 359.2);
    let temp = temperature_absolute(&r2, &TemperatureParams::default()).unwrap();
    assert_all_close(&temp, 0.15798 * 359.2 - 9.92, 1e-9);
    assert!((temp.data()[0] - 46.83).abs() < 0.01);
}

#[test]
fn test_absolute_from_echoes_matches_two_step() {
    let s0 = uniform(DIMS, 1000.0);
    let r2_true = pseudo_random(DIMS, 100.0, 700.0, 4);
    let relax = RelaxometryParams::default();
    let (echo1, echo2) = synthetic_echoes(&s0, &r2_true, relax.te1, relax.te2);

    let params = TemperatureParams::default();
    let direct = temperature_from_echoes(&echo1, &echo2, &relax, &params).unwrap();
    let expected = temperature_absolute(&r2_true, &params).unwrap();
    for (&a, &b) in direct.data().iter().zip(expected.data()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_relative_mode_with_gate() {
    let baseline = pseudo_random(DIMS, 0.0, 1000.0, 17);
    let reference = pseudo_random(DIMS, 0.0, 1000.0, 18);
    let cal = TemperatureCalibration::new(-0.1282, 43.8461);
    let params = TemperatureParams {
        input_upper_threshold: Some(800.0),
        ..TemperatureParams::new(cal)
    };
    let temp = temperature_relative(&baseline, &reference, &params).unwrap();

    for i in 0..temp.len() {
        let (b, r) = (baseline.data()[i], reference.data()[i]);
        if b < 800.0 && r < 800.0 {
            assert!((temp.data()[i] - cal.temperature(r - b)).abs() < 1e-9);
        } else {
            assert_eq!(temp.data()[i], DEFAULT_INVALID_TEMPERATURE);
        }
    }
}

#[test]
fn test_value_at_upper_bound_is_rejected() {
    let r2 = uniform(DIMS, 800.0);
    let params = TemperatureParams { input_upper_threshold: Some(800.0), ..Default::default() };
    let temp = temperature_absolute(&r2, &params).unwrap();
    assert_all_close(&temp, DEFAULT_INVALID_TEMPERATURE, 0.0);
}

#[test]
fn test_relative_from_echoes() {
    let s0 = uniform(DIMS, 1000.0);
    let relax = RelaxometryParams::default();
    let (b1, b2) = synthetic_echoes(&s0, &uniform(DIMS, 200.0), relax.te1, relax.te2);
    let (r1, r2) = synthetic_echoes(&s0, &uniform(DIMS, 300.0), relax.te1, relax.te2);
    let params = TemperatureParams::new(TemperatureCalibration::new(0.1, 20.0));
    let temp = temperature_relative_from_echoes((&b1, &b2), (&r1, &r2), &relax, &params).unwrap();
    assert_all_close(&temp, 0.1 * 100.0 + 20.0, 1e-6);
}

#[test]
fn test_output_window_on_temperature() {
    let r2 = pseudo_random(DIMS, 0.0, 600.0, 23);
    let params = TemperatureParams {
        output_range: Some(OutputRange::new(0.0, 50.0).unwrap()),
        ..Default::default()
    };
    let temp = temperature_absolute(&r2, &params).unwrap();
    for &t in temp.data() {
        assert!(t == 0.0 || (0.0..=50.0).contains(&t));
    }
}

#[test]
fn test_mismatched_grids_rejected() {
    let baseline = uniform((4, 4, 4), 100.0);
    let reference = uniform(DIMS, 100.0);
    let result = temperature_relative(&baseline, &reference, &TemperatureParams::default());
    assert!(matches!(result, Err(Error::GeometryMismatch { .. })));
}
