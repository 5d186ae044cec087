//! Dual-echo thermometry on NIfTI data
//!
//! Usage: cargo run --release --example thermometry_nifti -- <data_dir> [params.json]
//!
//! Expects `echo1` and `echo2` under `<data_dir>` (.nii or .nii.gz). When
//! `baseline_echo1`/`baseline_echo2` exist the temperature is relative to
//! them. A `labels` volume with label 1 marks the reference material used
//! for the echo-2 scale factor (needs `reference_r2star` in the params);
//! `echo1_repeat`/`echo2_repeat` enable the noise estimate over the same
//! region. Results are written to `<data_dir>/out`.

use std::path::PathBuf;
use std::time::Instant;

use log::{info, warn};
use r2star_core::calibration::{calibrate, Region};
use r2star_core::config::PipelineConfig;
use r2star_core::nifti_io::{ImageProvider, NiftiFileProvider};
use r2star_core::relaxometry::{compute_series, EchoPair};
use r2star_core::temperature::{temperature_absolute, temperature_relative};
use r2star_core::utils::LabelStatistics;
use r2star_core::MapSelection;

const REFERENCE_LABEL: i64 = 1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")?.start()?;
    let total_start = Instant::now();

    let mut args = std::env::args().skip(1);
    let data_dir = PathBuf::from(args.next().ok_or("usage: thermometry_nifti <data_dir> [params.json]")?);
    let config = match args.next() {
        Some(path) => PipelineConfig::from_file(&PathBuf::from(path))?,
        None => PipelineConfig::default(),
    };

    let input = NiftiFileProvider::new(&data_dir);
    let output_dir = data_dir.join("out");
    std::fs::create_dir_all(&output_dir)?;
    let output = NiftiFileProvider::new(&output_dir);

    // ========================================================================
    // Load echoes
    // ========================================================================
    let start = Instant::now();
    let echo1 = input.load_scalar_field("echo1")?;
    let echo2 = input.load_scalar_field("echo2")?;
    let baseline = match (
        input.load_scalar_field("baseline_echo1"),
        input.load_scalar_field("baseline_echo2"),
    ) {
        (Ok(b1), Ok(b2)) => Some((b1, b2)),
        _ => None,
    };
    let (nx, ny, nz) = echo1.geometry().dims;
    info!("Loaded {}x{}x{} echoes in {:.2?}", nx, ny, nz, start.elapsed());

    // ========================================================================
    // Calibration
    // ========================================================================
    let mut params = config.relaxometry.clone();
    if let Ok(labels) = input.load_scalar_field("labels") {
        let repeats = match (
            input.load_scalar_field("echo1_repeat"),
            input.load_scalar_field("echo2_repeat"),
        ) {
            (Ok(r1), Ok(r2)) => Some((r1, r2)),
            _ => {
                warn!("No repeated echoes found, skipping noise estimate");
                None
            }
        };
        let calibration = calibrate(
            &LabelStatistics,
            &echo1,
            &echo2,
            Region::new(&labels, REFERENCE_LABEL),
            &params,
            config.reference_r2star,
            repeats.as_ref().map(|(r1, r2)| (r1, r2)),
        )?;
        info!("Calibration: {:?}", calibration);
        calibration.apply_to(&mut params);
    }

    // ========================================================================
    // Relaxometry
    // ========================================================================
    let start = Instant::now();
    let mut pairs = vec![EchoPair::new("acquisition", &echo1, &echo2)];
    if let Some((b1, b2)) = &baseline {
        pairs.push(EchoPair::new("baseline", b1, b2));
    }
    let results = compute_series(&pairs, &params, MapSelection::BOTH)?;
    info!("Relaxometry done in {:.2?}", start.elapsed());

    let mut r2star_maps = Vec::new();
    for (name, maps) in results {
        if let Some(t2star) = &maps.t2star {
            output.save_scalar_field(t2star, &format!("{}_t2star", name))?;
        }
        if let Some(r2star) = maps.r2star {
            output.save_scalar_field(&r2star, &format!("{}_r2star", name))?;
            r2star_maps.push(r2star);
        }
    }

    // ========================================================================
    // Temperature
    // ========================================================================
    let temp_params = &config.temperature;
    let temperature = match r2star_maps.as_slice() {
        [reference, baseline] => temperature_relative(baseline, reference, temp_params)?,
        [reference] => temperature_absolute(reference, temp_params)?,
        _ => return Err("no R2* map computed".into()),
    };
    output.save_scalar_field(&temperature, "temperature")?;

    info!("Results saved to {} ({:.2?} total)", output_dir.display(), total_start.elapsed());
    Ok(())
}
