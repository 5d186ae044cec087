//! Pipeline configuration
//!
//! The complete scalar parameter surface for relaxometry and temperature
//! mapping, loadable from JSON. Every field has a default, so a parameter
//! file only lists what differs, e.g.
//!
//! ```json
//! {
//!   "te1": 0.00007,
//!   "te2": 0.002,
//!   "min_t2star": 0.00125,
//!   "input_threshold": { "min1": 50.0, "min2": 50.0 },
//!   "temperature": { "param_a": 0.15798, "param_b": -9.92 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::relaxometry::RelaxometryParams;
use crate::temperature::TemperatureParams;

/// Scalar inputs of a full calibration → relaxometry → temperature run
///
/// Relaxometry parameters sit at the top level of the file; temperature
/// parameters live under `"temperature"`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(flatten)]
    pub relaxometry: RelaxometryParams,
    /// Known R2* of the calibration reference material, in 1/s
    pub reference_r2star: Option<f64>,
    pub temperature: TemperatureParams,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.relaxometry.validate()?;
        config.temperature.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
