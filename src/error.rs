//! Error types for relaxometry and temperature mapping

use std::io;
use thiserror::Error;

/// Result type for map computations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while computing a map
///
/// Every error aborts the single computation it was raised in; no partial
/// output is produced.
#[derive(Error, Debug)]
pub enum Error {
    /// A required image or scalar parameter was not supplied
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// Two images passed to a binary operation differ in shape or geometry
    #[error("Geometry mismatch: expected {expected}, got {actual}")]
    GeometryMismatch { expected: String, actual: String },

    /// A scalar parameter is outside its allowed domain
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No voxel of the label map carries the requested label
    #[error("Region with label {0} is empty")]
    EmptyRegion(i64),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// NIfTI decoding or encoding failure
    #[error("NIfTI error: {0}")]
    Nifti(String),

    /// Malformed parameter file
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::MissingInput("echo1".to_string());
        assert_eq!(err.to_string(), "Missing required input: echo1");

        let err = Error::GeometryMismatch {
            expected: "2x2x2".to_string(),
            actual: "3x2x2".to_string(),
        };
        assert!(err.to_string().contains("expected 2x2x2"));
    }

    #[test]
    fn test_config_error_from_json() {
        let json_err = serde_json::from_str::<f64>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Config(_)));
    }
}
