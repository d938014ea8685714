// crates/ctdcal-core/src/error.rs

use ctdcal_parser::{ConfigError, SaltParseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("no '{sensor_type}' sensor in calibration set")]
    SensorNotFound { sensor_type: String },

    #[error("sensor {index} ({sensor_type}) is missing coefficient '{name}'")]
    MissingCoefficient {
        index: usize,
        sensor_type: String,
        name: &'static str,
    },

    #[error("sensor {index} coefficient '{name}' has non-numeric value '{value}'")]
    InvalidCoefficient {
        index: usize,
        name: String,
        value: String,
    },

    #[error("calibration file is malformed: {0}")]
    MalformedFile(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Instrument configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Salinometer file error: {0}")]
    SaltParse(#[from] SaltParseError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Settings file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
