pub mod calibration;
pub mod conversion;
pub mod drift;
pub mod equations;
pub mod error;
pub mod flags;
pub mod outputs;
pub mod pipelines;
pub mod salinity;
pub mod settings;

pub use error::{CalibrationError, PipelineError, Result};
