use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::calibration::OXYGEN_SENSOR;
use crate::error::Result;

/// Processing settings, read from a TOML file and handed to each pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub conversion: ConversionSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// `<cast>.hex` and `<cast>.XMLCON` inputs.
    pub raw: PathBuf,
    pub cfg: PathBuf,
    pub cal: PathBuf,
    pub cnv: PathBuf,
    pub salt_raw: PathBuf,
    pub salt_out: PathBuf,
    pub flag_file: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            raw: PathBuf::from("data/raw"),
            cfg: PathBuf::from("data/cfg"),
            cal: PathBuf::from("data/cal"),
            cnv: PathBuf::from("data/cnv"),
            salt_raw: PathBuf::from("data/salt"),
            salt_out: PathBuf::from("data/salt_out"),
            flag_file: PathBuf::from("data/flags_manual_salt.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Decimal places kept in converted outputs.
    pub scale: u32,
    pub optional_sensors: Vec<String>,
    pub hysteresis_sample_rate_hz: f64,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            scale: 4,
            optional_sensors: vec![OXYGEN_SENSOR.to_string()],
            hysteresis_sample_rate_hz: 24.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// CSV inside a deflated zip archive.
    #[default]
    Zip,
    Parquet,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Zip => "zip",
            ExportFormat::Parquet => "parquet",
            ExportFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub format: ExportFormat,
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
