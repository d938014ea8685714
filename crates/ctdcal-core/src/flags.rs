use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::error::Result;

pub const QUESTIONABLE_FLAG: u8 = 3;
pub const QUESTIONABLE_COMMENT: &str = "Auto-flagged by processing function (had * in row)";

/// One manual-flag row: `station,sample_number,diff,salinity_flag,comment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagRecord {
    /// Run identifier (`SSSCC`).
    pub station: String,
    pub sample_number: i64,
    /// Written as an empty field when absent.
    pub diff: Option<f64>,
    pub salinity_flag: u8,
    pub comment: String,
}

impl FlagRecord {
    pub fn questionable(station: &str, sample_number: i64) -> Self {
        Self {
            station: station.to_string(),
            sample_number,
            diff: None,
            salinity_flag: QUESTIONABLE_FLAG,
            comment: QUESTIONABLE_COMMENT.to_string(),
        }
    }
}

/// Append-only CSV flag file shared between salt runs.
///
/// Writers take the lock for the whole batch of records, so records from concurrent runs
/// never interleave. Existing content is never rewritten.
#[derive(Debug)]
pub struct FlagLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FlagLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, records: &[FlagRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        info!(
            path = %self.path.display(),
            count = records.len(),
            "appended flag records"
        );
        Ok(())
    }
}
