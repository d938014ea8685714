use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ctdcal_parser::{parse_salt_file, DecodeWarning, FrameDecoder, FrameLayout, InstrumentConfig};
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationStore, SensorWarning};
use crate::conversion::ConversionEngine;
use crate::drift::{correct_salt_run, DriftOutcome, SaltResults};
use crate::flags::FlagLog;
use crate::outputs::{export_cast, export_salts, write_json};
use crate::settings::{ConversionSettings, Settings};

pub const HEX_EXTENSION: &str = "hex";
pub const XMLCON_EXTENSION: &str = "XMLCON";

/// Physical table for one cast plus every warning raised on the way.
pub struct ConvertedCast {
    pub samples: DataFrame,
    pub line_count: usize,
    pub header_lines: usize,
    pub decode_warnings: Vec<DecodeWarning>,
    pub sensor_warnings: Vec<SensorWarning>,
}

/// Decodes a raw hex stream and converts it with an already-loaded configuration.
pub fn convert_hex<R: BufRead>(
    config: &InstrumentConfig,
    store: &CalibrationStore,
    settings: &ConversionSettings,
    source: &str,
    reader: R,
) -> crate::Result<ConvertedCast> {
    let layout = FrameLayout::from_config(config);
    debug!(source, %layout, width = layout.total_width(), "derived frame layout");

    let decoded = FrameDecoder::new(&layout, source).decode_reader(reader)?;
    for warning in &decoded.warnings {
        warn!(
            source = %warning.source,
            line = warning.line_number,
            reason = %warning.message,
            "skipping line that does not match frame layout"
        );
    }

    let raw = decoded.frames.to_dataframe()?;
    let converted = ConversionEngine::new(config, store, settings).convert(&raw)?;

    Ok(ConvertedCast {
        samples: converted.samples,
        line_count: decoded.line_count,
        header_lines: decoded.header_lines,
        decode_warnings: decoded.warnings,
        sensor_warnings: converted.warnings,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CastReport {
    pub cast_id: String,
    pub rows: usize,
    pub decode_warnings: usize,
    pub sensor_warnings: Vec<String>,
    pub output: PathBuf,
}

/// Runs one cast end to end: `<raw>/<cast>.XMLCON` + `<raw>/<cast>.hex` to the converted table.
///
/// The instrument configuration and its coefficient document are written next to the
/// output as `<cast>_config.json` and `<cast>_coeffs.json`.
pub fn process_cast(settings: &Settings, cast_id: &str) -> Result<CastReport> {
    let paths = &settings.paths;
    let xmlcon_path = paths.raw.join(format!("{cast_id}.{XMLCON_EXTENSION}"));
    let hex_path = paths.raw.join(format!("{cast_id}.{HEX_EXTENSION}"));

    let xml = fs::read_to_string(&xmlcon_path)
        .with_context(|| format!("failed to read {}", xmlcon_path.display()))?;
    let config = InstrumentConfig::from_xml_str(&xml)
        .with_context(|| format!("invalid instrument configuration for cast {cast_id}"))?;
    write_json(&paths.cfg.join(format!("{cast_id}_config.json")), &config)?;
    write_json(
        &paths.cal.join(format!("{cast_id}_coeffs.json")),
        &config.coefficient_document(),
    )?;

    let store = CalibrationStore::from_config(&config)
        .with_context(|| format!("invalid calibration for cast {cast_id}"))?;

    let hex = File::open(&hex_path)
        .with_context(|| format!("failed to open {}", hex_path.display()))?;
    let source = hex_path.display().to_string();
    let converted = convert_hex(
        &config,
        &store,
        &settings.conversion,
        &source,
        BufReader::new(hex),
    )
    .with_context(|| format!("conversion failed for cast {cast_id}"))?;

    let output = export_cast(
        &converted.samples,
        &paths.cnv,
        cast_id,
        settings.export.format,
    )?;

    info!(
        cast = cast_id,
        rows = converted.samples.height(),
        skipped_lines = converted.decode_warnings.len(),
        "cast converted"
    );
    Ok(CastReport {
        cast_id: cast_id.to_string(),
        rows: converted.samples.height(),
        decode_warnings: converted.decode_warnings.len(),
        sensor_warnings: converted
            .sensor_warnings
            .iter()
            .map(ToString::to_string)
            .collect(),
        output,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub id: String,
    pub detail: String,
}

/// Outcome of a directory-wide run. A failure in one item never stops the others.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub processed: Vec<BatchItem>,
    pub skipped: Vec<BatchItem>,
    pub failed: Vec<BatchItem>,
}

impl BatchSummary {
    fn processed(&mut self, id: &str, detail: impl Into<String>) {
        self.processed.push(BatchItem {
            id: id.to_string(),
            detail: detail.into(),
        });
    }

    fn skipped(&mut self, id: &str, detail: impl Into<String>) {
        self.skipped.push(BatchItem {
            id: id.to_string(),
            detail: detail.into(),
        });
    }

    fn failed(&mut self, id: &str, detail: impl Into<String>) {
        self.failed.push(BatchItem {
            id: id.to_string(),
            detail: detail.into(),
        });
    }

    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.failed.len()
    }
}

/// Converts every `*.hex` cast in the raw directory, in name order.
pub fn process_all_casts(settings: &Settings) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    for cast_id in cast_ids(&settings.paths.raw)? {
        match process_cast(settings, &cast_id) {
            Ok(report) => {
                let detail = format!(
                    "{} rows, {} skipped lines, {} sensor warnings",
                    report.rows,
                    report.decode_warnings,
                    report.sensor_warnings.len()
                );
                summary.processed(&cast_id, detail);
            }
            Err(err) => {
                let detail = format!("{err:#}");
                warn!(cast = %cast_id, error = %detail, "cast failed; continuing");
                summary.failed(&cast_id, detail);
            }
        }
    }
    Ok(summary)
}

/// Casts with a raw hex file, sorted.
pub fn cast_ids(raw_dir: &Path) -> Result<Vec<String>> {
    let pattern = raw_dir.join(format!("*.{HEX_EXTENSION}"));
    let pattern = pattern
        .to_str()
        .ok_or_else(|| anyhow!("raw directory path is not valid UTF-8"))?;

    let mut ids = Vec::new();
    for entry in glob::glob(pattern)? {
        match entry {
            Ok(path) => {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    ids.push(stem.to_string());
                }
            }
            Err(err) => warn!(error = %err, "unreadable path in raw directory"),
        }
    }
    ids.sort();
    Ok(ids)
}

/// Parses, drift-corrects and exports one salinometer file `<salt_raw>/<run_id>`.
pub fn process_salt_file(
    settings: &Settings,
    run_id: &str,
    flag_log: &FlagLog,
) -> Result<(SaltResults, Vec<PathBuf>)> {
    let path = settings.paths.salt_raw.join(run_id);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read salt file {}", path.display()))?;
    let run = parse_salt_file(run_id, &content)?;
    let results = correct_salt_run(&run, Some(flag_log))?;
    let written = export_salts(&results, &settings.paths.salt_out)?;

    info!(
        run = run_id,
        samples = results.samples.len(),
        files = written.len(),
        "salt run processed"
    );
    Ok((results, written))
}

/// Processes every extension-less file in the salt input directory.
///
/// A run whose `<run>_salts.csv` already exists is skipped; a file that cannot be read or
/// parsed is logged and the batch moves on.
pub fn process_all_salts(settings: &Settings) -> Result<BatchSummary> {
    let paths = &settings.paths;
    let flag_log = FlagLog::new(&paths.flag_file);
    let mut summary = BatchSummary::default();

    for run_id in salt_run_ids(&paths.salt_raw)? {
        let existing = paths.salt_out.join(format!("{run_id}_salts.csv"));
        if existing.exists() {
            debug!(run = %run_id, "salts already exported; skipping");
            summary.skipped(&run_id, "output exists");
            continue;
        }

        match process_salt_file(settings, &run_id, &flag_log) {
            Ok((results, written)) => {
                let drift = match results.outcome {
                    DriftOutcome::Fitted(_) => "drift corrected".to_string(),
                    DriftOutcome::Skipped(reason) => format!("uncorrected ({reason})"),
                };
                summary.processed(
                    &run_id,
                    format!("{} samples, {}, {} files", results.samples.len(), drift, written.len()),
                );
            }
            Err(err) => {
                let detail = format!("{err:#}");
                warn!(run = %run_id, error = %detail, "salt run failed; continuing");
                summary.failed(&run_id, detail);
            }
        }
    }
    Ok(summary)
}

fn salt_run_ids(dir: &Path) -> Result<Vec<String>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    let mut ids = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_none() {
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                ids.push(name.to_string());
            }
        }
    }
    ids.sort();
    Ok(ids)
}
