use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use serde::Serialize;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::drift::SaltResults;
use crate::settings::ExportFormat;

/// Writes a converted cast table to `<dir>/<cast_id>.<ext>`.
pub fn export_cast(
    df: &DataFrame,
    dir: &Path,
    cast_id: &str,
    format: ExportFormat,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("{cast_id}.{}", format.extension()));

    let bytes = match format {
        ExportFormat::Csv => create_csv_bytes(df)?,
        ExportFormat::Parquet => create_parquet_bytes(df)?,
        ExportFormat::Zip => {
            let csv = create_csv_bytes(df)?;
            create_zip(&format!("{cast_id}.csv"), &csv)?
        }
    };
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;

    info!(cast = cast_id, path = %path.display(), rows = df.height(), "exported cast");
    Ok(path)
}

/// Writes one `<SSS><CC>_salts.csv` per station/cast. Files that already exist are left alone.
pub fn export_salts(results: &SaltResults, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    for (station, cast) in results.casts() {
        let path = dir.join(salt_file_name(station, cast));
        if path.exists() {
            debug!(path = %path.display(), "salt output already exists; skipping");
            continue;
        }
        let df = results
            .cast_dataframe(station, cast)
            .with_context(|| format!("failed to build salts table for {station:03}{cast:02}"))?;
        fs::write(&path, create_csv_bytes(&df)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

pub fn salt_file_name(station: i64, cast: i64) -> String {
    format!("{station:03}{cast:02}_salts.csv")
}

/// Pretty JSON artifact, e.g. `<cast>_config.json` or `<cast>_coeffs.json`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn create_csv_bytes(df: &DataFrame) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut clone = df.clone();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(&mut clone)
        .context("failed to write csv to buffer")?;
    Ok(buffer)
}

fn create_parquet_bytes(df: &DataFrame) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let mut clone = df.clone();
        ParquetWriter::new(&mut cursor)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .finish(&mut clone)
            .context("failed to write parquet to buffer")?;
    }
    Ok(buffer)
}

fn create_zip(entry_name: &str, contents: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let mut zip = ZipWriter::new(&mut cursor);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(entry_name, options)
            .with_context(|| format!("failed to start {entry_name} in archive"))?;
        zip.write_all(contents)
            .with_context(|| format!("failed to write {entry_name}"))?;
        zip.finish().context("failed to finalize archive")?;
    }
    Ok(buffer)
}
