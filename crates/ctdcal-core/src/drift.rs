use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveTime;
use ctdcal_parser::{AutosalSample, SaltReading, SaltRun};
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::equations::round_to;
use crate::error::Result;
use crate::flags::{FlagLog, FlagRecord};
use crate::salinity::sp_salinometer;

/// Conductivity ratios are recorded to five decimals.
pub const RATIO_SCALE: u32 = 5;
pub const SALINITY_COLUMN: &str = "SALNTY";

/// Linear conductivity-ratio drift between the pre-run and post-run standards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftModel {
    /// Ratio change per second between the standards (post minus pre).
    pub rate: f64,
    /// Elapsed seconds of the pre-run standard.
    pub pre_seconds: f64,
    pub pre_ratio: f64,
    pub post_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftSkip {
    /// Exactly two standard readings are required.
    ReferenceCount(usize),
    /// Both standards carry the same timestamp.
    ZeroInterval,
}

impl fmt::Display for DriftSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftSkip::ReferenceCount(count) => {
                write!(f, "expected 2 reference readings, found {count}")
            }
            DriftSkip::ZeroInterval => write!(f, "reference readings share a timestamp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftOutcome {
    Fitted(DriftModel),
    Skipped(DriftSkip),
}

impl DriftModel {
    /// Fits the model from the run's standards, or reports why it cannot.
    pub fn fit(run: &SaltRun) -> DriftOutcome {
        let references: Vec<&SaltReading> = run.references().collect();
        let [pre, post] = references.as_slice() else {
            return DriftOutcome::Skipped(DriftSkip::ReferenceCount(references.len()));
        };

        let interval = post.elapsed_seconds - pre.elapsed_seconds;
        if interval == 0.0 {
            return DriftOutcome::Skipped(DriftSkip::ZeroInterval);
        }

        DriftOutcome::Fitted(DriftModel {
            rate: (post.conductivity_ratio - pre.conductivity_ratio) / interval,
            pre_seconds: pre.elapsed_seconds,
            pre_ratio: pre.conductivity_ratio,
            post_ratio: post.conductivity_ratio,
        })
    }

    /// Ratio on the line through both standards at `elapsed_seconds`, rounded to five decimals.
    pub fn fitted_ratio(&self, elapsed_seconds: f64) -> f64 {
        round_to(
            self.pre_ratio + (elapsed_seconds - self.pre_seconds) * self.rate,
            RATIO_SCALE,
        )
    }

    /// Corrected ratio of a reading taken `elapsed_seconds` into the run:
    /// `ratio + elapsed_seconds * rate`, rounded to five decimals.
    pub fn correct(&self, ratio: f64, elapsed_seconds: f64) -> f64 {
        round_to(ratio + elapsed_seconds * self.rate, RATIO_SCALE)
    }
}

/// One science sample after drift correction.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedSample {
    pub reading: SaltReading,
    pub corrected_ratio: f64,
    pub salinity: f64,
}

/// Result of running one salinometer file through correction.
#[derive(Debug, Clone)]
pub struct SaltResults {
    pub run_id: String,
    pub outcome: DriftOutcome,
    pub samples: Vec<CorrectedSample>,
    pub flagged: Vec<FlagRecord>,
    reading_columns: usize,
}

/// Flags questionable samples, fits the drift model over the whole run, then corrects
/// every sample and computes its salinity.
pub fn correct_salt_run(run: &SaltRun, flag_log: Option<&FlagLog>) -> Result<SaltResults> {
    let flagged: Vec<FlagRecord> = run
        .questionable_samples()
        .map(|reading| FlagRecord::questionable(&run.run_id, reading.sample_number))
        .collect();
    if !flagged.is_empty() {
        debug!(run = %run.run_id, count = flagged.len(), "questionable samples found");
        if let Some(log) = flag_log {
            log.append(&flagged)?;
        }
    }
    if run.excluded_count() > 0 {
        debug!(run = %run.run_id, count = run.excluded_count(), "ignored commented-out rows");
    }

    let outcome = DriftModel::fit(run);
    match &outcome {
        DriftOutcome::Fitted(model) => {
            info!(run = %run.run_id, rate = model.rate, "fitted salinometer drift")
        }
        DriftOutcome::Skipped(reason) => warn!(
            run = %run.run_id,
            %reason,
            "drift correction skipped; using uncorrected ratios"
        ),
    }

    let samples = run
        .samples()
        .map(|reading| {
            let corrected_ratio = match &outcome {
                DriftOutcome::Fitted(model) => {
                    model.correct(reading.conductivity_ratio, reading.elapsed_seconds)
                }
                DriftOutcome::Skipped(_) => reading.conductivity_ratio,
            };
            CorrectedSample {
                reading: reading.clone(),
                corrected_ratio,
                salinity: sp_salinometer(corrected_ratio / 2.0, reading.bath_temperature),
            }
        })
        .collect();

    Ok(SaltResults {
        run_id: run.run_id.clone(),
        outcome,
        samples,
        flagged,
        reading_columns: run.reading_columns(),
    })
}

impl SaltResults {
    /// Distinct (station, cast) pairs in first-seen order.
    pub fn casts(&self) -> Vec<(i64, i64)> {
        let mut seen = BTreeSet::new();
        self.samples
            .iter()
            .map(|sample| (sample.reading.station, sample.reading.cast))
            .filter(|key| seen.insert(*key))
            .collect()
    }

    /// Samples as a table; `CRavg` holds the corrected ratio.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let refs: Vec<&CorrectedSample> = self.samples.iter().collect();
        self.build_frame(&refs)
    }

    /// Table restricted to one station/cast, without reading columns that are empty there.
    pub fn cast_dataframe(&self, station: i64, cast: i64) -> PolarsResult<DataFrame> {
        let subset: Vec<&CorrectedSample> = self
            .samples
            .iter()
            .filter(|sample| sample.reading.station == station && sample.reading.cast == cast)
            .collect();
        let df = self.build_frame(&subset)?;

        let empty: Vec<String> = df
            .get_columns()
            .iter()
            .filter(|column| column.null_count() == column.len())
            .map(|column| column.name().to_string())
            .collect();
        Ok(df.drop_many(empty))
    }

    fn build_frame(&self, samples: &[&CorrectedSample]) -> PolarsResult<DataFrame> {
        let rows: Vec<&SaltReading> = samples.iter().map(|sample| &sample.reading).collect();
        let integers = |name: &str, value: fn(&SaltReading) -> i64| -> Column {
            let values: Vec<i64> = rows.iter().map(|row| value(row)).collect();
            Series::new(name.into(), values).into()
        };
        let times = |name: &str, value: fn(&SaltReading) -> NaiveTime| -> Column {
            let values: Vec<String> = rows
                .iter()
                .map(|row| value(row).format("%H:%M:%S").to_string())
                .collect();
            Series::new(name.into(), values).into()
        };

        let bath: Vec<f64> = rows.iter().map(|row| row.bath_temperature).collect();
        let ratio: Vec<f64> = samples.iter().map(|sample| sample.corrected_ratio).collect();
        let autosal: Vec<Option<i64>> = rows
            .iter()
            .map(|row| match row.autosal_sample {
                AutosalSample::Number(value) => Some(value),
                AutosalSample::Reference => None,
            })
            .collect();

        let mut columns: Vec<Column> = vec![
            integers("STNNBR", |row| row.station),
            integers("CASTNO", |row| row.cast),
            integers("SAMPNO", |row| row.sample_number),
            Series::new("BathTEMP".into(), bath).into(),
            Series::new("CRavg".into(), ratio).into(),
            Series::new("autosalSAMPNO".into(), autosal).into(),
            integers("Unknown", |row| row.unknown),
            times("StartTime", |row| row.start_time),
            times("EndTime", |row| row.end_time),
            integers("Attempts", |row| row.attempts),
        ];

        for idx in 0..self.reading_columns {
            let values: Vec<Option<f64>> = rows
                .iter()
                .map(|row| row.readings.get(idx).copied())
                .collect();
            columns.push(Series::new(format!("Reading{}", idx + 1).into(), values).into());
        }

        let salinity: Vec<f64> = samples.iter().map(|sample| sample.salinity).collect();
        columns.push(Series::new(SALINITY_COLUMN.into(), salinity).into());

        DataFrame::new(columns)
    }
}
