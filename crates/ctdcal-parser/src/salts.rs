use chrono::{NaiveTime, Timelike};

use crate::errors::SaltParseError;

pub const FIXED_COLUMNS: [&str; 10] = [
    "STNNBR",
    "CASTNO",
    "SAMPNO",
    "BathTEMP",
    "CRavg",
    "autosalSAMPNO",
    "Unknown",
    "StartTime",
    "EndTime",
    "Attempts",
];

const REFERENCE_TOKEN: &str = "worm";
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Autosal sample number column: either a bottle number or the standard-seawater marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosalSample {
    Number(i64),
    Reference,
}

/// One salinometer reading.
#[derive(Debug, Clone, PartialEq)]
pub struct SaltReading {
    pub line_number: usize,
    pub station: i64,
    pub cast: i64,
    pub sample_number: i64,
    pub bath_temperature: f64,
    pub conductivity_ratio: f64,
    pub autosal_sample: AutosalSample,
    pub unknown: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub attempts: i64,
    pub readings: Vec<f64>,
    /// End time carried a `*` in the raw file.
    pub questionable: bool,
    /// Seconds since the first end time of the run, wrapped past midnight.
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaltRow {
    /// Commented-out line (station starts with `#` or `x`).
    Excluded { line_number: usize, raw: String },
    /// Standard seawater ("worm") reading bracketing the run.
    Reference(SaltReading),
    Sample(SaltReading),
}

impl SaltRow {
    pub fn reading(&self) -> Option<&SaltReading> {
        match self {
            SaltRow::Excluded { .. } => None,
            SaltRow::Reference(reading) | SaltRow::Sample(reading) => Some(reading),
        }
    }
}

/// Every row of one salinometer file, classified, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct SaltRun {
    pub run_id: String,
    pub rows: Vec<SaltRow>,
}

impl SaltRun {
    pub fn references(&self) -> impl Iterator<Item = &SaltReading> {
        self.rows.iter().filter_map(|row| match row {
            SaltRow::Reference(reading) => Some(reading),
            _ => None,
        })
    }

    pub fn samples(&self) -> impl Iterator<Item = &SaltReading> {
        self.rows.iter().filter_map(|row| match row {
            SaltRow::Sample(reading) => Some(reading),
            _ => None,
        })
    }

    pub fn excluded_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| matches!(row, SaltRow::Excluded { .. }))
            .count()
    }

    pub fn questionable_samples(&self) -> impl Iterator<Item = &SaltReading> {
        self.samples().filter(|reading| reading.questionable)
    }

    /// Widest trailing reading set in the file; not declared anywhere in the header.
    pub fn reading_columns(&self) -> usize {
        self.rows
            .iter()
            .filter_map(SaltRow::reading)
            .map(|reading| reading.readings.len())
            .max()
            .unwrap_or(0)
    }
}

/// Parses a whitespace-delimited salinometer file. The first line is a header and is discarded.
pub fn parse_salt_file(run_id: &str, content: &str) -> Result<SaltRun, SaltParseError> {
    let mut lines = content.lines().enumerate();
    if lines.next().is_none() {
        return Err(SaltParseError::MissingHeader {
            run: run_id.to_string(),
        });
    }

    let mut rows = Vec::new();
    let mut origin: Option<u32> = None;

    for (idx, line) in lines {
        let line_number = idx + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }

        if fields[0].starts_with('#') || fields[0].starts_with('x') {
            rows.push(SaltRow::Excluded {
                line_number,
                raw: line.to_string(),
            });
            continue;
        }

        if fields.len() < FIXED_COLUMNS.len() {
            return Err(SaltParseError::TooFewFields {
                run: run_id.to_string(),
                line_number,
                expected: FIXED_COLUMNS.len(),
                found: fields.len(),
            });
        }

        let ctx = RowContext {
            run: run_id,
            line_number,
        };

        let questionable = fields[8].contains('*');
        let end_raw = fields[8].replace('*', "");
        let end_time = ctx.time(FIXED_COLUMNS[8], &end_raw)?;
        let start_time = ctx.time(FIXED_COLUMNS[7], &fields[7].replace('*', ""))?;

        let end_seconds = end_time.num_seconds_from_midnight();
        let origin_seconds = *origin.get_or_insert(end_seconds);
        let mut elapsed_seconds = f64::from(end_seconds) - f64::from(origin_seconds);
        if elapsed_seconds < 0.0 {
            elapsed_seconds += SECONDS_PER_DAY;
        }

        let autosal_sample = if fields[5] == REFERENCE_TOKEN {
            AutosalSample::Reference
        } else {
            AutosalSample::Number(ctx.integer(FIXED_COLUMNS[5], fields[5])?)
        };

        let readings = fields[FIXED_COLUMNS.len()..]
            .iter()
            .map(|value| ctx.float("Reading", value))
            .collect::<Result<Vec<_>, _>>()?;

        let reading = SaltReading {
            line_number,
            station: ctx.integer(FIXED_COLUMNS[0], fields[0])?,
            cast: ctx.integer(FIXED_COLUMNS[1], fields[1])?,
            sample_number: ctx.integer(FIXED_COLUMNS[2], fields[2])?,
            bath_temperature: ctx.float(FIXED_COLUMNS[3], fields[3])?,
            conductivity_ratio: ctx.float(FIXED_COLUMNS[4], fields[4])?,
            autosal_sample,
            unknown: ctx.integer(FIXED_COLUMNS[6], fields[6])?,
            start_time,
            end_time,
            attempts: ctx.integer(FIXED_COLUMNS[9], fields[9])?,
            readings,
            questionable,
            elapsed_seconds,
        };

        rows.push(match autosal_sample {
            AutosalSample::Reference => SaltRow::Reference(reading),
            AutosalSample::Number(_) => SaltRow::Sample(reading),
        });
    }

    if rows.iter().all(|row| row.reading().is_none()) {
        return Err(SaltParseError::EmptyData {
            run: run_id.to_string(),
        });
    }

    Ok(SaltRun {
        run_id: run_id.to_string(),
        rows,
    })
}

struct RowContext<'a> {
    run: &'a str,
    line_number: usize,
}

impl RowContext<'_> {
    fn error(&self, column: &'static str, value: &str) -> SaltParseError {
        SaltParseError::DataRow {
            run: self.run.to_string(),
            line_number: self.line_number,
            column,
            value: value.to_string(),
        }
    }

    fn integer(&self, column: &'static str, value: &str) -> Result<i64, SaltParseError> {
        value.parse::<i64>().map_err(|_| self.error(column, value))
    }

    fn float(&self, column: &'static str, value: &str) -> Result<f64, SaltParseError> {
        value.parse::<f64>().map_err(|_| self.error(column, value))
    }

    fn time(&self, column: &'static str, value: &str) -> Result<NaiveTime, SaltParseError> {
        static FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];
        FORMATS
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
            .ok_or_else(|| self.error(column, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "12-345 operator: ABC box: S batch: P165 k15: 0.99986 std dial 408\n";

    #[test]
    fn classifies_rows() {
        let content = format!(
            "{HEADER}\
001 01 00 24 1.99990 worm 3 10:00:00 10:00:30 3 1.99990 1.99991 1.99989\n\
001 01 01 24 2.01000 1 3 10:01:00 10:01:30 3 2.01001 2.01000 2.00999\n\
#01 01 02 24 2.02000 2 3 10:02:00 10:02:30 3 2.02000\n\
001 01 03 24 2.03000 3 3 10:03:00 10:03:30* 2 2.03000 2.03001\n\
001 01 04 24 2.00010 worm 3 11:00:00 11:00:30 3 2.00010 2.00011 2.00009\n"
        );
        let run = parse_salt_file("00101", &content).expect("parse");

        assert_eq!(run.references().count(), 2);
        assert_eq!(run.samples().count(), 2);
        assert_eq!(run.excluded_count(), 1);
        assert_eq!(run.reading_columns(), 3);

        let flagged: Vec<_> = run.questionable_samples().collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].sample_number, 3);
        assert_eq!(flagged[0].end_time, NaiveTime::from_hms_opt(10, 3, 30).unwrap());

        let last_ref = run.references().last().unwrap();
        assert_eq!(last_ref.elapsed_seconds, 3600.0);
    }

    #[test]
    fn elapsed_time_wraps_past_midnight() {
        let content = format!(
            "{HEADER}\
001 01 00 24 1.99990 worm 3 23:50:00 23:50:00 3 1.99990\n\
001 01 01 24 2.01000 1 3 00:09:30 00:10:00 3 2.01000\n"
        );
        let run = parse_salt_file("00101", &content).expect("parse");
        let sample = run.samples().next().unwrap();
        assert_eq!(sample.elapsed_seconds, 1200.0);
    }

    #[test]
    fn short_row_is_an_error() {
        let content = format!("{HEADER}001 01 01 24 2.01000 1\n");
        let err = parse_salt_file("00101", &content).unwrap_err();
        assert!(matches!(err, SaltParseError::TooFewFields { found: 6, .. }));
    }
}
