use ctdcal_parser::{FieldRole, InstrumentConfig, SensorChannel};
use polars::prelude::*;
use tracing::{debug, warn};

use crate::calibration::{CalibrationStore, SensorWarning};
use crate::equations::{raw_to_frequency, raw_to_volts, round_to};
use crate::error::{PipelineError, Result};
use crate::salinity::sp_from_c;
use crate::settings::ConversionSettings;

pub const SCAN_DATETIME: &str = "scan_datetime";
pub const PRESSURE_COLUMN: &str = "CTDPRS";

const NMEA_COORDINATE_SCALE: f64 = 50_000.0;
const LATITUDE_SOUTH_BIT: u64 = 0x80;
const LONGITUDE_WEST_BIT: u64 = 0x40;
const NEW_FIX_BIT: u64 = 0x01;
const MICROS_PER_SECOND: i64 = 1_000_000;

pub struct ConversionOutput {
    /// One row per raw frame, in frame order.
    pub samples: DataFrame,
    pub warnings: Vec<SensorWarning>,
}

/// Turns a cast's decoded raw frames into physical units.
pub struct ConversionEngine<'a> {
    config: &'a InstrumentConfig,
    store: &'a CalibrationStore,
    settings: &'a ConversionSettings,
}

impl<'a> ConversionEngine<'a> {
    pub fn new(
        config: &'a InstrumentConfig,
        store: &'a CalibrationStore,
        settings: &'a ConversionSettings,
    ) -> Self {
        Self {
            config,
            store,
            settings,
        }
    }

    /// Output columns: `scan_datetime`, `CTDTMP1..N`, `CTDPRS`, `CTDCOND1..N`, `CTDSAL1..N`,
    /// `CTDOXYVOLTS1..N`, then `lat`, `lon`, `new_fix`. Each is present only when configured.
    pub fn convert(&self, raw: &DataFrame) -> Result<ConversionOutput> {
        let selection = self.store.select(&self.settings.optional_sensors)?;
        let mut warnings = selection.warnings.clone();
        let scale = self.settings.scale;
        let mut columns: Vec<Column> = Vec::new();

        if let Some(times) = self.scan_datetime(raw)? {
            columns.push(times);
        }

        let mut temperatures: Vec<Vec<f64>> = Vec::with_capacity(selection.temperature.len());
        for (n, (index, coeffs)) in selection.temperature.iter().enumerate() {
            let values: Vec<f64> = self
                .sensor_signal(raw, *index)?
                .into_iter()
                .map(|freq| round_to(coeffs.temperature(freq), scale))
                .collect();
            columns.push(Series::new(format!("CTDTMP{}", n + 1).into(), values.as_slice()).into());
            temperatures.push(values);
        }

        let pressure = match selection.pressure {
            Some((index, coeffs)) => {
                let freq = self.sensor_signal(raw, index)?;
                let p_temp = raw_column(raw, &FieldRole::PressureTemperature.column_name())?;
                let values: Vec<f64> = freq
                    .iter()
                    .zip(p_temp.iter())
                    .map(|(f, t)| round_to(coeffs.pressure(*f, *t), scale))
                    .collect();
                columns.push(Series::new(PRESSURE_COLUMN.into(), values.as_slice()).into());
                Some(values)
            }
            None => None,
        };

        let mut conductivities: Vec<(usize, Vec<f64>)> = Vec::new();
        for (n, (index, coeffs)) in selection.conductivity.iter().enumerate() {
            let name = format!("CTDCOND{}", n + 1);
            let Some(pressure) = pressure.as_deref() else {
                omit(&mut warnings, &name, "no unambiguous pressure sensor");
                continue;
            };
            let temperature = paired_temperature(&temperatures, n)?;
            let values: Vec<f64> = self
                .sensor_signal(raw, *index)?
                .iter()
                .zip(temperature.iter().zip(pressure.iter()))
                .map(|(f, (t, p))| round_to(coeffs.conductivity(*f, *t, *p), scale))
                .collect();
            columns.push(Series::new(name.into(), values.as_slice()).into());
            conductivities.push((n, values));
        }

        match pressure.as_deref() {
            Some(pressure) => {
                for (n, conductivity) in &conductivities {
                    let temperature = paired_temperature(&temperatures, *n)?;
                    let values: Vec<f64> = conductivity
                        .iter()
                        .zip(temperature.iter().zip(pressure.iter()))
                        .map(|(c, (t, p))| round_to(sp_from_c(*c, *t, *p), scale))
                        .collect();
                    columns.push(
                        Series::new(format!("CTDSAL{}", n + 1).into(), values.as_slice()).into(),
                    );
                }
            }
            None => {
                for n in 0..selection.conductivity.len() {
                    omit(
                        &mut warnings,
                        &format!("CTDSAL{}", n + 1),
                        "conductivity was not computed",
                    );
                }
            }
        }

        for (n, (index, coeffs)) in selection.oxygen.iter().enumerate() {
            let name = format!("CTDOXYVOLTS{}", n + 1);
            let Some(pressure) = pressure.as_deref() else {
                omit(&mut warnings, &name, "hysteresis correction needs pressure");
                continue;
            };
            let volts = self.sensor_signal(raw, *index)?;
            let values: Vec<f64> = coeffs
                .hysteresis_corrected(&volts, pressure, self.settings.hysteresis_sample_rate_hz)
                .into_iter()
                .map(|v| round_to(v, scale))
                .collect();
            columns.push(Series::new(name.into(), values).into());
        }

        if self.config.flags().has_nmea_lat_lon {
            columns.extend(self.position_columns(raw)?);
        }

        let samples = DataFrame::new(columns)?;
        debug!(
            rows = samples.height(),
            columns = samples.width(),
            "converted raw frames"
        );
        Ok(ConversionOutput { samples, warnings })
    }

    /// Physical signal of a sensor: Hz for frequency channels, volts for voltage words.
    fn sensor_signal(&self, raw: &DataFrame, index: usize) -> Result<Vec<f64>> {
        let channel = self.config.channel_for_sensor(index).ok_or_else(|| {
            PipelineError::Validation(format!("sensor {index} is not wired to any channel"))
        })?;
        let values = match channel {
            SensorChannel::Frequency(k) => raw_column(raw, &frequency_column(k)?)?
                .into_iter()
                .map(raw_to_frequency)
                .collect(),
            SensorChannel::Voltage(k) => raw_column(raw, &voltage_column(k)?)?
                .into_iter()
                .map(raw_to_volts)
                .collect(),
        };
        Ok(values)
    }

    fn scan_datetime(&self, raw: &DataFrame) -> Result<Option<Column>> {
        let flags = self.config.flags();
        let role = if flags.has_scan_time {
            FieldRole::SystemTime
        } else if flags.has_nmea_time {
            FieldRole::NmeaTime
        } else {
            return Ok(None);
        };

        let micros: Vec<i64> = raw_column(raw, &role.column_name())?
            .into_iter()
            .map(|seconds| seconds as i64 * MICROS_PER_SECOND)
            .collect();
        let series = Series::new(SCAN_DATETIME.into(), micros)
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
        Ok(Some(series.into()))
    }

    fn position_columns(&self, raw: &DataFrame) -> Result<Vec<Column>> {
        let lat_raw = raw_column(raw, &FieldRole::NmeaLatitude.column_name())?;
        let lon_raw = raw_column(raw, &FieldRole::NmeaLongitude.column_name())?;
        let status = raw_column(raw, &FieldRole::NmeaSignStatus.column_name())?;

        let mut lat = Vec::with_capacity(status.len());
        let mut lon = Vec::with_capacity(status.len());
        let mut new_fix = Vec::with_capacity(status.len());
        for ((la, lo), st) in lat_raw.iter().zip(lon_raw.iter()).zip(status.iter()) {
            lat.push(signed(*la as f64 / NMEA_COORDINATE_SCALE, st & LATITUDE_SOUTH_BIT != 0));
            lon.push(signed(*lo as f64 / NMEA_COORDINATE_SCALE, st & LONGITUDE_WEST_BIT != 0));
            new_fix.push(st & NEW_FIX_BIT != 0);
        }

        Ok(vec![
            Series::new("lat".into(), lat).into(),
            Series::new("lon".into(), lon).into(),
            Series::new("new_fix".into(), new_fix).into(),
        ])
    }
}

fn signed(value: f64, negative: bool) -> f64 {
    if negative {
        -value
    } else {
        value
    }
}

fn omit(warnings: &mut Vec<SensorWarning>, column: &str, reason: &str) {
    warn!(column, reason, "output column omitted");
    warnings.push(SensorWarning::OutputOmitted {
        column: column.to_string(),
        reason: reason.to_string(),
    });
}

/// Temperature series with the same output number, else the first one.
fn paired_temperature(temperatures: &[Vec<f64>], n: usize) -> Result<&[f64]> {
    temperatures
        .get(n)
        .or_else(|| temperatures.first())
        .map(Vec::as_slice)
        .ok_or_else(|| PipelineError::Validation("no temperature output to pair with".to_string()))
}

fn frequency_column(channel: usize) -> Result<String> {
    let channel = u8::try_from(channel)
        .map_err(|_| PipelineError::Validation(format!("frequency channel {channel} out of range")))?;
    Ok(FieldRole::Frequency(channel).column_name())
}

fn voltage_column(channel: usize) -> Result<String> {
    let channel = u8::try_from(channel)
        .map_err(|_| PipelineError::Validation(format!("voltage channel {channel} out of range")))?;
    Ok(FieldRole::Voltage(channel).column_name())
}

fn raw_column(raw: &DataFrame, name: &str) -> Result<Vec<u64>> {
    let values = raw.column(name)?.u64()?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| {
                PipelineError::Validation(format!("raw column '{name}' is null at row {row}"))
            })
        })
        .collect()
}
