use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ctdcal_parser::InstrumentConfig;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::CalibrationError;

pub const TEMPERATURE_SENSOR: &str = "TemperatureSensor";
pub const CONDUCTIVITY_SENSOR: &str = "ConductivitySensor";
pub const PRESSURE_SENSOR: &str = "PressureSensor";
pub const OXYGEN_SENSOR: &str = "OxygenSensor";

/// Types without which a cast cannot be converted.
pub const PRIMARY_SENSOR_TYPES: [&str; 3] =
    [TEMPERATURE_SENSOR, PRESSURE_SENSOR, CONDUCTIVITY_SENSOR];

const SENSOR_NAME_KEY: &str = "SensorName";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureCoefficients {
    pub g: f64,
    pub h: f64,
    pub i: f64,
    pub j: f64,
    pub f0: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConductivityCoefficients {
    pub g: f64,
    pub h: f64,
    pub i: f64,
    pub j: f64,
    pub ct_cor: f64,
    pub cp_cor: f64,
}

/// Digiquartz pressure sensor with AD590 temperature compensation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PressureCoefficients {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    pub d1: f64,
    pub d2: f64,
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub t4: f64,
    pub ad590m: f64,
    pub ad590b: f64,
}

/// SBE 43 hysteresis terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OxygenCoefficients {
    pub offset: f64,
    pub h1: f64,
    pub h2: f64,
    pub h3: f64,
}

/// Typed coefficient record resolved when the store is loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorCalibration {
    Temperature(TemperatureCoefficients),
    Conductivity(ConductivityCoefficients),
    Pressure(PressureCoefficients),
    Oxygen(OxygenCoefficients),
    /// No equation is known for this type; only the raw map is kept.
    Uncalibrated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedSensor {
    pub index: usize,
    pub sensor_type: String,
    pub coefficients: BTreeMap<String, String>,
    pub calibration: SensorCalibration,
}

impl CalibratedSensor {
    /// Builds the typed record for a sensor.
    ///
    /// Incomplete coefficients fail the load only for primary types. Any other sensor is
    /// kept as `Uncalibrated` and the reason comes back as a warning.
    fn resolve(
        index: usize,
        sensor_type: String,
        coefficients: BTreeMap<String, String>,
    ) -> Result<(Self, Option<SensorWarning>), CalibrationError> {
        let mut sensor = Self {
            index,
            sensor_type,
            coefficients,
            calibration: SensorCalibration::Uncalibrated,
        };

        match sensor.typed_calibration() {
            Ok(calibration) => {
                sensor.calibration = calibration;
                Ok((sensor, None))
            }
            Err(err) if sensor.is_primary() => Err(err),
            Err(err) => {
                let reason = err.to_string();
                warn!(
                    index,
                    sensor_type = %sensor.sensor_type,
                    reason = %reason,
                    "sensor left uncalibrated"
                );
                let warning = SensorWarning::Uncalibrated {
                    index,
                    sensor_type: sensor.sensor_type.clone(),
                    reason,
                };
                Ok((sensor, Some(warning)))
            }
        }
    }

    fn typed_calibration(&self) -> Result<SensorCalibration, CalibrationError> {
        let reader = CoefficientReader { sensor: self };

        let calibration = if self.has_type(TEMPERATURE_SENSOR) {
            SensorCalibration::Temperature(TemperatureCoefficients {
                g: reader.get("G")?,
                h: reader.get("H")?,
                i: reader.get("I")?,
                j: reader.get("J")?,
                f0: reader.get("F0")?,
            })
        } else if self.has_type(CONDUCTIVITY_SENSOR) {
            SensorCalibration::Conductivity(ConductivityCoefficients {
                g: reader.get("G")?,
                h: reader.get("H")?,
                i: reader.get("I")?,
                j: reader.get("J")?,
                ct_cor: reader.get("CTcor")?,
                cp_cor: reader.get("CPcor")?,
            })
        } else if self.has_type(PRESSURE_SENSOR) {
            SensorCalibration::Pressure(PressureCoefficients {
                c1: reader.get("C1")?,
                c2: reader.get("C2")?,
                c3: reader.get("C3")?,
                d1: reader.get("D1")?,
                d2: reader.get("D2")?,
                t1: reader.get("T1")?,
                t2: reader.get("T2")?,
                t3: reader.get("T3")?,
                t4: reader.get("T4")?,
                ad590m: reader.get("AD590M")?,
                ad590b: reader.get("AD590B")?,
            })
        } else if self.has_type(OXYGEN_SENSOR) {
            SensorCalibration::Oxygen(OxygenCoefficients {
                offset: reader.get("offset")?,
                h1: reader.get("H1")?,
                h2: reader.get("H2")?,
                h3: reader.get("H3")?,
            })
        } else {
            SensorCalibration::Uncalibrated
        };
        Ok(calibration)
    }

    fn is_primary(&self) -> bool {
        PRIMARY_SENSOR_TYPES.iter().any(|name| self.has_type(name))
    }

    /// True when the configured type, or the `SensorName` coefficient, equals `name`.
    pub fn has_type(&self, name: &str) -> bool {
        self.sensor_type == name
            || self
                .coefficients
                .get(SENSOR_NAME_KEY)
                .is_some_and(|value| value == name)
    }
}

struct CoefficientReader<'a> {
    sensor: &'a CalibratedSensor,
}

impl CoefficientReader<'_> {
    fn get(&self, name: &'static str) -> Result<f64, CalibrationError> {
        let raw = self.sensor.coefficients.get(name).ok_or_else(|| {
            CalibrationError::MissingCoefficient {
                index: self.sensor.index,
                sensor_type: self.sensor.sensor_type.clone(),
                name,
            }
        })?;
        raw.trim()
            .parse::<f64>()
            .map_err(|_| CalibrationError::InvalidCoefficient {
                index: self.sensor.index,
                name: name.to_string(),
                value: raw.clone(),
            })
    }
}

/// Non-fatal sensor conditions met while selecting a cast's sensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorWarning {
    OptionalMissing { sensor_type: String },
    AmbiguousPressure { indices: Vec<usize> },
    OutputOmitted { column: String, reason: String },
    /// A non-primary sensor whose coefficients could not be resolved.
    Uncalibrated {
        index: usize,
        sensor_type: String,
        reason: String,
    },
}

impl fmt::Display for SensorWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorWarning::OptionalMissing { sensor_type } => {
                write!(f, "optional sensor '{sensor_type}' not found; skipped")
            }
            SensorWarning::AmbiguousPressure { indices } => write!(
                f,
                "{} pressure sensors found (indices {:?}); pressure skipped",
                indices.len(),
                indices
            ),
            SensorWarning::OutputOmitted { column, reason } => {
                write!(f, "{column} omitted: {reason}")
            }
            SensorWarning::Uncalibrated {
                index,
                sensor_type,
                reason,
            } => write!(f, "sensor {index} ({sensor_type}) left uncalibrated: {reason}"),
        }
    }
}

/// Sensors a conversion will use, each list in calibration-file discovery order.
#[derive(Debug, Clone, Default)]
pub struct SensorSelection {
    pub temperature: Vec<(usize, TemperatureCoefficients)>,
    pub conductivity: Vec<(usize, ConductivityCoefficients)>,
    pub pressure: Option<(usize, PressureCoefficients)>,
    pub oxygen: Vec<(usize, OxygenCoefficients)>,
    pub warnings: Vec<SensorWarning>,
}

/// Per-cast coefficient sets keyed by sensor index. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct CalibrationStore {
    sensors: Vec<CalibratedSensor>,
    load_warnings: Vec<SensorWarning>,
}

impl CalibrationStore {
    pub fn from_config(config: &InstrumentConfig) -> Result<Self, CalibrationError> {
        Self::from_entries(config.sensors().iter().map(|sensor| {
            (
                sensor.index,
                sensor.sensor_type.clone(),
                sensor.coefficients.clone(),
            )
        }))
    }

    /// Loads `{"<index>": {"sensor": <type>, "coeffs": {<name>: <value>}}}`.
    pub fn from_json_str(text: &str) -> Result<Self, CalibrationError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| CalibrationError::MalformedFile(err.to_string()))?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &Value) -> Result<Self, CalibrationError> {
        let document = value.as_object().ok_or_else(|| {
            CalibrationError::MalformedFile("top level must be an object".to_string())
        })?;

        let mut entries = Vec::with_capacity(document.len());
        for (key, entry) in document {
            let index = key.trim().parse::<usize>().map_err(|_| {
                CalibrationError::MalformedFile(format!("sensor key '{key}' is not an index"))
            })?;
            let sensor_type = entry
                .get("sensor")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    CalibrationError::MalformedFile(format!("sensor {index} has no 'sensor' name"))
                })?;
            let coeffs = entry
                .get("coeffs")
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    CalibrationError::MalformedFile(format!("sensor {index} has no 'coeffs' map"))
                })?;

            let mut coefficients = BTreeMap::new();
            for (name, value) in coeffs {
                let text = match value {
                    Value::String(text) => text.clone(),
                    Value::Number(number) => number.to_string(),
                    other => {
                        return Err(CalibrationError::MalformedFile(format!(
                            "sensor {index} coefficient '{name}' has unsupported value {other}"
                        )))
                    }
                };
                coefficients.insert(name.clone(), text);
            }
            entries.push((index, sensor_type.to_string(), coefficients));
        }

        Self::from_entries(entries)
    }

    fn from_entries(
        entries: impl IntoIterator<Item = (usize, String, BTreeMap<String, String>)>,
    ) -> Result<Self, CalibrationError> {
        let mut seen = BTreeSet::new();
        let mut sensors = Vec::new();
        let mut load_warnings = Vec::new();
        for (index, sensor_type, coefficients) in entries {
            if !seen.insert(index) {
                return Err(CalibrationError::MalformedFile(format!(
                    "sensor index {index} appears more than once"
                )));
            }
            let (sensor, warning) = CalibratedSensor::resolve(index, sensor_type, coefficients)?;
            sensors.push(sensor);
            load_warnings.extend(warning);
        }
        Ok(Self {
            sensors,
            load_warnings,
        })
    }

    /// Sensors that loaded without a typed record.
    pub fn load_warnings(&self) -> &[SensorWarning] {
        &self.load_warnings
    }

    /// Sensors in discovery order.
    pub fn sensors(&self) -> &[CalibratedSensor] {
        &self.sensors
    }

    pub fn sensor(&self, index: usize) -> Option<&CalibratedSensor> {
        self.sensors.iter().find(|sensor| sensor.index == index)
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Indices of every sensor matching `name`, ascending.
    pub fn lookup_by_type(&self, name: &str) -> Vec<usize> {
        let mut indices: Vec<usize> = self.matching(name).map(|sensor| sensor.index).collect();
        indices.sort_unstable();
        indices
    }

    /// Sensors matching `name`, in discovery order.
    pub fn matching<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CalibratedSensor> {
        self.sensors.iter().filter(move |sensor| sensor.has_type(name))
    }

    /// Serializes back to the coefficient file layout, preserving discovery order.
    pub fn to_json(&self) -> Value {
        let mut document = Map::new();
        for sensor in &self.sensors {
            document.insert(
                sensor.index.to_string(),
                json!({
                    "sensor": sensor.sensor_type,
                    "coeffs": sensor.coefficients,
                }),
            );
        }
        Value::Object(document)
    }

    /// Picks the sensors a conversion needs.
    ///
    /// A primary type with no match fails the cast. Optional types listed in `optional`
    /// that are absent only warn, and more than one pressure sensor is reported as
    /// ambiguous and left out. Sensors left uncalibrated at load time are carried into
    /// the warnings.
    pub fn select(&self, optional: &[String]) -> Result<SensorSelection, CalibrationError> {
        for sensor_type in PRIMARY_SENSOR_TYPES {
            if self.matching(sensor_type).next().is_none() {
                return Err(CalibrationError::SensorNotFound {
                    sensor_type: sensor_type.to_string(),
                });
            }
        }

        let mut selection = SensorSelection {
            warnings: self.load_warnings.clone(),
            ..SensorSelection::default()
        };
        for sensor in &self.sensors {
            match sensor.calibration {
                SensorCalibration::Temperature(coeffs) => {
                    selection.temperature.push((sensor.index, coeffs))
                }
                SensorCalibration::Conductivity(coeffs) => {
                    selection.conductivity.push((sensor.index, coeffs))
                }
                SensorCalibration::Oxygen(coeffs)
                    if optional.iter().any(|name| name == OXYGEN_SENSOR) =>
                {
                    selection.oxygen.push((sensor.index, coeffs))
                }
                _ => {}
            }
        }

        let pressure: Vec<(usize, PressureCoefficients)> = self
            .sensors
            .iter()
            .filter_map(|sensor| match sensor.calibration {
                SensorCalibration::Pressure(coeffs) => Some((sensor.index, coeffs)),
                _ => None,
            })
            .collect();
        if pressure.len() == 1 {
            selection.pressure = pressure.first().copied();
        } else {
            let indices: Vec<usize> = pressure.iter().map(|(index, _)| *index).collect();
            warn!(?indices, "multiple pressure sensors; pressure will not be computed");
            selection
                .warnings
                .push(SensorWarning::AmbiguousPressure { indices });
        }

        for sensor_type in optional {
            if self.matching(sensor_type).next().is_none() {
                warn!(sensor_type = %sensor_type, "optional sensor not found");
                selection.warnings.push(SensorWarning::OptionalMissing {
                    sensor_type: sensor_type.clone(),
                });
            } else if sensor_type != OXYGEN_SENSOR {
                debug!(sensor_type = %sensor_type, "optional sensor present but has no equation");
            }
        }

        Ok(selection)
    }
}
