use serde_json::{json, Map, Value};

use crate::errors::ConfigError;
use crate::model::{
    ElementNode, InstrumentConfig, InstrumentFlags, SensorEntry, MAX_FREQUENCY_CHANNELS,
    MAX_VOLTAGE_CHANNELS,
};

const FREQUENCY_SUPPRESSED: &str = "FrequencyChannelsSuppressed";
const VOLTAGE_SUPPRESSED: &str = "VoltageWordsSuppressed";
const SURFACE_PAR: &str = "SurfaceParVoltageAdded";
const NMEA_POSITION: &str = "NmeaPositionDataAdded";
const NMEA_DEPTH: &str = "NmeaDepthDataAdded";
const NMEA_TIME: &str = "NmeaTimeAdded";
const SCAN_TIME: &str = "ScanTimeAdded";

impl ElementNode {
    /// Reads an XML document (e.g. a Sea-Bird `.XMLCON` file) into an owned tree.
    pub fn parse_xml(text: &str) -> Result<Self, ConfigError> {
        let document = roxmltree::Document::parse(text)?;
        Ok(Self::from_xml_node(document.root_element()))
    }

    fn from_xml_node(node: roxmltree::Node<'_, '_>) -> Self {
        let attributes = node
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect();
        let text = node
            .text()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let children = node
            .children()
            .filter(|child| child.is_element())
            .map(Self::from_xml_node)
            .collect();

        Self {
            tag: node.tag_name().name().to_string(),
            attributes,
            text,
            children,
        }
    }
}

impl InstrumentConfig {
    /// Builds the cast configuration from an instrument metadata tree.
    ///
    /// Channel-suppression and flag fields are read from the first element below the root;
    /// sensors are every `Sensor` element in document order.
    pub fn from_element_tree(root: &ElementNode) -> Result<Self, ConfigError> {
        let instrument = root.children.first().ok_or(ConfigError::MissingInstrument)?;

        let frequency_suppressed = read_count(instrument, FREQUENCY_SUPPRESSED)?;
        let voltage_suppressed = read_count(instrument, VOLTAGE_SUPPRESSED)?;
        if frequency_suppressed > MAX_FREQUENCY_CHANNELS {
            return Err(ConfigError::ChannelCountOutOfRange {
                field: FREQUENCY_SUPPRESSED,
                value: frequency_suppressed,
                max: MAX_FREQUENCY_CHANNELS,
            });
        }
        if voltage_suppressed > MAX_VOLTAGE_CHANNELS {
            return Err(ConfigError::ChannelCountOutOfRange {
                field: VOLTAGE_SUPPRESSED,
                value: voltage_suppressed,
                max: MAX_VOLTAGE_CHANNELS,
            });
        }

        let flags = InstrumentFlags {
            has_surface_par: read_flag(instrument, SURFACE_PAR)?,
            has_nmea_lat_lon: read_flag(instrument, NMEA_POSITION)?,
            has_nmea_depth: read_flag(instrument, NMEA_DEPTH)?,
            has_nmea_time: read_flag(instrument, NMEA_TIME)?,
            has_scan_time: read_flag(instrument, SCAN_TIME)?,
        };

        let sensors = root
            .descendants("Sensor")
            .into_iter()
            .enumerate()
            .map(|(position, sensor)| sensor_entry(position, sensor))
            .collect::<Result<Vec<_>, _>>()?;

        InstrumentConfig::new(
            MAX_FREQUENCY_CHANNELS - frequency_suppressed,
            MAX_VOLTAGE_CHANNELS - voltage_suppressed,
            flags,
            sensors,
        )
    }

    pub fn from_xml_str(text: &str) -> Result<Self, ConfigError> {
        let root = ElementNode::parse_xml(text)?;
        Self::from_element_tree(&root)
    }

    /// Calibration coefficient document keyed by sensor index:
    /// `{"0": {"sensor": "TemperatureSensor", "coeffs": {"G": "...", ...}}, ...}`.
    pub fn coefficient_document(&self) -> Value {
        let mut document = Map::new();
        for sensor in self.sensors() {
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
}

fn sensor_entry(position: usize, sensor: &ElementNode) -> Result<SensorEntry, ConfigError> {
    let index = sensor
        .attribute("index")
        .and_then(|value| value.trim().parse::<usize>().ok())
        .ok_or(ConfigError::MissingSensorIndex { position })?;

    // Unknown tags are kept verbatim; an empty Sensor element has no type at all.
    let (sensor_type, coefficients) = match sensor.children.last() {
        Some(element) => (element.tag.clone(), element.flatten_leaves()),
        None => (String::new(), Default::default()),
    };

    Ok(SensorEntry {
        index,
        sensor_type,
        coefficients,
    })
}

fn field_text<'a>(instrument: &'a ElementNode, field: &'static str) -> Result<&'a str, ConfigError> {
    instrument
        .child(field)
        .and_then(|node| node.text.as_deref())
        .ok_or(ConfigError::MissingField { field })
}

fn read_count(instrument: &ElementNode, field: &'static str) -> Result<u8, ConfigError> {
    let raw = field_text(instrument, field)?;
    raw.parse::<u8>().map_err(|_| ConfigError::InvalidField {
        field,
        value: raw.to_string(),
    })
}

fn read_flag(instrument: &ElementNode, field: &'static str) -> Result<bool, ConfigError> {
    let raw = field_text(instrument, field)?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidField {
            field,
            value: raw.to_string(),
        }),
    }
}
