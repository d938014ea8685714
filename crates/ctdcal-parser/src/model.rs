use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const MAX_FREQUENCY_CHANNELS: u8 = 5;
pub const MAX_VOLTAGE_CHANNELS: u8 = 8;

/// Owned element tree handed to [`InstrumentConfig::from_element_tree`].
///
/// Attributes are kept; text is trimmed and `None` when the element holds only whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementNode {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
    pub children: Vec<ElementNode>,
}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: ElementNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// First direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&ElementNode> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// Every descendant (depth-first, document order) with the given tag.
    pub fn descendants(&self, tag: &str) -> Vec<&ElementNode> {
        let mut found = Vec::new();
        self.collect_descendants(tag, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, tag: &str, found: &mut Vec<&'a ElementNode>) {
        for child in &self.children {
            if child.tag == tag {
                found.push(child);
            }
            child.collect_descendants(tag, found);
        }
    }

    /// Leaf descendants flattened to `tag -> text`; later duplicates win.
    pub fn flatten_leaves(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();
        self.flatten_into(&mut flat);
        flat
    }

    fn flatten_into(&self, flat: &mut BTreeMap<String, String>) {
        for child in &self.children {
            if child.is_leaf() {
                flat.insert(child.tag.clone(), child.text.clone().unwrap_or_default());
            } else {
                child.flatten_into(flat);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentFlags {
    pub has_surface_par: bool,
    pub has_nmea_lat_lon: bool,
    pub has_nmea_depth: bool,
    pub has_nmea_time: bool,
    pub has_scan_time: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEntry {
    pub index: usize,
    pub sensor_type: String,
    pub coefficients: BTreeMap<String, String>,
}

/// Per-cast instrument description. Constructed once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    frequency_channel_count: u8,
    voltage_channel_count: u8,
    flags: InstrumentFlags,
    sensors: Vec<SensorEntry>,
}

impl InstrumentConfig {
    /// Validates channel counts and sensor indices (unique, contiguous from 0).
    pub fn new(
        frequency_channel_count: u8,
        voltage_channel_count: u8,
        flags: InstrumentFlags,
        sensors: Vec<SensorEntry>,
    ) -> Result<Self, ConfigError> {
        if frequency_channel_count > MAX_FREQUENCY_CHANNELS {
            return Err(ConfigError::ChannelCountOutOfRange {
                field: "frequency_channel_count",
                value: frequency_channel_count,
                max: MAX_FREQUENCY_CHANNELS,
            });
        }
        if voltage_channel_count > MAX_VOLTAGE_CHANNELS {
            return Err(ConfigError::ChannelCountOutOfRange {
                field: "voltage_channel_count",
                value: voltage_channel_count,
                max: MAX_VOLTAGE_CHANNELS,
            });
        }

        let mut seen = BTreeSet::new();
        for sensor in &sensors {
            if !seen.insert(sensor.index) {
                return Err(ConfigError::DuplicateSensorIndex {
                    index: sensor.index,
                });
            }
        }
        if let Some(missing) = (0..sensors.len()).find(|idx| !seen.contains(idx)) {
            return Err(ConfigError::NonContiguousSensorIndex { missing });
        }

        Ok(Self {
            frequency_channel_count,
            voltage_channel_count,
            flags,
            sensors,
        })
    }

    pub fn frequency_channel_count(&self) -> u8 {
        self.frequency_channel_count
    }

    pub fn voltage_channel_count(&self) -> u8 {
        self.voltage_channel_count
    }

    pub fn flags(&self) -> InstrumentFlags {
        self.flags
    }

    pub fn sensors(&self) -> &[SensorEntry] {
        &self.sensors
    }

    pub fn sensor(&self, index: usize) -> Option<&SensorEntry> {
        self.sensors.iter().find(|sensor| sensor.index == index)
    }

    /// Channel a sensor index is wired to: frequency channels first, then voltage words.
    pub fn channel_for_sensor(&self, index: usize) -> Option<SensorChannel> {
        let freq = usize::from(self.frequency_channel_count);
        let volt = usize::from(self.voltage_channel_count);
        if index < freq {
            Some(SensorChannel::Frequency(index))
        } else if index < freq + volt {
            Some(SensorChannel::Voltage(index - freq))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorChannel {
    Frequency(usize),
    Voltage(usize),
}
