use std::fmt;

use crate::model::InstrumentConfig;

/// Seconds between 1970-01-01 and 2000-01-01; NMEA time is stored relative to 2000.
pub const NMEA_TIME_BASE: u64 = 946_684_800;

/// What a fixed-width field of a raw frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Frequency(u8),
    Voltage(u8),
    SurfacePar,
    NmeaLatitude,
    NmeaLongitude,
    NmeaSignStatus,
    NmeaDepth,
    NmeaTime,
    PressureTemperature,
    Status,
    Modulo,
    SystemTime,
}

/// How the hex characters of a field become an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Big-endian unsigned hex.
    PlainHex,
    /// Little-endian 32-bit word, plus a constant offset.
    ByteReversedU32 { offset: u64 },
    /// Leading hex characters are unused; the remainder is big-endian hex.
    SkipPrefix { chars: usize },
}

impl FieldRole {
    pub fn hex_width(&self) -> usize {
        match self {
            FieldRole::Frequency(_) => 6,
            FieldRole::Voltage(_) => 3,
            FieldRole::SurfacePar => 6,
            FieldRole::NmeaLatitude | FieldRole::NmeaLongitude => 6,
            FieldRole::NmeaSignStatus => 2,
            FieldRole::NmeaDepth => 6,
            FieldRole::NmeaTime => 8,
            FieldRole::PressureTemperature => 3,
            FieldRole::Status => 1,
            FieldRole::Modulo => 2,
            FieldRole::SystemTime => 8,
        }
    }

    pub fn strategy(&self) -> DecodeStrategy {
        match self {
            FieldRole::SystemTime => DecodeStrategy::ByteReversedU32 { offset: 0 },
            FieldRole::NmeaTime => DecodeStrategy::ByteReversedU32 {
                offset: NMEA_TIME_BASE,
            },
            // first byte and a half of the surface PAR word are unused
            FieldRole::SurfacePar => DecodeStrategy::SkipPrefix { chars: 3 },
            _ => DecodeStrategy::PlainHex,
        }
    }

    pub fn column_name(&self) -> String {
        match self {
            FieldRole::Frequency(idx) => format!("freq{idx}"),
            FieldRole::Voltage(idx) => format!("v{idx}"),
            FieldRole::SurfacePar => "spar".to_string(),
            FieldRole::NmeaLatitude => "nmea_lat".to_string(),
            FieldRole::NmeaLongitude => "nmea_lon".to_string(),
            FieldRole::NmeaSignStatus => "nmea_signs_status".to_string(),
            FieldRole::NmeaDepth => "nmea_depth".to_string(),
            FieldRole::NmeaTime => "nmea_time".to_string(),
            FieldRole::PressureTemperature => "p_temp".to_string(),
            FieldRole::Status => "status".to_string(),
            FieldRole::Modulo => "modulo".to_string(),
            FieldRole::SystemTime => "systime".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub hex_width: usize,
    pub role: FieldRole,
}

impl FieldSpec {
    fn from_role(role: FieldRole) -> Self {
        Self {
            name: role.column_name(),
            hex_width: role.hex_width(),
            role,
        }
    }
}

/// Ordered field layout of one raw frame line for a cast.
///
/// The precedence order is fixed: frequency channels, voltage channels, surface PAR,
/// NMEA lat/lon/sign-status, NMEA depth, NMEA time, pressure temperature, status, modulo,
/// system time. Every field after a misplaced one would be decoded from the wrong
/// characters, so the order must never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    fields: Vec<FieldSpec>,
    total_width: usize,
}

impl FrameLayout {
    pub fn from_config(config: &InstrumentConfig) -> Self {
        let flags = config.flags();
        let mut roles = Vec::new();

        roles.extend((0..config.frequency_channel_count()).map(FieldRole::Frequency));
        roles.extend((0..config.voltage_channel_count()).map(FieldRole::Voltage));
        if flags.has_surface_par {
            roles.push(FieldRole::SurfacePar);
        }
        if flags.has_nmea_lat_lon {
            roles.extend([
                FieldRole::NmeaLatitude,
                FieldRole::NmeaLongitude,
                FieldRole::NmeaSignStatus,
            ]);
        }
        if flags.has_nmea_depth {
            roles.push(FieldRole::NmeaDepth);
        }
        if flags.has_nmea_time {
            roles.push(FieldRole::NmeaTime);
        }
        roles.extend([
            FieldRole::PressureTemperature,
            FieldRole::Status,
            FieldRole::Modulo,
        ]);
        if flags.has_scan_time {
            roles.push(FieldRole::SystemTime);
        }

        Self::from_roles(roles)
    }

    pub fn from_roles(roles: impl IntoIterator<Item = FieldRole>) -> Self {
        let fields: Vec<FieldSpec> = roles.into_iter().map(FieldSpec::from_role).collect();
        let total_width = fields.iter().map(|field| field.hex_width).sum();
        Self {
            fields,
            total_width,
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn total_width(&self) -> usize {
        self.total_width
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn position_of(&self, role: FieldRole) -> Option<usize> {
        self.fields.iter().position(|field| field.role == role)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }
}

impl fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{}[{}]", field.name, field.hex_width))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstrumentFlags;

    fn config(freq_suppressed: u8, volt_suppressed: u8, flags: InstrumentFlags) -> InstrumentConfig {
        InstrumentConfig::new(5 - freq_suppressed, 8 - volt_suppressed, flags, Vec::new())
            .expect("valid config")
    }

    #[test]
    fn minimal_layout_has_mandatory_tail() {
        let layout = FrameLayout::from_config(&config(5, 8, InstrumentFlags::default()));
        assert_eq!(layout.column_names(), vec!["p_temp", "status", "modulo"]);
        assert_eq!(layout.total_width(), 6);
    }

    #[test]
    fn all_options_follow_fixed_precedence() {
        let flags = InstrumentFlags {
            has_surface_par: true,
            has_nmea_lat_lon: true,
            has_nmea_depth: true,
            has_nmea_time: true,
            has_scan_time: true,
        };
        let layout = FrameLayout::from_config(&config(3, 6, flags));

        assert_eq!(
            layout.column_names(),
            vec![
                "freq0",
                "freq1",
                "v0",
                "v1",
                "spar",
                "nmea_lat",
                "nmea_lon",
                "nmea_signs_status",
                "nmea_depth",
                "nmea_time",
                "p_temp",
                "status",
                "modulo",
                "systime",
            ]
        );
        // 2*6 + 2*3 + 6 + 6 + 6 + 2 + 6 + 8 + 3 + 1 + 2 + 8
        assert_eq!(layout.total_width(), 66);
    }

    #[test]
    fn full_sbe911_layout_width() {
        let flags = InstrumentFlags {
            has_scan_time: true,
            ..InstrumentFlags::default()
        };
        let layout = FrameLayout::from_config(&config(0, 0, flags));
        assert_eq!(layout.len(), 5 + 8 + 4);
        assert_eq!(layout.total_width(), 30 + 24 + 3 + 1 + 2 + 8);
        assert_eq!(layout.position("systime"), Some(16));
    }
}
