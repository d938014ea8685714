pub mod decoder;
pub mod errors;
pub mod layout;
pub mod model;
pub mod salts;
mod xmlcon;

pub use decoder::{
    decode_field, tokenize, DecodedFrames, FrameDecoder, LineOutcome, RawFrame, RawFrameColumns,
};
pub use errors::{ConfigError, DecodeWarning, SaltParseError};
pub use layout::{DecodeStrategy, FieldRole, FieldSpec, FrameLayout, NMEA_TIME_BASE};
pub use model::{ElementNode, InstrumentConfig, InstrumentFlags, SensorChannel, SensorEntry};
pub use salts::{parse_salt_file, AutosalSample, SaltReading, SaltRow, SaltRun};

#[cfg(test)]
mod tests;
