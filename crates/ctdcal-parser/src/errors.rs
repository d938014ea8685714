use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("XML document could not be read: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("instrument element missing from configuration tree")]
    MissingInstrument,

    #[error("required field '{field}' missing from instrument configuration")]
    MissingField { field: &'static str },

    #[error("field '{field}' has invalid value '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("{field} = {value} outside allowed range 0..={max}")]
    ChannelCountOutOfRange {
        field: &'static str,
        value: u8,
        max: u8,
    },

    #[error("sensor element #{position} has no usable index attribute")]
    MissingSensorIndex { position: usize },

    #[error("sensor index {index} appears more than once")]
    DuplicateSensorIndex { index: usize },

    #[error("sensor indices must be contiguous from 0; index {missing} is absent")]
    NonContiguousSensorIndex { missing: usize },
}

/// A raw frame line that did not match the cast's layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeWarning {
    pub source: String,
    pub line_number: usize,
    pub message: String,
}

impl DecodeWarning {
    pub fn new(source: impl Into<String>, line_number: usize, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            line_number,
            message: message.into(),
        }
    }
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: line {} does not match expected format ({})",
            self.source, self.line_number, self.message
        )
    }
}

#[derive(Debug, Error)]
pub enum SaltParseError {
    #[error("salinometer file '{run}' did not contain a header line")]
    MissingHeader { run: String },

    #[error("salinometer file '{run}' line {line_number}: expected at least {expected} fields, found {found}")]
    TooFewFields {
        run: String,
        line_number: usize,
        expected: usize,
        found: usize,
    },

    #[error("salinometer file '{run}' line {line_number}: column '{column}' value '{value}' is invalid")]
    DataRow {
        run: String,
        line_number: usize,
        column: &'static str,
        value: String,
    },

    #[error("salinometer file '{run}' contained no readings")]
    EmptyData { run: String },
}
