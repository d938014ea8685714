use std::io::{self, BufRead};

use polars::prelude::*;

use crate::errors::DecodeWarning;
use crate::layout::{DecodeStrategy, FieldSpec, FrameLayout};

const HEADER_MARKER: char = '*';

/// Decoded integer values of one frame line, aligned with the layout's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    values: Vec<u64>,
}

impl RawFrame {
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn get(&self, layout: &FrameLayout, name: &str) -> Option<u64> {
        layout
            .position(name)
            .and_then(|idx| self.values.get(idx).copied())
    }

    pub fn iter<'a>(&'a self, layout: &'a FrameLayout) -> impl Iterator<Item = (&'a str, u64)> {
        layout
            .fields()
            .iter()
            .zip(self.values.iter())
            .map(|(field, value)| (field.name.as_str(), *value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Frame(RawFrame),
    Header,
    Rejected(String),
}

/// Splits a line into the layout's fixed-width hex tokens.
///
/// A single trailing `\n` or `\r\n` is tolerated. Anything else that is not an
/// upper-case hex digit, or a length different from the layout width, rejects the line.
pub fn tokenize<'l>(layout: &FrameLayout, line: &'l str) -> Result<Vec<&'l str>, String> {
    let body = line
        .strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line);

    if body.len() != layout.total_width() {
        return Err(format!(
            "expected {} hex characters, found {}",
            layout.total_width(),
            body.len()
        ));
    }
    if let Some(bad) = body
        .chars()
        .find(|ch| !matches!(ch, '0'..='9' | 'A'..='F'))
    {
        return Err(format!("unexpected character {bad:?}"));
    }

    let mut tokens = Vec::with_capacity(layout.len());
    let mut offset = 0;
    for field in layout.fields() {
        tokens.push(&body[offset..offset + field.hex_width]);
        offset += field.hex_width;
    }
    Ok(tokens)
}

/// Interprets one field token according to its role's strategy.
pub fn decode_field(field: &FieldSpec, token: &str) -> Result<u64, String> {
    match field.role.strategy() {
        DecodeStrategy::PlainHex => parse_hex(token),
        DecodeStrategy::SkipPrefix { chars } => {
            let tail = token.get(chars..).unwrap_or("");
            parse_hex(tail)
        }
        DecodeStrategy::ByteReversedU32 { offset } => {
            let bytes = hex_bytes::<4>(token)?;
            Ok(u64::from(u32::from_le_bytes(bytes)) + offset)
        }
    }
}

fn parse_hex(token: &str) -> Result<u64, String> {
    if token.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(token, 16).map_err(|err| format!("invalid hex '{token}': {err}"))
}

fn hex_bytes<const N: usize>(token: &str) -> Result<[u8; N], String> {
    if token.len() != N * 2 {
        return Err(format!("expected {} hex characters, found {}", N * 2, token.len()));
    }
    let mut bytes = [0u8; N];
    for (idx, byte) in bytes.iter_mut().enumerate() {
        let pair = &token[idx * 2..idx * 2 + 2];
        *byte = u8::from_str_radix(pair, 16)
            .map_err(|err| format!("invalid hex byte '{pair}': {err}"))?;
    }
    Ok(bytes)
}

/// Column-wise accumulation of decoded frames, one vector per layout field.
#[derive(Debug, Clone)]
pub struct RawFrameColumns {
    names: Vec<String>,
    columns: Vec<Vec<u64>>,
}

impl RawFrameColumns {
    fn new(layout: &FrameLayout) -> Self {
        Self {
            names: layout.fields().iter().map(|f| f.name.clone()).collect(),
            columns: vec![Vec::new(); layout.len()],
        }
    }

    fn push(&mut self, frame: RawFrame) {
        for (column, value) in self.columns.iter_mut().zip(frame.values) {
            column.push(value);
        }
    }

    pub fn height(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&[u64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = self
            .names
            .iter()
            .zip(self.columns.iter())
            .map(|(name, values)| Series::new(name.as_str().into(), values.as_slice()).into())
            .collect();
        DataFrame::new(columns)
    }
}

#[derive(Debug, Clone)]
pub struct DecodedFrames {
    pub frames: RawFrameColumns,
    pub warnings: Vec<DecodeWarning>,
    pub line_count: usize,
    pub header_lines: usize,
}

impl DecodedFrames {
    fn empty(layout: &FrameLayout) -> Self {
        Self {
            frames: RawFrameColumns::new(layout),
            warnings: Vec::new(),
            line_count: 0,
            header_lines: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.frames.height()
    }
}

/// Applies a cast's frame layout to raw hex lines.
pub struct FrameDecoder<'a> {
    layout: &'a FrameLayout,
    source: String,
}

impl<'a> FrameDecoder<'a> {
    pub fn new(layout: &'a FrameLayout, source: impl Into<String>) -> Self {
        Self {
            layout,
            source: source.into(),
        }
    }

    pub fn layout(&self) -> &FrameLayout {
        self.layout
    }

    pub fn decode_line(&self, line: &str) -> LineOutcome {
        match tokenize(self.layout, line) {
            Ok(tokens) => {
                let mut values = Vec::with_capacity(tokens.len());
                for (field, token) in self.layout.fields().iter().zip(tokens) {
                    match decode_field(field, token) {
                        Ok(value) => values.push(value),
                        Err(message) => {
                            return LineOutcome::Rejected(format!("{}: {message}", field.name))
                        }
                    }
                }
                LineOutcome::Frame(RawFrame { values })
            }
            Err(_) if line.starts_with(HEADER_MARKER) => LineOutcome::Header,
            Err(message) => LineOutcome::Rejected(message),
        }
    }

    /// Decodes every line of `reader`, keeping only the current line in memory while matching.
    ///
    /// A line that is not valid UTF-8 is rejected like any other non-matching line; only a
    /// failing reader aborts the decode.
    pub fn decode_reader<R: BufRead>(&self, mut reader: R) -> io::Result<DecodedFrames> {
        let mut decoded = DecodedFrames::empty(self.layout);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            if reader.read_until(b'\n', &mut buffer)? == 0 {
                break;
            }
            let outcome = match std::str::from_utf8(&buffer) {
                Ok(line) => self.decode_line(line),
                Err(err) => LineOutcome::Rejected(format!("line is not valid UTF-8: {err}")),
            };
            self.record(&mut decoded, outcome);
        }

        Ok(decoded)
    }

    pub fn decode_str(&self, content: &str) -> DecodedFrames {
        let mut decoded = DecodedFrames::empty(self.layout);
        for line in content.split_inclusive('\n') {
            let outcome = self.decode_line(line);
            self.record(&mut decoded, outcome);
        }
        decoded
    }

    fn record(&self, decoded: &mut DecodedFrames, outcome: LineOutcome) {
        decoded.line_count += 1;
        match outcome {
            LineOutcome::Frame(frame) => decoded.frames.push(frame),
            LineOutcome::Header => decoded.header_lines += 1,
            LineOutcome::Rejected(message) => decoded.warnings.push(DecodeWarning::new(
                &self.source,
                decoded.line_count,
                message,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::FieldRole;
    use crate::model::{InstrumentConfig, InstrumentFlags};

    /// Writes `value` into a field the way the instrument stores it.
    fn encode_field(field: &FieldSpec, value: u64) -> String {
        match field.role.strategy() {
            DecodeStrategy::PlainHex => format!("{value:0width$X}", width = field.hex_width),
            DecodeStrategy::SkipPrefix { chars } => format!(
                "{}{value:0width$X}",
                "F".repeat(chars),
                width = field.hex_width - chars
            ),
            DecodeStrategy::ByteReversedU32 { offset } => {
                let word = u32::try_from(value - offset).unwrap();
                word.to_le_bytes()
                    .iter()
                    .map(|byte| format!("{byte:02X}"))
                    .collect()
            }
        }
    }

    fn sample_value(field: &FieldSpec, seed: u64, position: u64) -> u64 {
        let mix = seed
            .wrapping_mul(2_654_435_761)
            .wrapping_add(position.wrapping_mul(40_503))
            .wrapping_add(7);
        match field.role.strategy() {
            DecodeStrategy::PlainHex => mix % (1u64 << (4 * field.hex_width)),
            DecodeStrategy::SkipPrefix { chars } => mix % (1u64 << (4 * (field.hex_width - chars))),
            DecodeStrategy::ByteReversedU32 { offset } => offset + mix % (1u64 << 32),
        }
    }

    #[test]
    fn byte_reversed_system_time() {
        let layout = FrameLayout::from_roles([FieldRole::SystemTime]);
        let value = decode_field(&layout.fields()[0], "00000001").unwrap();
        assert_eq!(value, 16_777_216);
    }

    #[test]
    fn nmea_time_adds_epoch_offset() {
        let layout = FrameLayout::from_roles([FieldRole::NmeaTime]);
        let value = decode_field(&layout.fields()[0], "01000000").unwrap();
        assert_eq!(value, 946_684_801);
    }

    #[test]
    fn surface_par_drops_unused_prefix() {
        let layout = FrameLayout::from_roles([FieldRole::SurfacePar]);
        let value = decode_field(&layout.fields()[0], "FFF123").unwrap();
        assert_eq!(value, 0x123);
    }

    #[test]
    fn tokenizer_accepts_crlf_and_rejects_lowercase() {
        let layout = FrameLayout::from_roles([FieldRole::Voltage(0), FieldRole::Status]);
        assert_eq!(tokenize(&layout, "ABC1\r\n").unwrap(), vec!["ABC", "1"]);
        assert_eq!(tokenize(&layout, "ABC1").unwrap(), vec!["ABC", "1"]);
        assert!(tokenize(&layout, "abc1\n").is_err());
        assert!(tokenize(&layout, "ABC12\n").is_err());
    }

    #[test]
    fn header_lines_are_skipped_silently() {
        let layout = FrameLayout::from_roles([FieldRole::Modulo]);
        let decoder = FrameDecoder::new(&layout, "test.hex");
        assert_eq!(decoder.decode_line("* Sea-Bird SBE 9 Raw Data File:"), LineOutcome::Header);
        assert_eq!(
            decoder.decode_line("7F\n"),
            LineOutcome::Frame(RawFrame { values: vec![0x7F] })
        );
        assert!(matches!(decoder.decode_line("ZZ\n"), LineOutcome::Rejected(_)));
    }

    #[test]
    fn invalid_utf8_line_is_rejected_and_decoding_continues() {
        let layout = FrameLayout::from_roles([FieldRole::Modulo]);
        let decoder = FrameDecoder::new(&layout, "test.hex");

        let decoded = decoder
            .decode_reader(&b"7F\n\xff\xfe\n01\n"[..])
            .expect("in-memory reader");

        assert_eq!(decoded.line_count, 3);
        assert_eq!(decoded.row_count(), 2);
        assert_eq!(decoded.frames.column("modulo"), Some(&[0x7F, 0x01][..]));
        assert_eq!(decoded.warnings.len(), 1);
        assert_eq!(decoded.warnings[0].line_number, 2);
    }

    #[test]
    fn decode_str_matches_decode_reader() {
        let layout = FrameLayout::from_roles([FieldRole::Modulo]);
        let decoder = FrameDecoder::new(&layout, "test.hex");
        let content = "* header\r\n7F\r\nzz\r\n01";

        let from_str = decoder.decode_str(content);
        let from_reader = decoder.decode_reader(content.as_bytes()).expect("reader");
        assert_eq!(from_str.line_count, 4);
        assert_eq!(from_str.header_lines, 1);
        assert_eq!(from_str.warnings, from_reader.warnings);
        assert_eq!(from_str.frames.column("modulo"), Some(&[0x7F, 0x01][..]));
    }

    #[test]
    fn lines_built_to_the_layout_decode_to_their_values() {
        let all = InstrumentFlags {
            has_surface_par: true,
            has_nmea_lat_lon: true,
            has_nmea_depth: true,
            has_nmea_time: true,
            has_scan_time: true,
        };
        let cases = [
            (5, 8, all),
            (0, 0, InstrumentFlags::default()),
            (
                3,
                1,
                InstrumentFlags {
                    has_nmea_lat_lon: true,
                    has_scan_time: true,
                    ..InstrumentFlags::default()
                },
            ),
            (
                1,
                7,
                InstrumentFlags {
                    has_surface_par: true,
                    has_nmea_time: true,
                    ..InstrumentFlags::default()
                },
            ),
            (
                2,
                0,
                InstrumentFlags {
                    has_nmea_depth: true,
                    ..InstrumentFlags::default()
                },
            ),
        ];

        for (freq, volt, flags) in cases {
            let config = InstrumentConfig::new(freq, volt, flags, Vec::new()).unwrap();
            let layout = FrameLayout::from_config(&config);
            let decoder = FrameDecoder::new(&layout, "synthetic.hex");

            for seed in 0..4u64 {
                let expected: Vec<u64> = layout
                    .fields()
                    .iter()
                    .enumerate()
                    .map(|(pos, field)| sample_value(field, seed, pos as u64))
                    .collect();
                let line: String = layout
                    .fields()
                    .iter()
                    .zip(&expected)
                    .map(|(field, value)| encode_field(field, *value))
                    .collect();
                assert_eq!(line.len(), layout.total_width());

                assert_eq!(
                    decoder.decode_line(&format!("{line}\r\n")),
                    LineOutcome::Frame(RawFrame { values: expected }),
                    "layout {layout} seed {seed}"
                );
            }
        }
    }
}
