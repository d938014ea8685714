use std::fs;
use std::path::PathBuf;

use crate::errors::ConfigError;
use crate::layout::FrameLayout;
use crate::model::{ElementNode, InstrumentConfig, SensorChannel};
use crate::salts::{parse_salt_file, AutosalSample, SaltRow};
use crate::FrameDecoder;

fn fixture(path: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let full_path = base.join("tests/data").join(path);
    fs::read_to_string(&full_path)
        .unwrap_or_else(|err| panic!("failed to read fixture {}: {}", full_path.display(), err))
}

fn fixture_config() -> InstrumentConfig {
    InstrumentConfig::from_xml_str(&fixture("00101.XMLCON")).expect("XMLCON parse failed")
}

#[test]
fn xmlcon_fixture_describes_four_sensors() {
    let config = fixture_config();

    assert_eq!(config.frequency_channel_count(), 3);
    assert_eq!(config.voltage_channel_count(), 1);
    let flags = config.flags();
    assert!(flags.has_nmea_lat_lon);
    assert!(flags.has_scan_time);
    assert!(!flags.has_surface_par);
    assert!(!flags.has_nmea_depth);
    assert!(!flags.has_nmea_time);

    let types: Vec<&str> = config
        .sensors()
        .iter()
        .map(|sensor| sensor.sensor_type.as_str())
        .collect();
    assert_eq!(
        types,
        vec![
            "TemperatureSensor",
            "ConductivitySensor",
            "PressureSensor",
            "OxygenSensor"
        ]
    );

    assert_eq!(config.channel_for_sensor(2), Some(SensorChannel::Frequency(2)));
    assert_eq!(config.channel_for_sensor(3), Some(SensorChannel::Voltage(0)));
    assert_eq!(config.channel_for_sensor(4), None);
}

#[test]
fn nested_coefficient_blocks_are_flattened() {
    let config = fixture_config();

    let conductivity = config.sensor(1).expect("conductivity sensor");
    assert_eq!(conductivity.coefficients["G"], "-1.00155970e+001");
    assert_eq!(conductivity.coefficients["CTcor"], "3.2500e-006");
    assert_eq!(conductivity.coefficients["SerialNumber"], "04C2887");
    // equation="0" block is overridden where the later block repeats a tag
    assert_eq!(conductivity.coefficients["CPcor"], "-9.57000000e-008");
    assert_eq!(conductivity.coefficients["A"], "0.00000000e+000");

    let oxygen = config.sensor(3).expect("oxygen sensor");
    assert_eq!(oxygen.coefficients["offset"], "-0.5028");
    assert_eq!(oxygen.coefficients["H2"], "5.0000e+003");
}

#[test]
fn coefficient_document_is_keyed_by_index() {
    let document = fixture_config().coefficient_document();

    assert_eq!(document["0"]["sensor"], "TemperatureSensor");
    assert_eq!(document["2"]["coeffs"]["AD590M"], "1.284000e-002");
    assert!(document.get("4").is_none());
}

#[test]
fn layout_follows_fixture_configuration() {
    let layout = FrameLayout::from_config(&fixture_config());

    assert_eq!(
        layout.column_names(),
        vec![
            "freq0",
            "freq1",
            "freq2",
            "v0",
            "nmea_lat",
            "nmea_lon",
            "nmea_signs_status",
            "p_temp",
            "status",
            "modulo",
            "systime",
        ]
    );
    assert_eq!(layout.total_width(), 49);
}

#[test]
fn hex_fixture_decodes_frames_and_reports_corrupt_line() {
    let layout = FrameLayout::from_config(&fixture_config());
    let decoder = FrameDecoder::new(&layout, "00101.hex");
    let decoded = decoder.decode_str(&fixture("00101.hex"));

    assert_eq!(decoded.line_count, 9);
    assert_eq!(decoded.header_lines, 3);
    assert_eq!(decoded.row_count(), 5);
    assert_eq!(decoded.warnings.len(), 1);
    assert_eq!(decoded.warnings[0].line_number, 7);
    assert_eq!(decoded.warnings[0].source, "00101.hex");

    let frames = &decoded.frames;
    assert_eq!(frames.column("freq0").unwrap()[0], 4500 * 256);
    assert_eq!(frames.column("freq1").unwrap()[4], 5504 * 256 + 192);
    assert_eq!(frames.column("v0").unwrap(), &[2000, 2001, 2002, 2003, 2004]);
    assert_eq!(frames.column("nmea_lat").unwrap()[0], 1_625_000);
    assert_eq!(frames.column("nmea_lon").unwrap()[0], 5_862_500);
    assert_eq!(frames.column("nmea_signs_status").unwrap()[0], 0x41);
    assert_eq!(frames.column("p_temp").unwrap()[3], 2048);
    assert_eq!(frames.column("modulo").unwrap(), &[0, 1, 2, 3, 4]);
    assert_eq!(
        frames.column("systime").unwrap(),
        &[1_700_000_000, 1_700_000_001, 1_700_000_002, 1_700_000_003, 1_700_000_004]
    );
}

#[test]
fn decoded_frames_become_integer_dataframe() {
    let layout = FrameLayout::from_config(&fixture_config());
    let decoded = FrameDecoder::new(&layout, "00101.hex").decode_str(&fixture("00101.hex"));
    let df = decoded.frames.to_dataframe().expect("dataframe");

    assert_eq!(df.height(), 5);
    assert_eq!(df.width(), layout.len());
    let freq2 = df.column("freq2").unwrap().u64().unwrap();
    assert_eq!(freq2.get(1), Some(33510 * 256));
}

#[test]
fn malformed_xml_is_reported() {
    let err = InstrumentConfig::from_xml_str("<SBE_InstrumentConfiguration><Instrument>")
        .unwrap_err();
    assert!(matches!(err, ConfigError::Xml(_)));
}

#[test]
fn empty_root_has_no_instrument() {
    let root = ElementNode::new("SBE_InstrumentConfiguration");
    let err = InstrumentConfig::from_element_tree(&root).unwrap_err();
    assert!(matches!(err, ConfigError::MissingInstrument));
}

#[test]
fn salt_fixture_is_classified() {
    let run = parse_salt_file("00101", &fixture("00101")).expect("salt parse failed");

    assert_eq!(run.rows.len(), 7);
    assert_eq!(run.references().count(), 2);
    assert_eq!(run.samples().count(), 4);
    assert_eq!(run.excluded_count(), 1);
    assert!(matches!(run.rows[3], SaltRow::Excluded { line_number: 5, .. }));

    let first = run.references().next().unwrap();
    assert_eq!(first.autosal_sample, AutosalSample::Reference);
    assert_eq!(first.elapsed_seconds, 0.0);
    assert_eq!(first.conductivity_ratio, 1.99990);

    let last = run.references().last().unwrap();
    assert_eq!(last.elapsed_seconds, 606.0);

    let flagged: Vec<_> = run.questionable_samples().collect();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].sample_number, 4);
    assert_eq!(flagged[0].elapsed_seconds, 386.0);
    assert_eq!(flagged[0].readings, vec![2.02987, 2.02989]);
}
