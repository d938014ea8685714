use ctdcal_core::drift::{correct_salt_run, DriftModel, DriftOutcome, DriftSkip};
use ctdcal_core::flags::FlagLog;
use ctdcal_core::salinity::sp_salinometer;
use ctdcal_parser::parse_salt_file;

const HEADER: &str = "12-3456 operator: JD box: S batch: P165 k15: 0.99986 std dial 408\n";

fn run_from(rows: &str) -> ctdcal_parser::SaltRun {
    parse_salt_file("00101", &format!("{HEADER}{rows}")).expect("salt file")
}

fn bracketed_run() -> ctdcal_parser::SaltRun {
    run_from(
        "001 01 00 24 1.99990 worm 3 10:00:00 10:00:00 3 1.99990 1.99990 1.99990\n\
001 01 01 24 2.03000 1 3 10:04:30 10:05:00 3 2.03000 2.03001 2.02999\n\
001 01 02 24 2.03200 2 3 10:09:30 10:10:00* 2 2.03200 2.03200\n\
001 01 03 24 2.00010 worm 3 10:09:30 10:10:00 3 2.00010 2.00010 2.00010\n",
    )
}

#[test]
fn fitted_line_passes_through_both_standards() {
    let run = bracketed_run();
    let DriftOutcome::Fitted(model) = DriftModel::fit(&run) else {
        panic!("expected a fitted model");
    };

    let residuals: Vec<f64> = run
        .references()
        .map(|reading| model.fitted_ratio(reading.elapsed_seconds) - reading.conductivity_ratio)
        .collect();
    assert_eq!(residuals, vec![0.0, 0.0]);
    assert_eq!(model.pre_ratio, 1.99990);
    assert_eq!(model.post_ratio, 2.00010);
}

#[test]
fn samples_are_shifted_linearly_in_time() {
    let run = bracketed_run();
    let results = correct_salt_run(&run, None).expect("results");

    let DriftOutcome::Fitted(model) = results.outcome else {
        panic!("expected a fitted model");
    };
    assert!((model.rate - 0.0002 / 600.0).abs() < 1e-15);

    assert_eq!(results.samples.len(), 2);
    // ratio + elapsed * rate
    assert_eq!(results.samples[0].corrected_ratio, 2.03010);
    assert_eq!(results.samples[1].corrected_ratio, 2.03220);

    let expected = sp_salinometer(2.03010 / 2.0, 24.0);
    assert!((results.samples[0].salinity - expected).abs() < 1e-12);
}

#[test]
fn rising_standards_raise_a_mid_run_sample() {
    let run = run_from(
        "001 01 00 24 1.99990 worm 3 09:59:30 10:00:00 3 1.99990\n\
001 01 01 24 2.00000 1 3 10:29:30 10:30:00 3 2.00000\n\
001 01 02 24 2.00010 worm 3 10:59:30 11:00:00 3 2.00010\n",
    );
    let results = correct_salt_run(&run, None).expect("results");

    assert_eq!(results.samples[0].reading.elapsed_seconds, 1800.0);
    assert_eq!(results.samples[0].corrected_ratio, 2.00010);
}

#[test]
fn three_standards_skip_correction() {
    let run = run_from(
        "001 01 00 24 1.99990 worm 3 10:00:00 10:00:00 3 1.99990\n\
001 01 01 24 2.03000 1 3 10:04:30 10:05:00 3 2.03000\n\
001 01 02 24 1.99995 worm 3 10:06:00 10:06:30 3 1.99995\n\
001 01 03 24 2.00010 worm 3 10:09:30 10:10:00 3 2.00010\n",
    );

    let results = correct_salt_run(&run, None).expect("results");
    assert_eq!(
        results.outcome,
        DriftOutcome::Skipped(DriftSkip::ReferenceCount(3))
    );
    assert_eq!(results.samples[0].corrected_ratio, 2.03000);
}

#[test]
fn single_standard_skips_correction() {
    let run = run_from(
        "001 01 00 24 1.99990 worm 3 10:00:00 10:00:00 3 1.99990\n\
001 01 01 24 2.03000 1 3 10:04:30 10:05:00 3 2.03000\n",
    );
    assert_eq!(
        DriftModel::fit(&run),
        DriftOutcome::Skipped(DriftSkip::ReferenceCount(1))
    );
}

#[test]
fn standards_at_the_same_time_skip_correction() {
    let run = run_from(
        "001 01 00 24 1.99990 worm 3 10:00:00 10:00:00 3 1.99990\n\
001 01 01 24 2.03000 1 3 10:04:30 10:05:00 3 2.03000\n\
001 01 02 24 2.00010 worm 3 10:00:00 10:00:00 3 2.00010\n",
    );
    assert_eq!(
        DriftModel::fit(&run),
        DriftOutcome::Skipped(DriftSkip::ZeroInterval)
    );
}

#[test]
fn run_across_midnight_uses_wrapped_elapsed_time() {
    let run = run_from(
        "001 01 00 24 1.99990 worm 3 23:54:30 23:55:00 3 1.99990\n\
001 01 01 24 2.03000 1 3 23:59:30 00:00:00 3 2.03000\n\
001 01 02 24 2.00010 worm 3 00:04:30 00:05:00 3 2.00010\n",
    );
    let results = correct_salt_run(&run, None).expect("results");

    assert_eq!(results.samples[0].reading.elapsed_seconds, 300.0);
    assert_eq!(results.samples[0].corrected_ratio, 2.03010);
}

#[test]
fn questionable_samples_reach_the_flag_log() {
    let dir = tempfile::tempdir().unwrap();
    let log = FlagLog::new(dir.path().join("flags_manual_salt.csv"));

    let results = correct_salt_run(&bracketed_run(), Some(&log)).expect("results");
    assert_eq!(results.flagged.len(), 1);

    let content = std::fs::read_to_string(log.path()).unwrap();
    assert_eq!(
        content,
        "00101,2,,3,Auto-flagged by processing function (had * in row)\n"
    );
}

#[test]
fn cast_table_drops_empty_reading_columns() {
    let run = run_from(
        "001 01 00 24 1.99990 worm 3 10:00:00 10:00:00 3 1.99990 1.99990 1.99990\n\
001 01 01 24 2.03000 1 3 10:04:30 10:05:00 2 2.03000 2.03001\n\
002 01 01 24 2.03100 1 3 10:06:30 10:07:00 3 2.03100 2.03101 2.03099\n\
001 01 03 24 2.00010 worm 3 10:09:30 10:10:00 3 2.00010 2.00010 2.00010\n",
    );
    let results = correct_salt_run(&run, None).expect("results");

    assert_eq!(results.casts(), vec![(1, 1), (2, 1)]);

    let all = results.to_dataframe().unwrap();
    assert_eq!(all.height(), 2);
    assert!(all.column("Reading3").is_ok());
    assert_eq!(all.column("Reading3").unwrap().null_count(), 1);

    let first = results.cast_dataframe(1, 1).unwrap();
    assert_eq!(
        first.get_column_names(),
        vec![
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
            "Reading1",
            "Reading2",
            "SALNTY"
        ]
    );
    let second = results.cast_dataframe(2, 1).unwrap();
    assert!(second.column("Reading3").is_ok());
}
