use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use ctdcal_core::pipelines::{self, BatchSummary, CastReport};
use ctdcal_core::settings::Settings;
use ctdcal_parser::InstrumentConfig;
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const SETTINGS_ENV: &str = "CTDCAL_SETTINGS";
const DEFAULT_SETTINGS_FILE: &str = "ctdcal.toml";

#[derive(Parser, Debug)]
#[command(author, version, about = "CTD cast conversion and bottle salinity processing", long_about = None)]
struct Cli {
    /// Settings file (falls back to $CTDCAL_SETTINGS, then ./ctdcal.toml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the parsed instrument configuration and coefficient document of an XMLCON file
    Xmlcon(XmlconArgs),
    /// Convert raw hex casts into physical units
    Convert(ConvertArgs),
    /// Drift-correct salinometer runs and export bottle salinities
    Salts,
    /// Convert every cast, then process every salt run
    All,
}

#[derive(Args, Debug)]
struct XmlconArgs {
    file: PathBuf,
}

#[derive(Args, Debug, Default)]
struct ConvertArgs {
    /// Convert a single cast instead of the whole raw directory
    #[arg(long)]
    cast: Option<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Xmlcon(args) => print_xmlcon(&args.file),
        Command::Convert(args) => {
            let settings = load_settings(cli.settings.as_deref())?;
            match args.cast {
                Some(cast_id) => {
                    let report = pipelines::process_cast(&settings, &cast_id)?;
                    print_cast_report(&report);
                }
                None => {
                    let summary = pipelines::process_all_casts(&settings)?;
                    print_summary("casts", &summary);
                }
            }
            Ok(())
        }
        Command::Salts => {
            let settings = load_settings(cli.settings.as_deref())?;
            let summary = pipelines::process_all_salts(&settings)?;
            print_summary("salt runs", &summary);
            Ok(())
        }
        Command::All => {
            let settings = load_settings(cli.settings.as_deref())?;
            let casts = pipelines::process_all_casts(&settings)?;
            print_summary("casts", &casts);
            let salts = pipelines::process_all_salts(&settings)?;
            print_summary("salt runs", &salts);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::var_os(SETTINGS_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                let local = PathBuf::from(DEFAULT_SETTINGS_FILE);
                local.exists().then_some(local)
            }),
    };

    match path {
        Some(path) => {
            let settings = Settings::load(&path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?;
            info!(path = %path.display(), "loaded settings");
            Ok(settings)
        }
        None => {
            debug!("no settings file found; using defaults");
            Ok(Settings::default())
        }
    }
}

fn print_xmlcon(path: &Path) -> Result<()> {
    let xml = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = InstrumentConfig::from_xml_str(&xml)
        .with_context(|| format!("invalid instrument configuration in {}", path.display()))?;

    let document = json!({
        "config": config,
        "coefficients": config.coefficient_document(),
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

fn print_cast_report(report: &CastReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["cast", "rows", "skipped lines", "output"]);
    table.add_row(vec![
        report.cast_id.clone(),
        report.rows.to_string(),
        report.decode_warnings.to_string(),
        report.output.display().to_string(),
    ]);
    println!("{table}");

    for warning in &report.sensor_warnings {
        warn!(cast = %report.cast_id, "{warning}");
    }
}

fn print_summary(label: &str, summary: &BatchSummary) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["id", "status", "detail"]);

    let groups = [
        ("processed", &summary.processed),
        ("skipped", &summary.skipped),
        ("failed", &summary.failed),
    ];
    for (status, items) in groups {
        for item in items {
            table.add_row(vec![item.id.as_str(), status, item.detail.as_str()]);
        }
    }

    println!("{table}");
    info!(
        label,
        processed = summary.processed.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        total = summary.total(),
        "batch finished"
    );
}
