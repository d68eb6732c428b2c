use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use bids2isatab::app::{ConvertOptions, Converter, TracingSink};
use bids2isatab::config::{ConfigLoader, ConfigOverrides};
use bids2isatab::error::ConvertError;
use bids2isatab::output::{JsonOutput, OutputMode, TextOutput};

#[derive(Parser)]
#[command(name = "bids2isatab")]
#[command(about = "Convert a BIDS neuroimaging dataset into ISA-Tab metadata")]
#[command(version, author)]
struct Cli {
    /// Root of the BIDS dataset.
    bids_directory: Utf8PathBuf,

    /// Directory receiving i_investigation.txt, s_study.txt and the assay files.
    output_directory: Utf8PathBuf,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,

    /// Keep parameter columns without an ontology entry.
    #[arg(long)]
    keep_unknown: bool,

    /// Drop `Parameter Value[NAME]`; repeatable or comma-separated.
    #[arg(short = 'd', long = "drop-parameter", value_name = "NAME")]
    drop_parameters: Vec<String>,

    /// JSON configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<String>,

    /// Print the conversion report as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<ConvertError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ConvertError) -> u8 {
    match error {
        ConvertError::InvalidDataset { .. }
        | ConvertError::ConfigRead(_)
        | ConvertError::ConfigParse(_) => 2,
        ConvertError::OutputWrite { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let resolved = ConfigLoader::resolve(
        cli.config.as_deref(),
        ConfigOverrides {
            keep_unknown: cli.keep_unknown,
            drop_parameters: cli.drop_parameters,
        },
    )?;
    if !resolved.filter.keep_unknown && !resolved.filter.drop.is_empty() {
        tracing::warn!("--drop-parameter has no effect without --keep-unknown");
    }

    let converter = Converter::new(ConvertOptions::new(
        cli.bids_directory,
        cli.output_directory,
        resolved,
    ));
    let report = converter.run(&TracingSink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_report(&report).into_diagnostic()?,
    }
    Ok(())
}
