use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use histo_dicom_uploader::app::{App, ConvertResult, TracingSink};
use histo_dicom_uploader::config::{ConfigLoader, ConfigOverrides};
use histo_dicom_uploader::error::UploaderError;
use histo_dicom_uploader::pacs::OrthancHttpClient;
use histo_dicom_uploader::upload::{FileOutcome, UploadReport};

#[derive(Parser)]
#[command(name = "histo-upload")]
#[command(about = "Convert histology JPEGs to DICOM and upload the missing ones to a PACS")]
#[command(version, author)]
struct Cli {
    /// JSON config file; every field is optional
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Print the run report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    #[command(about = "Build DICOM files, then upload the ones the PACS lacks (default)")]
    Run,
    #[command(about = "Only build DICOM files from the metadata and images")]
    Convert,
    #[command(about = "Only upload already built DICOM files")]
    Upload,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        if let Some(err) = report.downcast_ref::<UploaderError>() {
            if err.is_missing_input() {
                tracing::warn!("{err}");
            } else {
                tracing::error!("{err}");
            }
            eprintln!("{report:?}");
            return ExitCode::from(map_exit_code(err));
        }
        eprintln!("{report:?}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &UploaderError) -> u8 {
    match error {
        UploaderError::MetadataNotFound(_) | UploaderError::ImageNotFound(_) => 2,
        UploaderError::PacsHttp(_) | UploaderError::PacsStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        data_dir: cli.data_dir.map(Utf8PathBuf::from),
        server_url: cli.server_url,
    };
    let config_path = cli.config.map(Utf8PathBuf::from);
    let settings = ConfigLoader::resolve(config_path.as_deref(), overrides)?;

    init_tracing(&settings.log_file)?;

    let pacs = OrthancHttpClient::new(&settings)?;
    let app = App::new(settings, pacs);
    let sink = TracingSink;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let result = app.run(&sink)?;
            if cli.json {
                print_json(&result)?;
            } else {
                print_convert_summary(&result.convert);
                print_upload_summary(&result.upload);
            }
        }
        Command::Convert => {
            let result = app.convert(&sink)?;
            if cli.json {
                print_json(&result)?;
            } else {
                print_convert_summary(&result);
            }
        }
        Command::Upload => {
            let report = app.upload(&sink)?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_upload_summary(&report);
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> miette::Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

/// INFO and above to stdout, WARN and above also appended to the log file.
fn init_tracing(log_file: &Utf8Path) -> miette::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file.as_std_path())
        .into_diagnostic()?;

    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout)
        .with_filter(stdout_filter);
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn print_convert_summary(result: &ConvertResult) {
    let built = result
        .items
        .iter()
        .filter(|item| item.action == "built")
        .count();
    println!(
        "DICOM files: {} total, {} built, {} up to date",
        result.items.len(),
        built,
        result.items.len() - built
    );
}

fn print_upload_summary(report: &UploadReport) {
    println!(
        "upload: {} uploaded, {} already on PACS, {} failed",
        report.uploaded, report.skipped, report.failed
    );
    for file in &report.files {
        if let FileOutcome::Failed { reason } = &file.outcome {
            println!("  {}: {reason}", file.file);
        }
    }
}
