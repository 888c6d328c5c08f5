use anyhow::{bail, Context};
use std::path::PathBuf;

use file_intake::commands::{self, AppState};
use file_intake::config::{self, Config};
use file_intake::source::LocalFile;
use file_intake::uploader::upload_queue::wait_for_uploads;
use file_intake::uploader::{FileEntry, QueueSummary, UploadStatus};

const USAGE: &str = "\
Usage: file-intake [OPTIONS] <FILE>...

Uploads text, PDF, CSV and Excel files to the configured workflow endpoint.

Options:
  --endpoint <URL>   Override the endpoint for this run
  --config <PATH>    Read configuration from PATH instead of the default location
  --retry <N>        Retry failed uploads up to N more times
  --json             Print the final queue as JSON
  --reset-config     Restore the default configuration and exit
  -h, --help         Show this help";

#[derive(Debug, Default)]
struct CliArgs {
    files: Vec<PathBuf>,
    endpoint: Option<String>,
    config_path: Option<PathBuf>,
    retry_rounds: u32,
    json: bool,
    reset_config: bool,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--endpoint" => {
                cli.endpoint = Some(args.next().context("--endpoint needs a URL")?);
            }
            "--config" => {
                cli.config_path = Some(PathBuf::from(
                    args.next().context("--config needs a path")?,
                ));
            }
            "--retry" => {
                let rounds = args.next().context("--retry needs a count")?;
                cli.retry_rounds = rounds
                    .parse()
                    .with_context(|| format!("invalid retry count '{}'", rounds))?;
            }
            "--json" => cli.json = true,
            "--reset-config" => cli.reset_config = true,
            "-h" | "--help" => cli.help = true,
            other if other.starts_with("--") => bail!("unknown option '{}'", other),
            _ => cli.files.push(PathBuf::from(arg)),
        }
    }

    Ok(cli)
}

/// The file named by `--config`, otherwise the per-user default
fn config_file(cli: &CliArgs) -> anyhow::Result<PathBuf> {
    match &cli.config_path {
        Some(path) => Ok(path.clone()),
        None => Ok(config::get_config_path()?),
    }
}

fn load_settings(cli: &CliArgs) -> anyhow::Result<Config> {
    let path = config_file(cli)?;
    let config = config::load_config_from(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    let mut config = config.apply_env_overrides();
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint_url = endpoint.clone();
    }
    config::validate_config(&config).context("invalid configuration")?;
    Ok(config)
}

fn print_report(entries: &[FileEntry], summary: &QueueSummary) {
    for entry in entries {
        match entry.status() {
            UploadStatus::Error => println!(
                "{:<10} {} ({})",
                entry.status(),
                entry.file_name(),
                entry.error_message().unwrap_or_default()
            ),
            status => println!("{:<10} {}", status, entry.file_name()),
        }
    }

    match summary.percent_complete {
        Some(percent) => println!(
            "{}/{} uploaded ({}%)",
            summary.succeeded, summary.total, percent
        ),
        None => println!("No files were queued"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = parse_args(std::env::args().skip(1))?;

    if cli.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let settings = load_settings(&cli);
    let level = settings
        .as_ref()
        .map(Config::log_level_filter)
        .unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if cli.reset_config {
        let path = config_file(&cli)?;
        config::reset_config_at(&path).context("failed to reset configuration")?;
        println!("Configuration at {} reset to defaults", path.display());
        return Ok(());
    }

    let settings = settings?;
    log::info!("Starting file intake");

    if cli.files.is_empty() {
        bail!("no files given\n\n{}", USAGE);
    }

    let state = AppState::new(&settings).context("failed to set up the uploader")?;

    let handles = LocalFile::from_paths(&cli.files).await;
    let added = commands::add_files(&state, handles);
    for name in &added.rejected {
        eprintln!("Skipped {}: only text, PDF, CSV and Excel files are accepted", name);
    }
    wait_for_uploads(added.uploads).await;

    for round in 1..=cli.retry_rounds {
        let retries = commands::retry_failed_uploads(&state);
        if retries.is_empty() {
            break;
        }
        log::info!("Retry round {} for {} file(s)", round, retries.len());
        wait_for_uploads(retries).await;
    }

    let entries = commands::get_queue(&state);
    let summary = commands::get_summary(&state);

    if cli.json {
        let report = serde_json::json!({
            "entries": entries,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&entries, &summary);
    }

    if summary.succeeded < summary.total {
        std::process::exit(1);
    }
    Ok(())
}
