//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `geoip_hub` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - User-facing output formatting
//!
//! All core functionality is implemented in the library crate.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use geoip_hub::config::{Config, LogFormat, LogLevel};
use geoip_hub::initialization::{init_logger_with, init_service, GeoIpService};
use geoip_hub::{parse_schedule, run_scheduler, QueryError};

#[derive(Parser)]
#[command(
    name = "geoip_hub",
    version,
    about = "Multi-source GeoIP lookup and database refresh service"
)]
struct Cli {
    /// Root directory for database files
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// Base URL of the remote database repository
    #[arg(long)]
    source_url: Option<String>,

    /// Disable the in-process query result cache
    #[arg(long)]
    no_cache: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up IPs and print one JSON object per input line
    Query {
        /// File with one IP per line, or "-" for stdin
        #[arg(default_value = "-")]
        file: PathBuf,

        /// Query a single IP instead of reading a file (repeatable)
        #[arg(long = "ip")]
        ips: Vec<String>,

        /// Return all merged fields plus per-field provenance
        #[arg(long)]
        full: bool,
    },
    /// Run one refresh cycle now and print the per-database outcomes
    Refresh,
    /// Serve the refresh schedule until interrupted
    Watch {
        /// Refresh schedule override (5-field cron)
        #[arg(long)]
        schedule: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present (SOURCE_BASE_URL etc.)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logger_with(cli.log_level.clone().into(), cli.log_format.clone())
        .context("Failed to initialize logger")?;

    let mut config = Config::from_env();
    config.log_level = cli.log_level;
    config.log_format = cli.log_format;
    if let Some(path) = cli.database_path {
        config.database_path = path;
    }
    if let Some(url) = cli.source_url {
        config.source_base_url = Some(url);
    }
    if cli.no_cache {
        config.use_cache = false;
    }

    match run(cli.command, config).await {
        Ok(code) => {
            if code != 0 {
                process::exit(code);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("geoip_hub error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run(command: Command, config: Config) -> Result<i32> {
    match command {
        Command::Query { file, ips, full } => run_query(config, &file, ips, full).await,
        Command::Refresh => run_refresh(config).await,
        Command::Watch { schedule } => run_watch(config, schedule).await,
    }
}

async fn run_query(config: Config, file: &Path, ips: Vec<String>, full: bool) -> Result<i32> {
    let service = init_service(&config).await?;

    let inputs = if ips.is_empty() {
        read_inputs(file).await?
    } else {
        ips
    };
    if inputs.is_empty() {
        anyhow::bail!("no IPs to query");
    }

    let reports = service.manager.query_batch(&inputs, full).await;

    let mut unavailable = false;
    for report in &reports {
        println!("{}", report.to_json());
        if matches!(report.result, Err(QueryError::ReaderUnavailable)) {
            unavailable = true;
        }
    }

    if unavailable {
        eprintln!(
            "geoip_hub: no databases loaded under {} - run `geoip_hub refresh` first",
            config.database_path.display()
        );
        return Ok(1);
    }
    Ok(0)
}

async fn run_refresh(config: Config) -> Result<i32> {
    let service = init_service(&config).await?;
    let coordinator = service.require_coordinator()?;

    match coordinator.run_cycle().await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            println!(
                "✅ Refreshed {}/{} databases",
                summary.succeeded(),
                summary.outcomes.len()
            );
            Ok(0)
        }
        Err(e) => {
            if let Some(summary) = e.summary() {
                println!("{}", serde_json::to_string_pretty(summary)?);
            }
            eprintln!("geoip_hub error: {}", e);
            Ok(1)
        }
    }
}

async fn run_watch(config: Config, schedule_override: Option<String>) -> Result<i32> {
    let schedule_expr = schedule_override.unwrap_or_else(|| config.schedule.clone());
    let schedule = parse_schedule(&schedule_expr)?;

    let service: GeoIpService = init_service(&config).await?;
    let coordinator = Arc::clone(service.require_coordinator()?);

    let available = service
        .manager
        .status()
        .into_iter()
        .filter(|(_, loaded)| *loaded)
        .count();
    log::info!(
        "Serving {} of {} databases from {}; refresh schedule: {}",
        available,
        geoip_hub::CATALOG.len(),
        config.database_path.display(),
        schedule_expr
    );

    let cancel = CancellationToken::new();
    let scheduler = tokio::spawn(run_scheduler(coordinator, schedule, cancel.child_token()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for shutdown signal")?;
    log::info!("Shutting down");
    cancel.cancel();
    let _ = scheduler.await;

    Ok(0)
}

/// Reads IPs from a file or stdin ("-"), skipping blanks and comments.
async fn read_inputs(file: &Path) -> Result<Vec<String>> {
    let mut inputs = Vec::new();

    if file.as_os_str() == "-" {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            push_input(&mut inputs, &line);
        }
    } else {
        let handle = tokio::fs::File::open(file)
            .await
            .with_context(|| format!("Failed to open input file: {}", file.display()))?;
        let mut lines = BufReader::new(handle).lines();
        while let Some(line) = lines.next_line().await? {
            push_input(&mut inputs, &line);
        }
    }

    Ok(inputs)
}

fn push_input(inputs: &mut Vec<String>, line: &str) {
    let trimmed = line.trim();
    if !trimmed.is_empty() && !trimmed.starts_with('#') {
        inputs.push(trimmed.to_string());
    }
}
