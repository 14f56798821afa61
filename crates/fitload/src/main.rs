use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fitload_core::config::{Config, DEFAULT_CONFIG_PATH};
use fitload_core::db::{self, PgDestination};
use fitload_core::loader::Destination;
use fitload_core::memory::MemoryDestination;
use fitload_core::orchestrator::Orchestrator;
use fitload_core::transform::all_transformers;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Load fitness-platform JSON exports into Postgres", long_about = None)]
struct Cli {
    /// Path to the TOML configuration
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log progress at info level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Locate, aggregate, transform and reload the configured datasets
    Run(RunArgs),
    /// Check that the database is reachable
    TestConnection,
    /// Show the configured datasets
    List,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Only these datasets, in this order
    #[arg(long, num_args = 1..)]
    datasets: Vec<String>,

    /// Exit non-zero if any dataset failed
    #[arg(long)]
    strict: bool,

    /// Load into memory instead of the database
    #[arg(long)]
    dry_run: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    init_logging(cli.verbose || config.etl.verbose, cli.json_logs);

    match cli.command {
        Command::Run(args) => run(&config, args).await,
        Command::TestConnection => {
            let destination = connect_destination(&config).await?;
            match destination.test_connection().await {
                Ok(version) => {
                    println!("Connected: {version}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    error!(error = %err, "connection test failed");
                    eprintln!("Connection failed: {err}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::List => {
            for spec in &config.datasets {
                println!(
                    "{:<24} {:<24} {:<56} {}",
                    spec.name,
                    spec.transformer.code_identifier(),
                    spec.pattern,
                    spec.table
                );
                println!("    {}", spec.transformer.description());
            }
            let configured: Vec<&str> = config.datasets.iter().map(|d| d.transformer.code_identifier()).collect();
            let unused: Vec<_> = all_transformers()
                .iter()
                .filter(|t| !configured.contains(&t.code_identifier()))
                .collect();
            if !unused.is_empty() {
                println!("\nAvailable but not configured:");
                for transformer in unused {
                    println!(
                        "{:<24} {}",
                        transformer.code_identifier(),
                        transformer.description()
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(config: &Config, args: RunArgs) -> Result<ExitCode> {
    let selection = config.selection(Some(args.datasets.as_slice()));
    let strict = args.strict || config.etl.strict;

    let report = if args.dry_run {
        info!("dry run: loading into memory");
        let destination = MemoryDestination::new();
        Orchestrator::new(config, &destination).run(&selection).await
    } else {
        let destination = connect_destination(config).await?;
        if let Err(err) = destination.test_connection().await {
            error!(error = %err, "database connection failed, aborting run");
            eprintln!("Database connection failed: {err}");
            return Ok(ExitCode::FAILURE);
        }
        Orchestrator::new(config, &destination).run(&selection).await
    };

    println!("{}", report.render());

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write run report to {}", path.display()))?;
        info!(path = %path.display(), "wrote run report");
    }

    if report.exit_success(strict) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect_destination(config: &Config) -> Result<PgDestination> {
    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("FITLOAD_DATABASE_URL"))
        .context("DATABASE_URL (or FITLOAD_DATABASE_URL) must be set")?;
    let pool = db::connect(&database_url, config.database.max_connections).await?;
    Ok(PgDestination::new(pool))
}
