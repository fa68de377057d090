//! devdocs-ingest main entry point
//!
//! This is the command-line interface for the documentation ingester.

use anyhow::Context;
use clap::Parser;
use devdocs_ingest::config::{load_config_with_hash, Config};
use devdocs_ingest::output::{format_job, load_statistics, print_jobs, print_statistics};
use devdocs_ingest::{Ingestor, JobStatus, SqliteStorage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// devdocs-ingest: a resumable documentation crawler
///
/// Crawls DevDocs-style documentation sets, extracts page content and keeps
/// a deduplicated SQLite content store up to date, tracking each run as a job.
#[derive(Parser, Debug)]
#[command(name = "devdocs-ingest")]
#[command(version)]
#[command(about = "A resumable documentation crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Target slug to crawl; repeatable, defaults to the configured targets
    #[arg(long = "target", value_name = "SLUG")]
    targets: Vec<String>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["jobs", "job", "resume", "stats"])]
    dry_run: bool,

    /// List recorded jobs and exit
    #[arg(long, conflicts_with_all = ["job", "resume", "stats"])]
    jobs: bool,

    /// Show one job and exit
    #[arg(long, value_name = "ID", conflicts_with_all = ["resume", "stats"])]
    job: Option<i64>,

    /// Resume a paused job
    #[arg(long, value_name = "ID", conflicts_with = "stats")]
    resume: Option<i64>,

    /// Show statistics from the database and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let targets = if cli.targets.is_empty() {
        config.targets.iter().map(|t| t.slug.clone()).collect()
    } else {
        cli.targets.clone()
    };

    if cli.dry_run {
        handle_dry_run(&config, &targets);
        return Ok(());
    }

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open {}", config.output.database_path))?;

    if cli.stats {
        let stats = load_statistics(&storage, cli.targets.first().map(String::as_str))?;
        print_statistics(&stats);
        return Ok(());
    }

    let ingestor = Arc::new(Ingestor::new(config, storage)?);

    if cli.jobs {
        print_jobs(&ingestor.jobs(cli.targets.first().map(String::as_str))?);
        return Ok(());
    }
    if let Some(job_id) = cli.job {
        println!("{}", format_job(&ingestor.job(job_id)?));
        return Ok(());
    }

    spawn_interrupt_handler(ingestor.clone());

    if let Some(job_id) = cli.resume {
        let job = ingestor.resume(job_id).await?;
        println!("{}", format_job(&job));
        return check_failed(&[job.status]);
    }

    handle_ingest(&ingestor, &targets).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("devdocs_ingest=info,warn"),
            1 => EnvFilter::new("devdocs_ingest=debug,info"),
            2 => EnvFilter::new("devdocs_ingest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels every active run on Ctrl-C; runs stop after their current batch
fn spawn_interrupt_handler(ingestor: Arc<Ingestor<SqliteStorage>>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let cancelled = ingestor.cancel_all();
            tracing::warn!(cancelled, "interrupt received, stopping after the current batch");
        }
    });
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, targets: &[String]) {
    println!("=== devdocs-ingest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Inter-batch delay: {}ms", config.crawler.inter_batch_delay_ms);
    println!("  Request timeout: {}ms", config.crawler.request_timeout_ms);
    println!(
        "  Retries: {} (backoff {}ms)",
        config.crawler.max_retries, config.crawler.retry_backoff_ms
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());
    println!("Database: {}", config.output.database_path);

    println!("\nTargets ({}):", targets.len());
    for target in targets {
        println!("  - {} -> {}", target, config.source.manifest_url(target));
    }

    println!("\nConfiguration is valid");
}

/// Runs every target in turn and prints each final job
async fn handle_ingest(ingestor: &Ingestor<SqliteStorage>, targets: &[String]) -> anyhow::Result<()> {
    if targets.is_empty() {
        anyhow::bail!("no targets given and none configured");
    }

    let mut statuses = Vec::with_capacity(targets.len());
    for target in targets {
        let job = ingestor.run(target).await?;
        println!("{}", format_job(&job));
        statuses.push(job.status);

        if job.status == JobStatus::Cancelled {
            tracing::info!("Skipping remaining targets after cancellation");
            break;
        }
    }

    check_failed(&statuses)
}

fn check_failed(statuses: &[JobStatus]) -> anyhow::Result<()> {
    let failed = statuses
        .iter()
        .filter(|s| **s == JobStatus::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} runs failed", failed, statuses.len());
    }
    Ok(())
}
