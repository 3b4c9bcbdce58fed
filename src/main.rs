//! Sumi-Mirror main entry point
//!
//! This is the command-line interface for the Sumi-Mirror site mirroring tool.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use sumi_mirror::config::{load_config_with_hash, Config};
use sumi_mirror::jobs::{JobOptions, JobService, JobSnapshot, StartRequest};
use sumi_mirror::storage::{RetentionPolicy, StorageSteward};
use sumi_mirror::{validate_seed, JobStatus};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Mirror: a bounded website mirror
///
/// Sumi-Mirror crawls a site breadth-first from a seed URL, saves the pages
/// and their images, stylesheets and scripts, and packages everything as a
/// ZIP archive.
#[derive(Parser, Debug)]
#[command(name = "sumi-mirror")]
#[command(version)]
#[command(about = "A bounded website mirror", long_about = None)]
struct Cli {
    /// Seed URL to mirror
    #[arg(value_name = "URL")]
    url: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of link levels to fetch, seed included (1-5)
    #[arg(short, long, default_value_t = 2)]
    depth: u8,

    /// Largest page or asset to keep, in megabytes (1-500)
    #[arg(long, value_name = "MB", default_value_t = 100)]
    max_size: u32,

    /// Skip images
    #[arg(long)]
    no_images: bool,

    /// Skip stylesheets
    #[arg(long)]
    no_styles: bool,

    /// Skip scripts
    #[arg(long)]
    no_scripts: bool,

    /// Render pages in a headless browser before extracting links
    #[arg(long)]
    render: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and seed and show the plan without fetching anything
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn options(&self) -> JobOptions {
        JobOptions {
            depth: self.depth,
            max_size: self.max_size,
            include_images: !self.no_images,
            include_styles: !self.no_styles,
            include_scripts: !self.no_scripts,
            render_javascript: self.render,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::debug!("No configuration file given, using defaults");
            Config::default()
        }
    };

    if cli.dry_run {
        handle_dry_run(&cli, &config)?;
        return Ok(ExitCode::SUCCESS);
    }

    let status = handle_mirror(&cli, config).await?;
    Ok(if status == JobStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_mirror=info,warn"),
            1 => EnvFilter::new("sumi_mirror=debug,info"),
            2 => EnvFilter::new("sumi_mirror=trace,debug"),
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

/// Handles the --dry-run mode: validates everything and shows what would be mirrored
fn handle_dry_run(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let seed = validate_seed(&cli.url)?;
    let options = cli.options();
    options.validate()?;

    println!("=== Sumi-Mirror Dry Run ===\n");

    println!("Job:");
    println!("  Seed: {}", seed);
    println!("  Depth: {}", options.depth);
    println!("  Max size: {} MB", options.max_size);
    println!("  Images: {}", options.include_images);
    println!("  Stylesheets: {}", options.include_styles);
    println!("  Scripts: {}", options.include_scripts);
    println!(
        "  Strategy: {}",
        if options.render_javascript {
            "headless browser"
        } else {
            "static HTTP"
        }
    );

    println!("\nStorage:");
    println!("  Artifact directory: {}", config.storage.artifact_dir.display());
    println!("  Retention: {} minutes", config.storage.retention_minutes);
    println!(
        "  Ceiling: {} MB (shrink to {:.0}%)",
        config.storage.max_storage_mb,
        config.storage.low_watermark * 100.0
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\n✓ Configuration is valid");
    println!("✓ Would mirror {} up to {} level(s)", seed, options.depth);

    Ok(())
}

/// Runs one job to completion, printing progress as it goes
async fn handle_mirror(cli: &Cli, config: Config) -> anyhow::Result<JobStatus> {
    std::fs::create_dir_all(&config.storage.artifact_dir).with_context(|| {
        format!(
            "Failed to create artifact directory {}",
            config.storage.artifact_dir.display()
        )
    })?;

    let service = JobService::new(&config)?;

    let shutdown = CancellationToken::new();
    let steward = Arc::new(StorageSteward::new(
        &config.storage.artifact_dir,
        RetentionPolicy::from_config(&config.storage),
        service.registry(),
    ));
    let steward_task = steward.spawn(config.storage.sweep_interval(), shutdown.clone());

    let id = service.start(StartRequest {
        url: cli.url.clone(),
        options: cli.options(),
    })?;
    tracing::info!(job = %id, "Job started");

    let Some(mut subscription) = service.subscribe(&id) else {
        bail!("Job {} disappeared from the registry", id);
    };

    let mut last = None;
    let mut interrupted = false;
    loop {
        tokio::select! {
            snapshot = subscription.next() => match snapshot {
                Some(snapshot) => {
                    if !cli.quiet {
                        print_snapshot(&snapshot);
                    }
                    last = Some(snapshot);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                tracing::warn!("Interrupted, cancelling job");
                service.cancel(&id);
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = steward_task.await {
        tracing::warn!("Storage steward did not stop cleanly: {}", e);
    }
    service.shutdown().await;

    let Some(last) = last else {
        bail!("No progress received for job {}", id);
    };

    match last.status {
        JobStatus::Completed => {
            if let Some(zip) = &last.zip_file {
                println!("✓ Archive written to: {}", zip.display());
            }
        }
        JobStatus::Error => {
            tracing::error!(
                "Mirror failed: {}",
                last.error.as_deref().unwrap_or("unknown error")
            );
        }
        JobStatus::Cancelled => println!("Mirror cancelled"),
        _ => {}
    }

    Ok(last.status)
}

fn print_snapshot(snapshot: &JobSnapshot) {
    if snapshot.current_file.is_empty() {
        println!("[{:>3}%] {}", snapshot.progress, snapshot.status);
    } else {
        println!(
            "[{:>3}%] {} ({} files) {}",
            snapshot.progress, snapshot.status, snapshot.files_downloaded, snapshot.current_file
        );
    }
}
