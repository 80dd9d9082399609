//! flowshares-cli — Offline driver for the FlowShares accounting engine.
//!
//! Replays scripted host events against an in-memory engine, converts flow
//! rates to shares and inspects persisted engine snapshots.

mod script;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use flowshares_core::constants::{SECONDS_PER_MONTH, TOKEN};
use flowshares_core::traits::ShareConverter;
use flowshares_engine::{EngineConfig, EngineSnapshot, FlowSharesEngine, ScaledConverter};
use serde::Serialize;
use tracing::info;

/// FlowShares command-line interface.
#[derive(Parser, Debug)]
#[command(name = "flowshares-cli", version, about = "Continuous-flow share accounting")]
struct Cli {
    /// Config file (default: <config_dir>/flowshares/config.toml, if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter; overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json"); overrides the config file.
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON event script and print a JSON report.
    Replay(ReplayArgs),
    /// Print the share count for a flow rate.
    Shares(SharesArgs),
    /// Print a bincode engine snapshot as JSON.
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Path to the event script.
    script: PathBuf,

    /// Write the final engine snapshot (bincode) to this file.
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Abort on the first rejected event instead of recording it.
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SharesArgs {
    /// Flow rate in smallest units per second.
    #[arg(long)]
    rate: Option<u128>,

    /// Whole tokens (18 decimals) streamed per 30 days.
    #[arg(long)]
    monthly: Option<u128>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Path to a snapshot written by `replay --snapshot-out`.
    snapshot: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.log_level, &config.log_format);

    match cli.command {
        Commands::Replay(args) => replay(&config, &args),
        Commands::Shares(args) => shares(&config, &args),
        Commands::Inspect(args) => inspect(&args.snapshot),
    }
}

/// Resolve the config file, then apply CLI overrides.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => Some(EngineConfig::default_path()).filter(|p| p.exists()),
    };
    let mut config = EngineConfig::load(path.as_deref())
        .with_context(|| format!("Failed to load config {path:?}"))?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn replay(config: &EngineConfig, args: &ReplayArgs) -> Result<()> {
    let json = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read script: {}", args.script.display()))?;
    let events = script::parse(&json)
        .with_context(|| format!("Invalid script: {}", args.script.display()))?;

    let mut engine = FlowSharesEngine::from_config(config).context("Failed to create engine")?;
    info!(events = events.len(), share_scale = config.share_scale, "replaying script");
    let report = script::replay(&mut engine, &events, args.strict)?;

    if let Some(out) = &args.snapshot_out {
        let bytes = engine.snapshot().encode().context("Failed to encode snapshot")?;
        std::fs::write(out, bytes)
            .with_context(|| format!("Failed to write snapshot: {}", out.display()))?;
        info!(path = %out.display(), "snapshot written");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Output of the `shares` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct SharesReport {
    rate: u128,
    shares: u128,
    scale: u128,
}

fn shares(config: &EngineConfig, args: &SharesArgs) -> Result<()> {
    let report = shares_report(config, args)?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn shares_report(config: &EngineConfig, args: &SharesArgs) -> Result<SharesReport> {
    let rate = match (args.rate, args.monthly) {
        (Some(rate), _) => rate,
        (None, Some(tokens)) => tokens
            .checked_mul(TOKEN)
            .map(|amount| amount / u128::from(SECONDS_PER_MONTH))
            .context("--monthly overflows")?,
        (None, None) => bail!("one of --rate or --monthly is required"),
    };
    let converter = ScaledConverter::new(config.share_scale)?;
    let shares = converter.shares(rate)?;
    Ok(SharesReport { rate, shares, scale: converter.scale() })
}

fn inspect(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    let snapshot = EngineSnapshot::decode(&bytes)
        .with_context(|| format!("Invalid snapshot: {}", path.display()))?;
    // Restoring runs the consistency checks.
    FlowSharesEngine::restore(&snapshot).context("Snapshot failed consistency checks")?;
    println!("{}", snapshot.to_json()?);
    Ok(())
}

/// Initialize tracing on stderr so stdout carries only JSON output.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
