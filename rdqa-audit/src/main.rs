//! rdqa-audit - dataset validation and QA workflow
//!
//! Passes:
//! - `raw`: validate the intake area, write the pending-files / pending-errors pair
//! - `stage`: copy identifiers that passed into the QA holding area
//! - `qa`: surface, promote and rewrite the QA checklist
//! - `checked`: validate the archive and purge failing identifiers
//! - `all`: the four passes in that order
//!
//! Validation findings never fail the process. Structural faults (missing or
//! drifted dictionary, ledger schema violations) abort before any ledger is
//! written.
//!
//! One invocation per dataset at a time; concurrent runs are not coordinated.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rdqa_audit::services::{QaWorkflow, ValidationPass};
use rdqa_audit::{AuditContext, ValidationReport};
use rdqa_common::{DatasetConfig, RunContext};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for rdqa-audit
#[derive(Parser, Debug)]
#[command(name = "rdqa-audit")]
#[command(about = "Validate a research dataset and drive its QA workflow")]
#[command(version)]
struct Args {
    /// Config file (overrides RDQA_CONFIG and the dataset's rdqa.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset root (overrides RDQA_DATASET_ROOT and dataset_root)
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// User name recorded in ledgers
    #[arg(long)]
    user: Option<String>,

    /// Ignore errors on files last modified before this date (YYYY-MM-DD)
    #[arg(long)]
    ignore_before: Option<NaiveDate>,

    /// Accept a changed data dictionary and refresh its snapshot
    #[arg(long)]
    accept_dictionary: bool,

    /// Print findings as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Validate the intake area
    Raw,
    /// Stage passed identifiers for QA
    Stage,
    /// Process the QA checklist
    Qa,
    /// Validate the checked archive
    Checked,
    /// Run raw, stage, qa and checked in order
    All,
}

fn main() -> Result<()> {
    // RUST_LOG wins; otherwise the configured level is applied once known
    let (filter, reload_handle) = reload::Layer::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting rdqa-audit {}", env!("CARGO_PKG_VERSION"));

    let (config, root) = DatasetConfig::resolve(args.config.as_deref(), args.dataset.as_deref())
        .context("Failed to resolve dataset configuration")?;

    if std::env::var_os("RUST_LOG").is_none() {
        if let Err(e) = reload_handle.reload(EnvFilter::new(&config.logging.level)) {
            warn!("Cannot apply log level '{}': {}", config.logging.level, e);
        }
    }

    let run = RunContext::from_environment(args.user.as_deref().or(config.user.as_deref()));
    info!("Dataset: {}", root.display());
    info!("User: {}", run.user());

    let ctx = AuditContext::load(config, &root, args.accept_dictionary)
        .context("Failed to load dataset")?;

    let passes: &[Command] = match args.command {
        Command::All => &[Command::Raw, Command::Stage, Command::Qa, Command::Checked],
        Command::Raw => &[Command::Raw],
        Command::Stage => &[Command::Stage],
        Command::Qa => &[Command::Qa],
        Command::Checked => &[Command::Checked],
    };

    for pass in passes {
        match pass {
            Command::Raw => {
                let outcome = ValidationPass::new(&ctx, &run)
                    .ignore_before(args.ignore_before)
                    .raw()
                    .context("Raw validation pass failed")?;
                print_report("raw", &outcome.report, args.json)?;
                info!(
                    "Pending snapshot: {} ({} of {} identifiers passed)",
                    outcome.pending_files.display(),
                    outcome.passed,
                    outcome.identifiers
                );
            }
            Command::Stage => {
                let outcome = QaWorkflow::new(&ctx, &run)
                    .stage()
                    .context("QA staging failed")?;
                info!("Staged {} identifiers", outcome.staged.len());
            }
            Command::Qa => {
                let outcome = QaWorkflow::new(&ctx, &run).run().context("QA pass failed")?;
                for identifier in &outcome.promoted {
                    info!("Promoted {}", identifier);
                }
            }
            Command::Checked => {
                let outcome = ValidationPass::new(&ctx, &run)
                    .ignore_before(args.ignore_before)
                    .checked()
                    .context("Checked validation pass failed")?;
                print_report("checked", &outcome.report, args.json)?;
                for identifier in &outcome.purged {
                    warn!("Purged {} from the archive", identifier);
                }
            }
            Command::All => {}
        }
    }

    info!("rdqa-audit finished");
    Ok(())
}

fn print_report(pass: &str, report: &ValidationReport, json: bool) -> Result<()> {
    for error in report.errors() {
        if json {
            println!("{}", serde_json::to_string(error).context("Failed to encode finding")?);
        } else {
            match &error.path {
                Some(path) => println!("{}: {} ({})", pass, error, path.display()),
                None => println!("{}: {}", pass, error),
            }
        }
    }
    if report.is_empty() {
        info!("{} pass: no findings", pass);
    } else {
        warn!("{} pass: {} findings", pass, report.len());
    }
    Ok(())
}
