//! # Bundle Harness CLI (`bh`)
//!
//! Command-line front end for legal bundle analysis. Every bundle command is
//! scoped by `--case` and `--org`; results are printed to stdout as JSON and
//! progress goes to stderr.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bh init` | Create the SQLite database and run schema migrations |
//! | `bh phase-a` | One-pass summary of a bundle text file |
//! | `bh full` | Create a chunked bundle from a text file |
//! | `bh continue <id>` | Process the next batch of chunks |
//! | `bh status` | Latest bundle of the case |
//! | `bh view <kind> <id>` | toc, timeline, issues, contradictions, or overview |
//! | `bh search <id> "<query>"` | Search a bundle's pages |
//! | `bh delete-case` | Delete every bundle of the case |
//! | `bh serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! bh init --config ./config/bh.toml
//! bh --case c1 --org acme full --name "Trial bundle" --file bundle.txt
//! bh --case c1 --org acme continue 3f2a… --max-chunks 5 --progress json
//! bh --case c1 --org acme view timeline 3f2a…
//! ```
//!
//! Bundle files are plain text with pages separated by form feeds (`\f`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use bundle_harness::config;
use bundle_harness::migrate;
use bundle_harness::processor::ContinueOutcome;
use bundle_harness::progress::{ProgressMode, ProgressReporter};
use bundle_harness::server;
use bundle_harness::service::{pages_from_text, BundleService, StartFull, StartPhaseA};
use bundle_harness_core::gate::View;
use bundle_harness_core::models::{BundleStatus, Scope};

/// Bundle Harness: resumable chunked analysis of legal court bundles.
#[derive(Parser)]
#[command(name = "bh", version, about = "Bundle Harness: resumable chunked analysis of legal court bundles")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/bh.toml")]
    config: PathBuf,

    /// Case the command operates on.
    #[arg(long, global = true)]
    case: Option<String>,

    /// Organization that owns the case.
    #[arg(long, global = true)]
    org: Option<String>,

    /// Log debug events to stderr (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Summarize a whole bundle in one pass.
    PhaseA {
        #[arg(long)]
        name: String,
        /// Bundle text; pages separated by form feeds.
        #[arg(long)]
        file: PathBuf,
        /// Page count, when it differs from the number of form-feed pages.
        #[arg(long)]
        page_count: Option<u32>,
    },

    /// Create a full-analysis bundle and run the bootstrap batch.
    Full {
        #[arg(long)]
        name: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        page_count: Option<u32>,
        /// Progress output: human, json, or off (default: human on a TTY).
        #[arg(long)]
        progress: Option<String>,
    },

    /// Process the next batch of chunks.
    Continue {
        bundle_id: String,
        #[arg(long)]
        max_chunks: Option<u32>,
        /// Keep going until the bundle completes or fails.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        progress: Option<String>,
    },

    /// Show the latest bundle of the case.
    Status,

    /// Print a derived view.
    View {
        /// toc, timeline, issues, contradictions, or overview.
        kind: String,
        bundle_id: String,
    },

    /// Search a bundle's page text (case-insensitive).
    Search { bundle_id: String, query: String },

    /// Delete every bundle of the case.
    DeleteCase,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::PhaseA { ref name, ref file, page_count } => {
            let scope = scope(&cli)?;
            let text = read_bundle(file)?;
            let service = BundleService::open(&cfg).await?;
            let req = StartPhaseA {
                bundle_name: Some(name.clone()),
                text_content: text,
                page_count,
            };
            print_json(&service.start_phase_a(&scope, req).await?)?;
        }
        Commands::Full {
            ref name,
            ref file,
            page_count,
            ref progress,
        } => {
            let scope = scope(&cli)?;
            let reporter = reporter(progress.as_deref())?;
            let pages = pages_from_text(&read_bundle(file)?);
            let service = BundleService::open(&cfg).await?;
            let req = StartFull {
                bundle_name: Some(name.clone()),
                page_count: page_count.unwrap_or(pages.len() as u32) as i64,
                text_content_by_page: pages,
            };
            print_json(&service.start_full(&scope, req, reporter.as_ref()).await?)?;
        }
        Commands::Continue {
            ref bundle_id,
            max_chunks,
            all,
            ref progress,
        } => {
            let scope = scope(&cli)?;
            let reporter = reporter(progress.as_deref())?;
            let service = BundleService::open(&cfg).await?;
            let outcome = if all {
                continue_until_done(&service, &scope, bundle_id, max_chunks, reporter.as_ref()).await?
            } else {
                service
                    .continue_processing(&scope, bundle_id, max_chunks, reporter.as_ref())
                    .await?
            };
            print_json(&outcome)?;
        }
        Commands::Status => {
            let scope = scope(&cli)?;
            let service = BundleService::open(&cfg).await?;
            print_json(&service.status(&scope).await?)?;
        }
        Commands::View { ref kind, ref bundle_id } => {
            let scope = scope(&cli)?;
            let view: View = kind.parse()?;
            let service = BundleService::open(&cfg).await?;
            print_json(&service.view(&scope, bundle_id, view).await?)?;
        }
        Commands::Search {
            ref bundle_id,
            ref query,
        } => {
            let scope = scope(&cli)?;
            let service = BundleService::open(&cfg).await?;
            print_json(&service.search(&scope, bundle_id, query).await?)?;
        }
        Commands::DeleteCase => {
            let scope = scope(&cli)?;
            let service = BundleService::open(&cfg).await?;
            let deleted = service.delete_case(&scope).await?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn scope(cli: &Cli) -> Result<Scope> {
    match (cli.case.as_deref(), cli.org.as_deref()) {
        (Some(case), Some(org)) if !case.trim().is_empty() && !org.trim().is_empty() => {
            Ok(Scope::new(case.trim(), org.trim()))
        }
        _ => bail!("--case and --org are required for this command"),
    }
}

fn reporter(mode: Option<&str>) -> Result<Box<dyn ProgressReporter>> {
    let mode = match mode {
        Some(m) => ProgressMode::parse(m)?,
        None => ProgressMode::default_for_tty(),
    };
    Ok(mode.reporter())
}

fn read_bundle(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read bundle file: {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Repeat continue calls until the bundle completes, fails, or another
/// caller holds it.
async fn continue_until_done(
    service: &BundleService,
    scope: &Scope,
    bundle_id: &str,
    max_chunks: Option<u32>,
    progress: &dyn ProgressReporter,
) -> Result<ContinueOutcome> {
    loop {
        let outcome = service
            .continue_processing(scope, bundle_id, max_chunks, progress)
            .await?;
        if outcome.is_complete || outcome.bundle.status == BundleStatus::Failed || outcome.processed == 0 {
            return Ok(outcome);
        }
    }
}
