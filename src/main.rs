//! # Course Compass CLI (`compass`)
//!
//! ## Usage
//!
//! ```bash
//! compass --config ./config/compass.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `compass init` | Create the pgvector extension, tables and SQL functions |
//! | `compass serve` | Start the HTTP server |
//! | `compass ingest` | Embed every course and reconcile counts |
//! | `compass search "<query>"` | Search courses |
//! | `compass recommend "<intent>"` | Recommend courses for an intent |
//! | `compass courses load <file>` | Upsert normalized course records |
//! | `compass courses probe` | Print table counts and a sample |
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | `0` | Success |
//! | `1` | Any failure, including an empty source table during ingest |
//! | `2` | Ingest finished but counts did not reconcile |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use course_compass::error::AdvisorError;
use course_compass::{config, courses, ingest, migrate, recommend, search, server};

/// Course Compass CLI.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/compass.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "compass",
    about = "Course Compass — course search and whitelist-validated recommendations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/compass.toml")]
    config: PathBuf,

    /// Debug-level logging (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema. Idempotent.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Embed every course row and reconcile table counts.
    ///
    /// Exits with status 2 when the embedding count does not match the
    /// course count after writing.
    Ingest {
        /// Count rows and show a sample text without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Texts per provider call (overrides `[embedding].batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Search courses.
    Search {
        query: String,

        /// Maximum number of results (1-25).
        #[arg(long)]
        k: Option<i64>,

        /// `title`, `fts` or `vector` (defaults to `[retrieval].search_strategy`).
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Recommend courses for a free-text intent.
    Recommend {
        intent: String,

        /// Maximum number of recommendations (clamped to 1-25).
        #[arg(long, default_value_t = 5)]
        top_k: i64,

        /// Candidate strategy (defaults to `[retrieval].recommend_strategy`).
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Course table maintenance.
    Courses {
        #[command(subcommand)]
        action: CoursesAction,
    },
}

#[derive(Subcommand)]
enum CoursesAction {
    /// Upsert a JSON array of normalized course records.
    Load { file: PathBuf },

    /// Print row counts and a sample of courses.
    Probe {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<AdvisorError>() {
        Some(AdvisorError::ReconciliationMismatch { .. }) => 2,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!(
                "Schema ready: {}, {}, ft_search, match_courses",
                cfg.store.courses_table, cfg.store.embeddings_table
            );
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest {
            dry_run,
            batch_size,
        } => {
            ingest::run_ingest_cmd(&cfg, dry_run, batch_size).await?;
        }
        Commands::Search { query, k, strategy } => {
            search::run_search(&cfg, &query, k, strategy.as_deref()).await?;
        }
        Commands::Recommend {
            intent,
            top_k,
            strategy,
        } => {
            recommend::run_recommend(&cfg, &intent, top_k, strategy.as_deref()).await?;
        }
        Commands::Courses { action } => match action {
            CoursesAction::Load { file } => {
                courses::run_courses_load(&cfg, &file).await?;
            }
            CoursesAction::Probe { limit } => {
                courses::run_courses_probe(&cfg, limit).await?;
            }
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(exit_code(&err));
    }
}
