//! # rag-eval CLI
//!
//! ## Usage
//!
//! ```bash
//! rag-eval --config ./config/rag-eval.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag-eval init` | Create the SQLite database and run schema migrations |
//! | `rag-eval ingest <folder>` | Read, chunk, embed and store documents |
//! | `rag-eval query "<text>"` | Show the chunks closest to a question |
//! | `rag-eval generate <folder>` | Write one synthetic question label per chunk |
//! | `rag-eval evaluate <labels>` | Score a retrieval mode against labeled questions |
//! | `rag-eval stats` | Show database statistics |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rag_eval::evaluate::EvaluateOptions;
use rag_eval::generate::GenerateOptions;
use rag_eval::ingest::IngestOptions;
use rag_eval::retrieval::RetrievalMode;
use rag_eval::{config, evaluate, generate, ingest, migrate, query, stats};

/// rag-eval: measure how well a retrieval pipeline finds the chunk a
/// question was written from.
#[derive(Parser)]
#[command(
    name = "rag-eval",
    about = "rag-eval: retrieval evaluation for RAG pipelines",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag-eval.toml")]
    config: PathBuf,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it twice is safe.
    Init,

    /// Ingest a folder of documents.
    ///
    /// Every file directly inside the folder whose name ends with the
    /// suffix must carry `title`, `date` (YYYY-MM) and `url` front matter.
    Ingest {
        /// Folder to read (not recursive).
        folder: PathBuf,

        /// File name suffix to match.
        #[arg(long, default_value = ".md")]
        suffix: String,

        /// Chunking strategy override (`fixed` or `structural`).
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Semantic lookup of a single question.
    Query {
        text: String,

        #[arg(long, default_value = "3")]
        limit: usize,
    },

    /// Generate a question/answer label for each chunk of a folder.
    ///
    /// Chunks with the `[chunking]` settings, so run it with the same
    /// strategy as `ingest`.
    Generate {
        folder: PathBuf,

        #[arg(long, default_value = ".md")]
        suffix: String,

        #[arg(long)]
        strategy: Option<String>,

        /// Only generate for the first N chunks.
        #[arg(long)]
        max_questions: Option<usize>,

        /// Output file; must end in `.json`.
        #[arg(long, default_value = "labels.json")]
        output: PathBuf,
    },

    /// Evaluate retrieval against a label file (.jsonl or .json).
    Evaluate {
        labels: PathBuf,

        /// Retrieval mode.
        #[arg(long, value_enum, default_value_t = RetrievalMode::Semantic)]
        mode: RetrievalMode,

        /// Rerank retrieved chunks with the configured rerank provider.
        #[arg(long)]
        rerank: bool,

        /// Candidates retrieved per question (default: `[retrieval] limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Also write the full report as JSON to this path.
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Show database statistics.
    Stats,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RAG_EVAL_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            folder,
            suffix,
            strategy,
        } => {
            let options = IngestOptions {
                folder,
                suffix,
                strategy,
            };
            ingest::run_ingest(&cfg, &options).await?;
        }
        Commands::Query { text, limit } => {
            query::run_query(&cfg, &text, limit).await?;
        }
        Commands::Generate {
            folder,
            suffix,
            strategy,
            max_questions,
            output,
        } => {
            let options = GenerateOptions {
                folder,
                suffix,
                strategy,
                max_questions,
                output,
            };
            generate::run_generate(&cfg, &options).await?;
        }
        Commands::Evaluate {
            labels,
            mode,
            rerank,
            limit,
            json,
        } => {
            let options = EvaluateOptions {
                labels,
                mode,
                rerank,
                limit,
                json,
            };
            evaluate::run_evaluate(&cfg, &options).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
