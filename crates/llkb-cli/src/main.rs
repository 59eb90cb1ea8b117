mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, record::RecordSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "llkb",
    about = "Lessons learned knowledge base: confidence-scored fixes and reusable components",
    version,
    propagate_version = true
)]
struct Cli {
    /// LLKB root (default: nearest .artk/llkb/ above the current directory)
    #[arg(long, global = true, env = "LLKB_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the LLKB directory layout and default files
    Init,

    /// Check store integrity
    Health,

    /// Show analytics
    Stats {
        /// Recompute analytics before printing
        #[arg(long)]
        refresh: bool,
    },

    /// Archive stale lessons and unused components (dry run unless --force)
    Prune {
        #[arg(long)]
        force: bool,
    },

    /// Find lessons and components relevant to a task
    Query {
        /// Free-text description of what is being written
        text: String,
        /// Lesson or component category (e.g. selector, timing, auth)
        #[arg(long)]
        category: Option<String>,
        /// Minimum confidence (default: extraction.confidenceThreshold)
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Maximum number of results
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// List history events for a day
    History {
        /// Date (YYYY-MM-DD, default: today UTC)
        #[arg(long)]
        date: Option<String>,
    },

    /// Record outcomes from a test run
    Record {
        #[command(subcommand)]
        subcommand: RecordSubcommand,
    },

    /// Inspect and validate config.yml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Health => cmd::health::run(&root, cli.json),
        Commands::Stats { refresh } => cmd::stats::run(&root, refresh, cli.json),
        Commands::Prune { force } => cmd::prune::run(&root, force, cli.json),
        Commands::Query {
            text,
            category,
            min_confidence,
            limit,
        } => cmd::query::run(&root, &text, category, min_confidence, limit, cli.json),
        Commands::History { date } => cmd::history::run(&root, date.as_deref(), cli.json),
        Commands::Record { subcommand } => cmd::record::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
