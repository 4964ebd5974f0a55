//! Lineage CLI - include graphs for template trees from the command line.
//!
//! Every command scans the tree first; the graph lives only as long as the
//! process. Use `lineage snapshot` and `--load` to carry it between runs.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod cli;

/// Lineage: incremental include graphs for template and stylesheet trees.
#[derive(Parser)]
#[command(name = "lineage")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Root directory of the tree (defaults to current directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Language preset (jade, pug, less, sass, stylus, template)
    #[arg(short, long, global = true)]
    language: Option<String>,

    /// Config file (defaults to lineage.yaml in the root, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Preload a snapshot written by `lineage snapshot`
    #[arg(long, global = true)]
    load: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the tree and report what was found
    Scan,

    /// List the files a file includes
    Deps {
        /// File path (relative to the root or absolute)
        file: PathBuf,
    },

    /// List the files that include a file
    Dependents {
        /// File path (relative to the root or absolute)
        file: PathBuf,
    },

    /// List the root files to rebuild when a file changes
    Affected {
        /// File path (relative to the root or absolute)
        file: PathBuf,
    },

    /// Analyze the impact of changing a file
    Impact {
        /// File path (relative to the root or absolute)
        file: PathBuf,
    },

    /// Detect circular includes
    Cycles,

    /// Print the graph as JSON
    Snapshot,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "lineage=warn",
        1 => "lineage=info",
        2 => "lineage=debug",
        _ => "lineage=trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = match cli.root {
        Some(root) => root,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!(
                    "{}: failed to get current directory: {e}",
                    "error".red().bold()
                );
                return ExitCode::FAILURE;
            }
        },
    };

    let context = cli::Context {
        root,
        language: cli.language,
        config: cli.config,
        load: cli.load,
    };

    let result = match cli.command {
        Commands::Scan => cli::scan::run(&context).await,
        Commands::Deps { file } => cli::query::deps(&context, &file).await,
        Commands::Dependents { file } => cli::query::dependents(&context, &file).await,
        Commands::Affected { file } => cli::query::affected(&context, &file).await,
        Commands::Impact { file } => cli::query::impact(&context, &file).await,
        Commands::Cycles => cli::cycles::run(&context).await,
        Commands::Snapshot => cli::snapshot::run(&context).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            // Show cause chain for nested errors
            for cause in e.chain().skip(1) {
                eprintln!("  {}: {cause}", "caused by".dimmed());
            }
            ExitCode::FAILURE
        }
    }
}
