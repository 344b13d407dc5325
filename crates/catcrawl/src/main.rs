//! catcrawl: verify newly cataloged datasets and link them to the metadata store.
//!
//! Usage:
//!     catcrawl run [--once]
//!     catcrawl unlinked [--json]
//!     catcrawl relink
//!     catcrawl register --dir /data/raw --prefix raw
//!     catcrawl register --file /data/raw/a.fits --dataset raw.a.fits
//!     catcrawl deregister --dir /data/raw --prefix raw

use catcrawl_logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "catcrawl", version, about = "Dataset catalog crawler")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (defaults to $CATCRAWL_HOME/catcrawl.toml)
    #[arg(short, long, global = true, env = "CATCRAWL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl the watch folder every interval (default)
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// List datasets whose file id link failed
    Unlinked {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retry the file id link for every unlinked dataset
    Relink,

    /// Register the FITS files under a directory, or one file, as datasets
    Register {
        /// Directory to walk
        #[arg(long, required_unless_present = "file", conflicts_with = "file")]
        dir: Option<PathBuf>,

        /// Dataset name prefix (with --dir)
        #[arg(long, default_value = "")]
        prefix: String,

        /// Single file to register
        #[arg(long, requires = "dataset")]
        file: Option<PathBuf>,

        /// Dataset name for --file
        #[arg(long, requires = "file")]
        dataset: Option<String>,
    },

    /// Delete datasets created by `register`
    Deregister {
        /// Directory that was registered
        #[arg(long, required_unless_present = "dataset", conflicts_with = "dataset")]
        dir: Option<PathBuf>,

        /// Dataset name prefix used at registration
        #[arg(long, default_value = "")]
        prefix: String,

        /// Single dataset name to delete
        #[arg(long)]
        dataset: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "catcrawl",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start async runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::run_command(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
