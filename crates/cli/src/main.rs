mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use scanvault_core::config::Config;
use scanvault_core::Archive;
use tracing_subscriber::EnvFilter;

/// scanvault: keeps scanned photo metadata and its catalog in step
#[derive(Parser)]
#[command(name = "scanvault", version, about)]
struct Cli {
    /// Path to the catalog database [default: ~/.scanvault/catalog.db]
    #[arg(long, global = true, env = "SCANVAULT_CATALOG")]
    catalog: Option<PathBuf>,

    /// Path to the exiftool executable [default: exiftool]
    #[arg(long, global = true, env = "SCANVAULT_EXIFTOOL")]
    exiftool: Option<PathBuf>,

    /// Configuration file [default: ~/.scanvault/config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index image files and record the facts in their metadata
    Index {
        /// Files or directories to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Source to attach to the indexed images
        #[arg(long)]
        source: Option<String>,
    },
    /// Write catalog changes back into the image files
    Sync,
    /// Show catalog status summary
    Status,
    /// Print the combined metadata of one file as JSON
    Read {
        /// Image file to read
        file: PathBuf,
    },
    /// Remove all managed metadata from image files
    Clear {
        /// Image files to clear
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Flags and environment win over the config file, which wins over the
/// defaults.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(catalog) = &cli.catalog {
        config.catalog_path = catalog.clone();
    }
    if let Some(exiftool) = &cli.exiftool {
        config.exiftool_path = exiftool.clone();
    }
    Ok(config)
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Read { file } => {
            let archive = Archive::open(&config)?;
            commands::read::run(&archive, &file)?
        }
        Commands::Clear { files } => {
            let archive = Archive::open(&config)?;
            commands::clear::run(&archive, &files)?
        }
        Commands::Index { paths, source } => {
            let archive = Archive::open(&config)?;
            commands::index::run(&archive, &paths, source.as_deref())?
        }
        Commands::Sync => commands::sync::run(&Archive::open(&config)?)?,
        Commands::Status => commands::status::run(&Archive::open(&config)?, &config)?,
    }

    Ok(())
}
