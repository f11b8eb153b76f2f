//! ydb CLI
//!
//! Command-line access to a ydb environment directory.
//!
//! # Commands
//!
//! - `put`, `get`, `del` - Single-key operations
//! - `scan` - List pairs in key order
//! - `stat` - Key and pair counts
//! - `remove`, `rename` - Drop or move database files
//! - `dump-log` - Print log records for debugging
//! - `checkpoint` - Write back every file and truncate the log

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use error::CliError;
use output::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ydb command-line tools.
#[derive(Parser)]
#[command(name = "ydb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Environment home directory
    #[arg(global = true, short = 'H', long, default_value = ".")]
    home: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Names a database: a file and an optional sub-database.
#[derive(clap::Args)]
struct Target {
    /// Database file, relative to the home directory
    file: String,

    /// Sub-database inside the file
    #[arg(short, long)]
    subdb: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a value
    Put {
        #[command(flatten)]
        target: Target,
        /// Key
        key: String,
        /// Value
        value: String,
        /// Fail if the key already exists
        #[arg(long)]
        no_overwrite: bool,
    },

    /// Print the value stored under a key
    Get {
        #[command(flatten)]
        target: Target,
        /// Key
        key: String,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Delete a key and its duplicates
    Del {
        #[command(flatten)]
        target: Target,
        /// Key
        key: String,
    },

    /// List pairs in key order
    Scan {
        #[command(flatten)]
        target: Target,
        /// Start at the first key not less than this
        #[arg(long)]
        from: Option<String>,
        /// Maximum number of pairs to print
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show key and pair counts
    Stat {
        #[command(flatten)]
        target: Target,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Remove a database file or one sub-database
    Remove {
        #[command(flatten)]
        target: Target,
    },

    /// Rename a database file
    Rename {
        /// Current file name
        from: String,
        /// New file name
        to: String,
    },

    /// Dump log records for debugging
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Write back every file and truncate the log
    Checkpoint,

    /// Show version information
    Version,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let home = cli.home;
    match cli.command {
        Commands::Put {
            target,
            key,
            value,
            no_overwrite,
        } => commands::data::put(&home, &target.into(), &key, &value, no_overwrite),
        Commands::Get {
            target,
            key,
            format,
        } => commands::data::get(&home, &target.into(), &key, format),
        Commands::Del { target, key } => commands::data::del(&home, &target.into(), &key),
        Commands::Scan {
            target,
            from,
            limit,
            format,
        } => commands::data::scan(&home, &target.into(), from.as_deref(), limit, format),
        Commands::Stat { target, format } => commands::data::stat(&home, &target.into(), format),
        Commands::Remove { target } => commands::files::remove(&home, &target.into()),
        Commands::Rename { from, to } => commands::files::rename(&home, &from, &to),
        Commands::DumpLog { limit, format } => commands::dump_log::run(&home, limit, format),
        Commands::Checkpoint => commands::checkpoint::run(&home),
        Commands::Version => {
            let (_, _, _, text) = ydb_core::version();
            println!("ydb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("{text}");
            Ok(())
        }
    }
}

impl From<Target> for commands::DbName {
    fn from(target: Target) -> Self {
        Self {
            file: target.file,
            subdb: target.subdb,
        }
    }
}
