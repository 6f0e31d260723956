// ABOUTME: CLI entry point for mysql-dumpfs
// ABOUTME: Parses commands and routes to the write and read handlers

use clap::{Parser, Subcommand};
use mysql_dumpfs::commands;
use mysql_dumpfs::config::{self, ReadOverrides};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mysql-dumpfs")]
#[command(
    about = "Transcode MySQL dumps to and from a per-database, per-table directory tree",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a mysqldump stream into a directory tree
    Write {
        /// Dump file to read (defaults to stdin)
        #[arg(long, short)]
        input: Option<PathBuf>,
        /// Directory to write the tree into
        #[arg(long, short)]
        output: PathBuf,
        /// Limits: [-]database[/table] (comma-separated, repeatable)
        #[arg(long, value_delimiter = ',')]
        limits: Vec<String>,
        /// TOML config file with limits
        #[arg(long)]
        config: Option<PathBuf>,
        /// Do not print per-database/table progress
        #[arg(long, short)]
        quiet: bool,
    },
    /// Serialize a directory tree back into a mysqldump stream
    Read {
        /// Tree directory created by the write command
        #[arg(long, short)]
        input: PathBuf,
        /// Dump file to write (defaults to stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Limits: [-]database[/table] (comma-separated, repeatable)
        #[arg(long, value_delimiter = ',')]
        limits: Vec<String>,
        /// TOML config file with limits and read options
        #[arg(long)]
        config: Option<PathBuf>,
        /// Emit DROP DATABASE IF EXISTS before each database
        #[arg(long)]
        add_drop_database: bool,
        /// Emit one INSERT per row instead of extended INSERTs
        #[arg(long)]
        skip_extended_insert: bool,
        /// Maximum size in bytes of one extended INSERT statement
        #[arg(long)]
        max_extended_insert: Option<usize>,
        /// Do not print per-database/table progress
        #[arg(long, short)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout may be carrying the dump
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Write {
            input,
            output,
            limits,
            config: config_path,
            quiet,
        } => {
            let config = config::load_optional(config_path.as_deref())?;
            let limits = config.limits(&limits)?;
            commands::write(input, output, limits, quiet).await?;
        }
        Commands::Read {
            input,
            output,
            limits,
            config: config_path,
            add_drop_database,
            skip_extended_insert,
            max_extended_insert,
            quiet,
        } => {
            let config = config::load_optional(config_path.as_deref())?;
            let limits = config.limits(&limits)?;
            let options = config.read_options(&ReadOverrides {
                add_drop_database,
                skip_extended_insert,
                max_extended_insert,
            })?;
            commands::read(input, output, limits, options, quiet).await?;
        }
    }

    Ok(())
}
