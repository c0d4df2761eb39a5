//! CLI for the turbodl parallel downloader.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use turbodl_core::config;
use turbodl_core::partition::MAX_CHUNK_COUNT;

use commands::{run_checksum, run_completions, run_get, run_man, run_probe};

/// Top-level CLI for turbodl.
#[derive(Debug, Parser)]
#[command(name = "turbodl", version)]
#[command(about = "turbodl: parallel range-partitioned HTTP downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Options for `turbodl get`.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Link to download (direct URL, Google Drive or OneDrive share link).
    pub link: String,

    /// Number of parallel ranged requests (default from config, 8).
    #[arg(short = 'n', long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..=MAX_CHUNK_COUNT as u64))]
    pub chunks: Option<u64>,

    /// Destination directory (default from config, else the current directory).
    #[arg(short, long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Save under this name instead of the server's or URL's.
    #[arg(short, long, value_name = "NAME")]
    pub output: Option<String>,

    /// Replace an existing file with the same name.
    #[arg(long)]
    pub overwrite: bool,

    /// Expected SHA-256 (hex); the file is not kept if it does not match.
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,

    /// Abort the whole download after SECS seconds (0 = no limit).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Extra request header, e.g. -H 'Cookie: a=b'. Repeatable.
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Fail instead of using one stream when the server does not accept ranges.
    #[arg(long)]
    pub no_fallback: bool,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a file with parallel ranged requests.
    Get(GetArgs),

    /// Show size, filename and range support of a URL without downloading it.
    Probe {
        /// Link or direct URL.
        url: String,

        /// Extra request header. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },

    /// Print shell completions to stdout.
    Completions {
        /// Target shell.
        shell: Shell,
    },

    /// Print the man page (roff) to stdout.
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Get(args) => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_get(&cfg, args).await?
            }
            CliCommand::Probe { url, headers } => {
                let cfg = config::load_or_init()?;
                run_probe(&cfg, &url, &headers).await?
            }
            CliCommand::Checksum { path } => run_checksum(&path).await?,
            CliCommand::Completions { shell } => run_completions(shell)?,
            CliCommand::Man => run_man()?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
