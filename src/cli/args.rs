//! CLI argument parsing using clap.

use clap::Parser;
use std::path::PathBuf;

/// Watch provisioned files and activate them as cloud-config
#[derive(Parser, Debug)]
#[command(
    name = "provision-watcher",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch provisioned files and activate them as cloud-config",
    next_line_help = true
)]
pub struct Cli {
    /// Directory treated as the filesystem root for watched paths [default: .]
    #[arg(long, value_name = "PATH")]
    pub watch_dir: Option<PathBuf>,

    /// Directory holding supporting shell scripts [default: ./scripts]
    #[arg(long, value_name = "PATH")]
    pub scripts_dir: Option<PathBuf>,

    /// Path to a settings.toml file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Apply files that already exist, then exit
    #[arg(long)]
    pub once: bool,

    /// Log the units that would be started instead of starting them
    #[arg(long)]
    pub dry_run: bool,

    /// Print the effective settings as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}
