//! Command-line surface: the persistent `--config`/`--api` flags and the four `watchd`
//! subcommands (§6).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const DEFAULT_CONFIG_PATH: &str = "/etc/watchd/config.txt";

#[derive(Parser, Debug)]
#[command(name = "watchd", version, about = "eBPF-powered file activity monitor for Linux")]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the policy config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Path to the API credentials JSON file; omitting it disables the network sink
    #[arg(long, global = true)]
    pub api: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the daemon
    Run,
    /// Validate the config file and exit
    Validate,
    /// Print version, git commit, and build date
    Version,
    /// Check whether watchd.service is active
    Status,
}
