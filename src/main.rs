//! `watchd` — eBPF-powered file activity monitor for Linux. See §6 for the CLI surface.

mod cli;
mod config;
mod core;
mod event;
mod filekey;
mod filter;
mod kernel;
mod logging;
mod path_cache;
mod payload;
mod ring_loop;
mod sink;
mod supervisor;

use std::fs;
use std::path::Path;
use std::process::{Command as ProcessCommand, ExitCode};

use anyhow::Context;
use clap::Parser;
use log::error;

use cli::{Args, Command};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_COMMIT: &str = match option_env!("WATCHD_GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};
const BUILD_DATE: &str = match option_env!("WATCHD_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

const SERVICE_NAME: &str = "watchd.service";
const EBPF_OBJECT_PATH: &str = "/usr/lib/watchd/watchd.bpf.o";

fn main() -> ExitCode {
    if let Err(err) = logging::init() {
        eprintln!("failed to initialize logger: {err:#}");
    }

    let args = Args::parse();

    let result = match args.command {
        Command::Run => run(&args),
        Command::Validate => validate(&args.config),
        Command::Version => {
            print_version();
            Ok(())
        }
        Command::Status => return status(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    if users::get_effective_uid() != 0 {
        anyhow::bail!("watchd run requires root privileges");
    }

    let sink = match &args.api {
        Some(path) => supervisor::build_sink(path)?,
        None => {
            log::info!("API file is required, use --api");
            log::info!("Disabled network logging");
            None
        }
    };

    let object_bytes = fs::read(EBPF_OBJECT_PATH)
        .with_context(|| format!("reading eBPF object '{EBPF_OBJECT_PATH}'"))?;

    supervisor::run(&args.config, &object_bytes, sink)?;
    Ok(())
}

fn validate(config_path: &Path) -> anyhow::Result<()> {
    let raw = config::read_config(config_path)?;
    config::validate_syntax(&raw)?;
    println!("Config file is valid");
    Ok(())
}

fn print_version() {
    println!("Version: {VERSION}");
    println!("Git Commit: {GIT_COMMIT}");
    println!("Build Date: {BUILD_DATE}");
}

fn status() -> ExitCode {
    match ProcessCommand::new("systemctl")
        .args(["is-active", SERVICE_NAME])
        .output()
    {
        Ok(output) => {
            let status_str = String::from_utf8_lossy(&output.stdout);
            if output.status.success() && status_str.trim() == "active" {
                ExitCode::SUCCESS
            } else {
                println!("watchd is down");
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            error!("running systemctl: {err}");
            println!("watchd is down");
            ExitCode::FAILURE
        }
    }
}
