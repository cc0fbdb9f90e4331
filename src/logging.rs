//! Structured logging bootstrap (§4.10). `run` initializes this before anything else so that
//! startup failures are themselves logged. A `log4rs.yml` next to the working directory wins if
//! present; otherwise a console + rotating file config is built programmatically.

use std::fs;
use std::path::Path;

use anyhow::Context;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const CONFIG_PATH: &str = "log4rs.yml";
const LOG_FILE: &str = "/var/log/watchd/watchd.log";
const ROLL_PATTERN: &str = "/var/log/watchd/watchd.{}.log";
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
const MAX_ROLLED_FILES: u32 = 5;
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {l} [{t}] {m}{n}";

/// Initializes the global logger. Never fatal to the caller: a broken custom config file is the
/// only error surfaced, since a missing one just falls through to the built-in default.
pub fn init() -> anyhow::Result<()> {
    if Path::new(CONFIG_PATH).exists() {
        return log4rs::init_file(CONFIG_PATH, Default::default())
            .with_context(|| format!("loading logger config '{CONFIG_PATH}'"));
    }
    log4rs::init_config(default_config()?).context("initializing default logging config")?;
    Ok(())
}

fn default_config() -> anyhow::Result<Config> {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let mut builder =
        Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root_appenders = vec!["console"];

    match rolling_file_appender() {
        Ok(file) => {
            builder = builder.appender(Appender::builder().build("file", Box::new(file)));
            root_appenders.push("file");
        }
        Err(err) => eprintln!("disabling file logging: {err:#}"),
    }

    let mut root = Root::builder();
    for appender in root_appenders {
        root = root.appender(appender);
    }

    Ok(builder.build(root.build(LevelFilter::Info))?)
}

fn rolling_file_appender() -> anyhow::Result<RollingFileAppender> {
    if let Some(dir) = Path::new(LOG_FILE).parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory '{}'", dir.display()))?;
    }
    let trigger = SizeTrigger::new(MAX_LOG_BYTES);
    let roller = FixedWindowRoller::builder().build(ROLL_PATTERN, MAX_ROLLED_FILES)?;
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(LOG_FILE, Box::new(policy))?;
    Ok(appender)
}
