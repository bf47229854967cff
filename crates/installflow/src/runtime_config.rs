//! Configuration loading and tracing setup.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{Context, Result};
use installflow_core::Config;
use tracing_subscriber::EnvFilter;

use super::Args;

pub(super) fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config.as_ref() {
        Some(path) => Config::load_from_path(path).context("read config from path")?,
        None => Config::load_default().context("read default config")?,
    };
    if args.dry_run {
        config.general.simulate = true;
    }
    Ok(config)
}

/// Send tracing output to the configured log file; the terminal belongs to the UI.
pub(super) fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            config
                .general
                .log_level
                .clone()
                .unwrap_or_else(|| "info".to_string()),
        )
    });

    let path = &config.general.log_file;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("create log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}
