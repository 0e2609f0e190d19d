mod cli;
mod commands;
mod config;
mod terminal;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use easel_logging::{easel_info, LogDestination, DEFAULT_LOG_FILE};
use log::LevelFilter;

use crate::cli::Cli;
use crate::config::{AppConfig, CREDENTIAL_ENV};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    config.apply_overrides(&cli, std::env::var(CREDENTIAL_ENV).ok());

    let level = if cli.verbose {
        LevelFilter::Debug
    } else if config.log_to_file {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    let destination = if config.log_to_file {
        LogDestination::Both(PathBuf::from(DEFAULT_LOG_FILE))
    } else {
        LogDestination::Terminal
    };
    easel_logging::initialize(destination, level);
    easel_info!(
        "easel {} against {} (slot {:?})",
        env!("CARGO_PKG_VERSION"),
        config.engine.base_url,
        config.slot_path
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(commands::run(cli, config))
}
