mod cli;
mod display;
mod error;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, RunCommand};
use ejiview::config::Config;
use error::{EjiCliError, EjiCliResult};
use log::debug;

const DEFAULT_LOGGING_LEVEL: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    let _ =
        std::env::var("RUST_LOG").map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();
    let args = Cli::parse();
    debug!("args: {args:?}");
    let config: Config = read_config_from_toml()?;
    debug!("config: {config:?}");

    if let Some(command) = args.command {
        command.run(config).await?;
    }
    Ok(())
}

fn read_config_from_toml() -> EjiCliResult<Config> {
    // macOS: ~/Library/Application Support/ejiview/config.toml
    let file_path = dirs::config_dir()
        .ok_or(EjiCliError::NoConfigDir)?
        .join("ejiview")
        .join("config.toml");
    read_config(&file_path)
}

/// Config from a TOML file, the defaults if the file does not exist.
fn read_config(file_path: &Path) -> EjiCliResult<Config> {
    match std::fs::read_to_string(file_path) {
        Ok(contents) => toml::from_str(&contents).map_err(|source| EjiCliError::InvalidConfig {
            path: file_path.to_string_lossy().to_string(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(e.into()),
    }
}
