//! Command handlers. Each prints its result to stdout as JSON.

pub mod config;
pub mod delete;
pub mod favorite;
pub mod ingest;
pub mod maintenance;
pub mod search;
pub mod show;
pub mod similar;
pub mod tag;

use std::path::Path;

use serde::Serialize;
use tessera_core::{Config, ConfigError, Tessera};

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Open the catalog described by `config`.
pub fn open_catalog(config: Config) -> anyhow::Result<Tessera> {
    let data_dir = config.data_dir();
    Tessera::open(config).map_err(|e| {
        anyhow::anyhow!("Failed to open catalog at {}: {e}", data_dir.display())
    })
}

/// Pretty-print `value` as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
