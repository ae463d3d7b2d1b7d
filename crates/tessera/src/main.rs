//! Tessera CLI - image catalog with duplicate rejection, similarity and
//! faceted search.
//!
//! # Usage
//!
//! ```bash
//! # Ingest images
//! tessera ingest sunset.png beach.jpg --tag sunset --purity sfw
//!
//! # Search by tag text, newest first
//! tessera search --query sunset --per-page 24
//!
//! # Entries that look like entry 42
//! tessera similar 42
//!
//! # View configuration
//! tessera config show
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Tessera - image catalog with duplicate rejection, similarity and faceted search.
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Add images to the catalog
    Ingest(cli::ingest::IngestArgs),

    /// Faceted search over the catalog
    Search(cli::search::SearchArgs),

    /// Entries visually similar to a given entry
    Similar(cli::similar::SimilarArgs),

    /// Print one entry
    Show(cli::show::ShowArgs),

    /// Delete an entry and its files
    Delete(cli::delete::DeleteArgs),

    /// Add or remove a user's favorite
    Favorite(cli::favorite::FavoriteArgs),

    /// Attach or detach tags
    Tag(cli::tag::TagArgs),

    /// Catalog maintenance (feature recomputation, temp sweeps)
    Maintenance(cli::maintenance::MaintenanceArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `tessera config path`."
            );
            tessera_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Tessera v{}", tessera_core::VERSION);

    match cli.command {
        Commands::Ingest(args) => cli::ingest::execute(config, args).await,
        Commands::Search(args) => cli::search::execute(config, args).await,
        Commands::Similar(args) => cli::similar::execute(config, args).await,
        Commands::Show(args) => cli::show::execute(config, args).await,
        Commands::Delete(args) => cli::delete::execute(config, args).await,
        Commands::Favorite(args) => cli::favorite::execute(config, args).await,
        Commands::Tag(args) => cli::tag::execute(config, args).await,
        Commands::Maintenance(args) => cli::maintenance::execute(config, args).await,
        Commands::Config(args) => cli::config::execute(config, cli.config, args).await,
    }
}
