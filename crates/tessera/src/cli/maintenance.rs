//! The `tessera maintenance` command.

use std::time::Duration;

use clap::{Args, Subcommand};
use serde_json::json;
use tessera_core::Config;

/// Arguments for the `maintenance` command.
#[derive(Args, Debug)]
pub struct MaintenanceArgs {
    #[command(subcommand)]
    pub command: MaintenanceCommand,
}

#[derive(Subcommand, Debug)]
pub enum MaintenanceCommand {
    /// Re-derive features of every entry from its stored original
    Recompute,

    /// Remove temp uploads left behind by interrupted ingestions
    Sweep {
        /// Only remove temp files older than this
        #[arg(long, default_value_t = 24)]
        max_age_hours: u64,
    },
}

/// Execute the maintenance command.
pub async fn execute(config: Config, args: MaintenanceArgs) -> anyhow::Result<()> {
    let tessera = super::open_catalog(config)?;
    match args.command {
        MaintenanceCommand::Recompute => {
            let report = tessera.recompute_features().await?;
            if report.failed > 0 {
                tracing::warn!("{} entries could not be recomputed", report.failed);
            }
            super::print_json(&report)
        }
        MaintenanceCommand::Sweep { max_age_hours } => {
            let max_age = Duration::from_secs(max_age_hours * 3600);
            let removed = tessera.sweep_temp_files(max_age)?;
            super::print_json(&json!({ "removed": removed }))
        }
    }
}
