//! The `tessera delete` command.

use clap::Args;
use tessera_core::{Config, EntryId};

/// Arguments for the `delete` command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub id: i64,
}

/// Execute the delete command, printing the removed entry.
pub async fn execute(config: Config, args: DeleteArgs) -> anyhow::Result<()> {
    let tessera = super::open_catalog(config)?;
    let entry = tessera.delete(EntryId(args.id))?;
    super::print_json(&entry)
}
