//! The `tessera show` command.

use clap::Args;
use tessera_core::{Config, EntryId};

/// Arguments for the `show` command.
#[derive(Args, Debug)]
pub struct ShowArgs {
    pub id: i64,

    /// Count this as a view
    #[arg(long)]
    pub view: bool,
}

/// Execute the show command.
pub async fn execute(config: Config, args: ShowArgs) -> anyhow::Result<()> {
    let tessera = super::open_catalog(config)?;
    let id = EntryId(args.id);
    if args.view {
        let views = tessera.record_view(id)?;
        tracing::debug!("Entry {} now has {} views", id, views);
    }
    super::print_json(&tessera.get(id)?)
}
