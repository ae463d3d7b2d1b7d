//! The `tessera favorite` command.

use clap::Args;
use serde_json::json;
use tessera_core::{Config, EntryId};

/// Arguments for the `favorite` command.
#[derive(Args, Debug)]
pub struct FavoriteArgs {
    pub id: i64,

    /// User recording the favorite
    #[arg(long, env = "TESSERA_USER")]
    pub user: String,

    /// Remove the favorite instead of adding it
    #[arg(long)]
    pub remove: bool,
}

/// Execute the favorite command.
pub async fn execute(config: Config, args: FavoriteArgs) -> anyhow::Result<()> {
    let tessera = super::open_catalog(config)?;
    let id = EntryId(args.id);
    let changed = if args.remove {
        tessera.remove_favorite(id, &args.user)?
    } else {
        tessera.add_favorite(id, &args.user)?
    };
    if !changed {
        tracing::info!("Favorite for entry {} by {} was already in that state", id, args.user);
    }
    let entry = tessera.get(id)?;
    super::print_json(&json!({
        "id": id,
        "changed": changed,
        "favorites": entry.counters.favorites,
    }))
}
