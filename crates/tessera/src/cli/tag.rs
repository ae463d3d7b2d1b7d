//! The `tessera tag` command.

use clap::{Args, Subcommand};
use serde_json::json;
use tessera_core::{Config, EntryId};

/// Arguments for the `tag` command.
#[derive(Args, Debug)]
pub struct TagArgs {
    #[command(subcommand)]
    pub command: TagCommand,
}

#[derive(Subcommand, Debug)]
pub enum TagCommand {
    /// Attach tags to an entry
    Add {
        id: i64,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Detach one tag from an entry
    Remove { id: i64, tag: String },

    /// List every tag with the number of entries carrying it
    List,
}

/// Execute the tag command.
pub async fn execute(config: Config, args: TagArgs) -> anyhow::Result<()> {
    let tessera = super::open_catalog(config)?;
    match args.command {
        TagCommand::Add { id, tags } => {
            let attached = tessera.attach_tags(EntryId(id), &tags)?;
            super::print_json(&json!({ "id": id, "attached": attached }))
        }
        TagCommand::Remove { id, tag } => {
            let removed = tessera.detach_tag(EntryId(id), &tag)?;
            super::print_json(&json!({ "id": id, "removed": removed }))
        }
        TagCommand::List => {
            let counts: Vec<_> = tessera
                .store()
                .tag_counts()?
                .into_iter()
                .map(|(name, entries)| json!({ "name": name, "entries": entries }))
                .collect();
            super::print_json(&counts)
        }
    }
}
