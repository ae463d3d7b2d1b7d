//! The `tessera similar` command.

use clap::Args;
use tessera_core::{Config, EntryId};

/// Arguments for the `similar` command.
#[derive(Args, Debug)]
pub struct SimilarArgs {
    /// Reference entry id
    pub id: i64,

    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Entries per page; must be one of `[search] page_sizes`
    #[arg(long)]
    pub per_page: Option<u32>,
}

/// Execute the similar command.
pub async fn execute(config: Config, args: SimilarArgs) -> anyhow::Result<()> {
    let page_size = args.per_page.unwrap_or(config.search.default_page_size);
    let tessera = super::open_catalog(config)?;
    let page = tessera.find_similar(EntryId(args.id), args.page, page_size)?;
    if page.has_more() {
        tracing::debug!("More similar entries on page {}", args.page + 1);
    }
    super::print_json(&page)
}
