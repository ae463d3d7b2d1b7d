//! The `tessera search` command.

use clap::Args;
use tessera_core::{
    AspectBucket, BoardSet, Config, Direction, Order, PuritySet, ResolutionFilter, SearchOptions,
};

/// Arguments for the `search` command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Free text matched against tag names
    #[arg(short, long)]
    pub query: Option<String>,

    /// Boards to include (comma-separated, or `all`)
    #[arg(long, default_value = "all")]
    pub boards: BoardSet,

    /// Purity levels to include (comma-separated)
    #[arg(long, default_value = "sfw")]
    pub purity: PuritySet,

    /// Ordering: relevancy, date, views or favorites
    #[arg(long, default_value = "date")]
    pub order: Order,

    /// Direction: asc or desc
    #[arg(long, default_value = "desc")]
    pub sort: Direction,

    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Entries per page; must be one of `[search] page_sizes`
    #[arg(long)]
    pub per_page: Option<u32>,

    /// Resolution filter, e.g. 1920x1080
    #[arg(long)]
    pub resolution: Option<ResolutionFilter>,

    /// Treat --resolution as a minimum instead of an exact match
    #[arg(long, requires = "resolution")]
    pub at_least: bool,

    /// Aspect bucket: portrait, 5x4, 4x3, 16x10, 16x9 or ultrawide
    #[arg(long)]
    pub ratio: Option<AspectBucket>,
}

impl SearchArgs {
    fn into_options(self, default_page_size: u32) -> SearchOptions {
        let resolution = self.resolution.map(|r| {
            if self.at_least {
                ResolutionFilter::at_least(r.width, r.height)
            } else {
                r
            }
        });
        SearchOptions {
            boards: self.boards,
            purity: self.purity,
            query: self.query,
            resolution,
            aspect: self.ratio,
            order: self.order,
            direction: self.sort,
            page: self.page,
            page_size: self.per_page.unwrap_or(default_page_size),
        }
    }
}

/// Execute the search command.
pub async fn execute(config: Config, args: SearchArgs) -> anyhow::Result<()> {
    let options = args.into_options(config.search.default_page_size);
    let tessera = super::open_catalog(config)?;
    let page = tessera.search(&options)?;
    tracing::debug!(
        "Search matched {} entries, showing {}",
        page.total,
        page.entries.len()
    );
    super::print_json(&page)
}
