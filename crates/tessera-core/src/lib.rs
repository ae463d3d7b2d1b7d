//! Tessera Core - image catalog library.
//!
//! Tessera ingests uploaded images into a catalog, rejects exact duplicates,
//! derives perceptual descriptors once at upload time, and answers two kinds
//! of read queries: "visually similar to this entry" and faceted search.
//!
//! # Architecture
//!
//! ```text
//! bytes → Validate → Hash → Dedup → Decode → Features → Thumbnail → Store → Tags
//! ```
//!
//! The SQLite catalog store is the single serialization point. Similarity is
//! ranked inside the store over stored luminance grids; search runs a planned
//! query whose count and page share one predicate.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tessera_core::{Config, IngestMetadata, SearchOptions, Tessera};
//!
//! #[tokio::main]
//! async fn main() -> tessera_core::Result<()> {
//!     let tessera = Tessera::open(Config::load()?)?;
//!
//!     let bytes = std::fs::read("./sunset.png")?;
//!     let entry = tessera.ingest(&bytes, "image/png", IngestMetadata::default()).await?;
//!
//!     let similar = tessera.find_similar(entry.id, 1, 24)?;
//!     let page = tessera.search(&SearchOptions::default())?;
//!     println!("{} similar, {} total", similar.total, page.total);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod flags;
pub mod pipeline;
pub mod search;
pub mod similarity;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use error::{ConfigError, IngestError, QueryError, Result, StoreError, TesseraError};
pub use flags::{Board, BoardSet, Purity, PuritySet};
pub use search::{AspectBucket, Direction, Order, ResolutionFilter, SearchOptions};
pub use similarity::{SimilarPage, SimilarityCache, SimilarityKey};
pub use store::CatalogStore;
pub use types::{
    CatalogEntry, Digest, EntryId, IngestMetadata, MaintenanceReport, Rgb, ScoredEntry, SearchPage,
};

use std::sync::Arc;
use std::time::Duration;

use pipeline::{AcceptedFormat, FileLayout, IngestPipeline, THUMBNAIL_EXTENSIONS};
use search::QueryPlanner;
use store::FeatureLayout;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The catalog: ingestion, similarity, search and deletion.
pub struct Tessera {
    config: Config,
    store: Arc<CatalogStore>,
    files: FileLayout,
    pipeline: IngestPipeline,
    planner: QueryPlanner,
}

impl Tessera {
    /// Open the catalog under the configured data directory, creating it if
    /// needed.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        tracing::debug!("Initializing Tessera v{}", VERSION);

        let files = FileLayout::new(config.data_dir());
        files.ensure()?;
        let store = Arc::new(CatalogStore::open(
            &config.database_path(),
            FeatureLayout::from(&config.features),
        )?);
        let pipeline = IngestPipeline::new(&config, store.clone(), files.clone());
        let planner = QueryPlanner::new(config.search.clone());

        let stale = store.count_layout_mismatches()?;
        if stale > 0 {
            tracing::warn!(
                "{} entries were derived with a different feature layout and cannot be \
                 read until `tessera maintenance recompute` runs",
                stale
            );
        }

        Ok(Self {
            config,
            store,
            files,
            pipeline,
            planner,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn files(&self) -> &FileLayout {
        &self.files
    }

    // ── Core operations ──────────────────────────────────────────────

    /// Ingest one upload. See [`IngestPipeline::ingest`].
    pub async fn ingest(
        &self,
        bytes: &[u8],
        mimetype: &str,
        metadata: IngestMetadata,
    ) -> std::result::Result<CatalogEntry, IngestError> {
        self.pipeline.ingest(bytes, mimetype, metadata).await
    }

    /// Entries ranked by visual similarity to `id`, excluding `id` itself.
    pub fn find_similar(
        &self,
        id: EntryId,
        page: u32,
        page_size: u32,
    ) -> std::result::Result<SimilarPage, QueryError> {
        self.check_paging(page, page_size)?;
        let offset = u64::from(page - 1) * u64::from(page_size);
        let (entries, total) = self.store.similar(id, page_size, offset)?;
        Ok(SimilarPage {
            entries,
            total,
            page,
            page_size,
        })
    }

    /// [`find_similar`](Self::find_similar) through a caller-owned cache.
    pub fn find_similar_cached(
        &self,
        cache: &mut SimilarityCache,
        id: EntryId,
        page: u32,
        page_size: u32,
    ) -> std::result::Result<SimilarPage, QueryError> {
        let key = SimilarityKey {
            entry: id,
            page,
            page_size,
        };
        // Read before computing: a write racing the query makes the page stale
        // under this generation, and the next lookup sees a newer one.
        let generation = self.store.generation();
        if let Some(hit) = cache.get(&key, generation) {
            return Ok(hit.clone());
        }
        let result = self.find_similar(id, page, page_size)?;
        cache.insert(key, result.clone(), generation);
        Ok(result)
    }

    /// A cache sized from `[similarity] cache_capacity`.
    pub fn similarity_cache(&self) -> SimilarityCache {
        SimilarityCache::new(self.config.similarity.cache_capacity)
    }

    /// Faceted search.
    pub fn search(&self, options: &SearchOptions) -> std::result::Result<SearchPage, QueryError> {
        let plan = self.planner.plan(options)?;
        let (entries, total) = self.store.execute_search(&plan)?;
        Ok(SearchPage {
            entries,
            total,
            page: plan.page,
            page_size: plan.page_size,
        })
    }

    /// Delete an entry. The store row goes first; the original and thumbnail
    /// are removed only after that commit. File removal failures are logged
    /// and leave an orphaned file, never a dangling row.
    ///
    /// The thumbnail is looked up under every known extension, since
    /// `thumbnail.format` may have changed since the entry was ingested.
    pub fn delete(&self, id: EntryId) -> std::result::Result<CatalogEntry, StoreError> {
        let entry = self.store.delete(id)?;

        let mut paths: Vec<_> = THUMBNAIL_EXTENSIONS
            .iter()
            .map(|ext| self.files.thumbnail_path(id, ext))
            .collect();
        if let Some(format) = AcceptedFormat::from_mimetype(&entry.mimetype) {
            paths.push(self.files.original_path(id, format.extension()));
        }
        for path in paths {
            if let Err(e) = FileLayout::remove(&path) {
                tracing::warn!("Failed to remove {:?} for deleted entry {}: {}", path, id, e);
            }
        }

        tracing::info!("Deleted entry {}", id);
        Ok(entry)
    }

    // ── Entry access and updates ─────────────────────────────────────

    pub fn get(&self, id: EntryId) -> std::result::Result<CatalogEntry, StoreError> {
        self.store.get(id)
    }

    pub fn record_view(&self, id: EntryId) -> std::result::Result<u64, StoreError> {
        self.store.record_view(id)
    }

    pub fn add_favorite(&self, id: EntryId, user: &str) -> std::result::Result<bool, StoreError> {
        self.store.add_favorite(id, user)
    }

    pub fn remove_favorite(&self, id: EntryId, user: &str) -> std::result::Result<bool, StoreError> {
        self.store.remove_favorite(id, user)
    }

    pub fn set_boards(&self, id: EntryId, boards: BoardSet) -> std::result::Result<(), StoreError> {
        self.store.set_boards(id, boards)
    }

    pub fn set_purity(&self, id: EntryId, purity: PuritySet) -> std::result::Result<(), StoreError> {
        self.store.set_purity(id, purity)
    }

    pub fn set_featured(&self, id: EntryId, featured: bool) -> std::result::Result<(), StoreError> {
        self.store.set_featured(id, featured)
    }

    pub fn attach_tags(&self, id: EntryId, tags: &[String]) -> std::result::Result<Vec<String>, StoreError> {
        self.store.attach_tags(id, tags)
    }

    pub fn detach_tag(&self, id: EntryId, tag: &str) -> std::result::Result<bool, StoreError> {
        self.store.detach_tag(id, tag)
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Re-derive features for every entry from its stored original.
    pub async fn recompute_features(&self) -> std::result::Result<MaintenanceReport, StoreError> {
        self.pipeline.recompute_features().await
    }

    /// Remove temp uploads older than `max_age` left by interrupted ingestions.
    pub fn sweep_temp_files(&self, max_age: Duration) -> std::io::Result<usize> {
        let removed = self.files.sweep_temp(max_age)?;
        if removed > 0 {
            tracing::info!("Swept {} stale temp files", removed);
        }
        Ok(removed)
    }

    fn check_paging(&self, page: u32, page_size: u32) -> std::result::Result<(), QueryError> {
        if page < 1 {
            return Err(QueryError::MalformedQuery("page numbers start at 1".into()));
        }
        if !self.config.search.page_sizes.contains(&page_size) {
            return Err(QueryError::MalformedQuery(format!(
                "page size {} is not one of {:?}",
                page_size, self.config.search.page_sizes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, Tessera) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.data_dir = dir.path().to_path_buf();
        let tessera = Tessera::open(config).unwrap();
        (dir, tessera)
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_open_creates_layout() {
        let (dir, tessera) = open();
        assert!(dir.path().join("catalog.db").exists());
        assert!(tessera.files().originals_dir().exists());
        assert_eq!(tessera.config().processing.parallel_workers, 4);
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let mut config = Config::default();
        config.processing.parallel_workers = 0;
        assert!(matches!(
            Tessera::open(config),
            Err(TesseraError::Config(ConfigError::ValidationError(_)))
        ));
    }

    #[test]
    fn test_find_similar_validates_paging() {
        let (_dir, tessera) = open();
        assert!(matches!(
            tessera.find_similar(EntryId(1), 0, 24),
            Err(QueryError::MalformedQuery(_))
        ));
        assert!(matches!(
            tessera.find_similar(EntryId(1), 1, 10),
            Err(QueryError::MalformedQuery(_))
        ));
        assert!(matches!(
            tessera.find_similar(EntryId(1), 1, 24),
            Err(QueryError::Store(StoreError::NotFound(_)))
        ));
    }
}
