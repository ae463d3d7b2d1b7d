//! Ingestion orchestration: upload bytes in, catalog entry out.
//!
//! ```text
//! Received → Hashed → DedupChecked → Decoded → FeatureExtracted
//!          → ThumbnailCreated → Persisted → TagsAttached → Complete
//! ```
//!
//! Any state may move to `Failed`. The upload and thumbnail live in temp
//! files until the store insert succeeds; on failure they are dropped, which
//! deletes them. Files moved into place after the insert are removed again,
//! together with the row, if a later step fails.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::{IngestError, StoreError};
use crate::store::CatalogStore;
use crate::types::{CatalogEntry, Digest, EntryId, Features, IngestMetadata, MaintenanceReport, NewEntry};

use super::decode::ImageDecoder;
use super::dedup::{DedupIndex, DedupOutcome};
use super::features::FeatureExtractor;
use super::files::FileLayout;
use super::hash::Hasher;
use super::thumbnail::ThumbnailRenderer;
use super::validate::{AcceptedFormat, Validator};

/// Where an ingestion attempt is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Received,
    Hashed,
    DedupChecked,
    Decoded,
    FeatureExtracted,
    ThumbnailCreated,
    Persisted,
    TagsAttached,
    Complete,
    Failed,
}

/// Logs state transitions of one ingestion.
#[derive(Debug)]
struct Progress {
    state: IngestState,
    started: Instant,
}

impl Progress {
    fn new() -> Self {
        tracing::debug!("Ingest: {:?}", IngestState::Received);
        Self {
            state: IngestState::Received,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: IngestState) {
        tracing::debug!("Ingest: {:?} -> {:?} ({:?})", self.state, next, self.started.elapsed());
        self.state = next;
    }

    fn fail(&mut self, err: &IngestError) {
        tracing::debug!("Ingest: {:?} -> Failed: {}", self.state, err);
        self.state = IngestState::Failed;
    }
}

/// The upload in its temp file, with its digest and dedup verdict.
struct Staged {
    upload: NamedTempFile,
    digest: Digest,
    outcome: DedupOutcome,
    hash_time: Duration,
}

/// Everything derived from the pixels in one blocking pass.
struct Derived {
    width: u32,
    height: u32,
    features: Features,
    thumbnail: NamedTempFile,
}

/// The ingestion pipeline and its stage components.
pub struct IngestPipeline {
    validator: Validator,
    decoder: Arc<ImageDecoder>,
    extractor: Arc<FeatureExtractor>,
    renderer: Arc<ThumbnailRenderer>,
    dedup: Arc<DedupIndex>,
    store: Arc<CatalogStore>,
    files: FileLayout,
    workers: Arc<Semaphore>,
}

impl IngestPipeline {
    pub fn new(config: &Config, store: Arc<CatalogStore>, files: FileLayout) -> Self {
        Self {
            validator: Validator::new(&config.processing, config.limits.clone()),
            decoder: Arc::new(ImageDecoder::new(config.limits.clone())),
            extractor: Arc::new(FeatureExtractor::new(config.features.clone())),
            renderer: Arc::new(ThumbnailRenderer::new(config.thumbnail.clone())),
            dedup: Arc::new(DedupIndex::new(store.clone(), files.clone())),
            store,
            files,
            workers: Arc::new(Semaphore::new(config.processing.parallel_workers)),
        }
    }

    /// Ingest one upload.
    ///
    /// Byte-identical content already in the catalog fails with
    /// [`IngestError::DuplicateContent`], also when a concurrent ingestion
    /// of the same bytes wins the insert.
    pub async fn ingest(
        &self,
        bytes: &[u8],
        mimetype: &str,
        metadata: IngestMetadata,
    ) -> Result<CatalogEntry, IngestError> {
        let mut progress = Progress::new();
        match self.run(bytes, mimetype, metadata, &mut progress).await {
            Ok(entry) => {
                progress.advance(IngestState::Complete);
                tracing::info!(
                    "Ingested entry {} ({}x{}, {}) in {:?}",
                    entry.id,
                    entry.width,
                    entry.height,
                    entry.mimetype,
                    progress.started.elapsed()
                );
                Ok(entry)
            }
            Err(e) => {
                progress.fail(&e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        bytes: &[u8],
        mimetype: &str,
        metadata: IngestMetadata,
        progress: &mut Progress,
    ) -> Result<CatalogEntry, IngestError> {
        let format = self.validator.validate(bytes, mimetype)?;
        if metadata.boards.is_empty() || metadata.purity.is_empty() {
            return Err(IngestError::Rejected {
                reason: "board and purity must each name at least one value".into(),
            });
        }
        let bytes: Arc<[u8]> = Arc::from(bytes);

        let staged = self.stage(bytes.clone()).await?;
        tracing::trace!("  Hash: {:?}", staged.hash_time);
        progress.advance(IngestState::Hashed);

        match staged.outcome {
            DedupOutcome::Unique => {}
            DedupOutcome::Duplicate(existing_id) => {
                return Err(IngestError::DuplicateContent { existing_id })
            }
            DedupOutcome::Collision(id) => {
                return Err(IngestError::PersistFailure {
                    message: format!("digest {} collides with entry {id}", staged.digest),
                })
            }
            // The unique digest constraint would refuse the insert anyway.
            DedupOutcome::Unverified(existing_id) => {
                return Err(IngestError::DuplicateContent { existing_id })
            }
        }
        progress.advance(IngestState::DedupChecked);

        let file_size = bytes.len() as u64;
        let derived = self.derive(bytes, format, progress).await?;

        let id = self.insert(&NewEntry {
            digest: staged.digest,
            width: derived.width,
            height: derived.height,
            mimetype: format.mimetype().to_string(),
            file_size,
            boards: metadata.boards,
            purity: metadata.purity,
            features: derived.features,
            featured: metadata.featured,
        })?;

        let original_path = self.files.original_path(id, format.extension());
        let thumbnail_path = self.files.thumbnail_path(id, self.renderer.extension());
        if let Err(source) = self.files.persist(staged.upload, &original_path) {
            self.compensate(id, &[]);
            return Err(IngestError::Storage {
                stage: "persist original",
                source,
            });
        }
        if let Err(source) = self.files.persist(derived.thumbnail, &thumbnail_path) {
            self.compensate(id, &[&original_path]);
            return Err(IngestError::Storage {
                stage: "persist thumbnail",
                source,
            });
        }
        progress.advance(IngestState::Persisted);

        if !metadata.tags.is_empty() {
            if let Err(e) = self.store.attach_tags(id, &metadata.tags) {
                self.compensate(id, &[&original_path, &thumbnail_path]);
                return Err(IngestError::PersistFailure {
                    message: format!("attaching tags failed: {e}"),
                });
            }
        }
        progress.advance(IngestState::TagsAttached);

        self.store.get(id).map_err(|e| IngestError::PersistFailure {
            message: e.to_string(),
        })
    }

    /// Write the upload to a temp file, digest it and check it against the
    /// catalog. Each step reads or writes the whole payload, so all of it
    /// runs on the pool.
    async fn stage(&self, bytes: Arc<[u8]>) -> Result<Staged, IngestError> {
        let files = self.files.clone();
        let dedup = self.dedup.clone();

        self.on_pool("staging", move || {
            let upload = files.write_temp(&bytes).map_err(|source| IngestError::Storage {
                stage: "temp upload",
                source,
            })?;
            drop(bytes);

            // Hash from the temp file, so the digest covers exactly what will be stored.
            let start = Instant::now();
            let digest = Hasher::digest_file(upload.path()).map_err(IngestError::HashFailure)?;
            let hash_time = start.elapsed();

            let outcome = dedup.check(&digest, upload.path())?;
            Ok(Staged {
                upload,
                digest,
                outcome,
                hash_time,
            })
        })
        .await
    }

    /// Decode, extract, render and stage the thumbnail on the pool.
    async fn derive(
        &self,
        bytes: Arc<[u8]>,
        format: AcceptedFormat,
        progress: &mut Progress,
    ) -> Result<Derived, IngestError> {
        let decoder = self.decoder.clone();
        let extractor = self.extractor.clone();
        let renderer = self.renderer.clone();
        let files = self.files.clone();

        let (derived, timings) = self
            .on_pool("derive", move || {
                let start = Instant::now();
                let decoded = decoder.decode(&bytes, format)?;
                drop(bytes);
                let decode_time = start.elapsed();

                let features = extractor.extract(&decoded.image);
                let features_time = start.elapsed();

                let encoded = renderer.render_bytes(&decoded.image)?;
                let thumbnail = files.write_temp(&encoded).map_err(|source| IngestError::Storage {
                    stage: "temp thumbnail",
                    source,
                })?;
                let thumbnail_time = start.elapsed();

                Ok((
                    Derived {
                        width: decoded.width,
                        height: decoded.height,
                        features,
                        thumbnail,
                    },
                    [decode_time, features_time, thumbnail_time],
                ))
            })
            .await?;

        tracing::trace!("  Decode: {:?}", timings[0]);
        progress.advance(IngestState::Decoded);
        tracing::trace!("  Features: {:?}", timings[1] - timings[0]);
        progress.advance(IngestState::FeatureExtracted);
        tracing::trace!("  Thumbnail: {:?}", timings[2] - timings[1]);
        progress.advance(IngestState::ThumbnailCreated);

        Ok(derived)
    }

    /// Run blocking work on a worker thread while holding a pool permit.
    async fn on_pool<T, F>(&self, stage: &'static str, task: F) -> Result<T, IngestError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, IngestError> + Send + 'static,
    {
        let _permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| IngestError::Storage {
                stage,
                source: io::Error::other("worker pool is shut down"),
            })?;

        tokio::task::spawn_blocking(task)
            .await
            .map_err(|e| IngestError::Storage {
                stage,
                source: io::Error::other(format!("worker task failed: {e}")),
            })?
    }

    fn insert(&self, entry: &NewEntry) -> Result<EntryId, IngestError> {
        match self.store.insert(entry) {
            Ok(id) => Ok(id),
            Err(StoreError::UniqueViolation { .. }) => {
                // Lost the race against a concurrent upload of the same bytes.
                match self.store.find_by_digest(&entry.digest) {
                    Ok(Some((existing_id, _))) => Err(IngestError::DuplicateContent { existing_id }),
                    Ok(None) => Err(IngestError::PersistFailure {
                        message: format!("digest {} conflicted but is not stored", entry.digest),
                    }),
                    Err(e) => Err(IngestError::PersistFailure {
                        message: e.to_string(),
                    }),
                }
            }
            Err(e) => Err(IngestError::PersistFailure {
                message: e.to_string(),
            }),
        }
    }

    /// Undo a partially persisted ingestion: drop the row, then the files.
    fn compensate(&self, id: EntryId, placed: &[&Path]) {
        if let Err(e) = self.store.delete(id) {
            tracing::warn!("Failed to roll back entry {}: {}", id, e);
            return;
        }
        for path in placed {
            if let Err(e) = FileLayout::remove(path) {
                tracing::warn!("Failed to remove {:?} during rollback: {}", path, e);
            }
        }
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Re-derive stored features of every entry from its original file.
    ///
    /// Per-entry failures are logged and counted; they do not stop the pass.
    pub async fn recompute_features(&self) -> Result<MaintenanceReport, StoreError> {
        let entries = self.store.entry_files()?;
        let mut report = MaintenanceReport::default();
        tracing::info!("Recomputing features for {} entries", entries.len());

        for (id, mimetype) in entries {
            match self.recompute_one(id, &mimetype).await {
                Ok(features) => match self.store.update_features(id, &features) {
                    Ok(()) => report.updated += 1,
                    Err(StoreError::NotFound(_)) => {
                        tracing::debug!("Entry {} deleted during recompute", id);
                    }
                    Err(e) => return Err(e),
                },
                Err(e) => {
                    tracing::warn!("Recompute failed for entry {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Recompute finished: {} updated, {} failed",
            report.updated,
            report.failed
        );
        Ok(report)
    }

    async fn recompute_one(&self, id: EntryId, mimetype: &str) -> Result<Features, IngestError> {
        let format = AcceptedFormat::from_mimetype(mimetype).ok_or_else(|| IngestError::DecodeFailure {
            message: format!("unknown stored mimetype '{mimetype}'"),
        })?;
        let path = self.files.original_path(id, format.extension());
        let decoder = self.decoder.clone();
        let extractor = self.extractor.clone();

        self.on_pool("recompute", move || {
            let decoded = decoder.decode_path(&path, format)?;
            Ok(extractor.extract(&decoded.image))
        })
        .await
    }
}
