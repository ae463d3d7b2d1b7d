//! Exact-duplicate detection.
//!
//! A digest match alone does not prove duplication: the stored original of
//! the matching entry is compared byte for byte with the upload first. This
//! check is advisory; the store's unique digest constraint still decides
//! races between concurrent uploads.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;

use crate::error::IngestError;
use crate::store::CatalogStore;
use crate::types::{Digest, EntryId};

use super::files::FileLayout;
use super::validate::AcceptedFormat;

const COMPARE_CHUNK: usize = 64 * 1024;

/// Result of checking an upload against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// No entry has this digest
    Unique,
    /// Same digest and byte-identical original
    Duplicate(EntryId),
    /// Same digest but different bytes
    Collision(EntryId),
    /// Same digest, but the stored original is missing so the bytes could
    /// not be compared
    Unverified(EntryId),
}

/// Looks up digests in the store and verifies matches on disk.
pub struct DedupIndex {
    store: Arc<CatalogStore>,
    files: FileLayout,
}

impl DedupIndex {
    pub fn new(store: Arc<CatalogStore>, files: FileLayout) -> Self {
        Self { store, files }
    }

    /// Check `digest` of the upload stored at `upload` against the catalog.
    pub fn check(&self, digest: &Digest, upload: &Path) -> Result<DedupOutcome, IngestError> {
        let found = self
            .store
            .find_by_digest(digest)
            .map_err(|e| IngestError::PersistFailure {
                message: format!("digest lookup failed: {e}"),
            })?;
        let Some((id, mimetype)) = found else {
            return Ok(DedupOutcome::Unique);
        };

        let Some(format) = AcceptedFormat::from_mimetype(&mimetype) else {
            return Ok(DedupOutcome::Unverified(id));
        };
        let original = self.files.original_path(id, format.extension());

        match files_identical(&original, upload) {
            Ok(true) => Ok(DedupOutcome::Duplicate(id)),
            Ok(false) => {
                tracing::warn!("Digest {} collides with entry {} but bytes differ", digest, id);
                Ok(DedupOutcome::Collision(id))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Original for entry {} is missing at {:?}", id, original);
                Ok(DedupOutcome::Unverified(id))
            }
            Err(source) => Err(IngestError::Storage {
                stage: "dedup comparison",
                source,
            }),
        }
    }
}

/// Stream both files and compare them chunk by chunk.
pub fn files_identical(a: &Path, b: &Path) -> std::io::Result<bool> {
    let mut fa = File::open(a)?;
    let mut fb = File::open(b)?;
    if fa.metadata()?.len() != fb.metadata()?.len() {
        return Ok(false);
    }

    let mut buf_a = vec![0u8; COMPARE_CHUNK];
    let mut buf_b = vec![0u8; COMPARE_CHUNK];
    loop {
        let na = fill(&mut fa, &mut buf_a)?;
        let nb = fill(&mut fb, &mut buf_b)?;
        if na != nb || buf_a[..na] != buf_b[..nb] {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
    }
}

/// Read until `buf` is full or the reader is exhausted.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{BoardSet, PuritySet};
    use crate::pipeline::hash::Hasher;
    use crate::store::FeatureLayout;
    use crate::types::{Features, NewEntry, Rgb};

    fn setup() -> (tempfile::TempDir, Arc<CatalogStore>, FileLayout) {
        let dir = tempfile::tempdir().unwrap();
        let files = FileLayout::new(dir.path());
        files.ensure().unwrap();
        let store = CatalogStore::open_in_memory(FeatureLayout {
            palette_size: 1,
            grid_len: 1,
        })
        .unwrap();
        (dir, Arc::new(store), files)
    }

    fn insert(store: &CatalogStore, digest: Digest) -> EntryId {
        store
            .insert(&NewEntry {
                digest,
                width: 1,
                height: 1,
                mimetype: "image/png".into(),
                file_size: 3,
                boards: BoardSet::all(),
                purity: PuritySet::all(),
                features: Features {
                    average_color: Rgb::new(0, 0, 0),
                    palette: vec![Rgb::new(0, 0, 0)],
                    luminance: vec![0],
                },
                featured: false,
            })
            .unwrap()
    }

    #[test]
    fn test_unknown_digest_is_unique() {
        let (_dir, store, files) = setup();
        let upload = files.write_temp(b"abc").unwrap();
        let index = DedupIndex::new(store, files);
        let outcome = index
            .check(&Hasher::digest_bytes(b"abc"), upload.path())
            .unwrap();
        assert_eq!(outcome, DedupOutcome::Unique);
    }

    #[test]
    fn test_identical_bytes_are_duplicate() {
        let (_dir, store, files) = setup();
        let digest = Hasher::digest_bytes(b"abc");
        let id = insert(&store, digest.clone());
        std::fs::create_dir_all(files.original_path(id, "png").parent().unwrap()).unwrap();
        std::fs::write(files.original_path(id, "png"), b"abc").unwrap();

        let upload = files.write_temp(b"abc").unwrap();
        let index = DedupIndex::new(store, files);
        assert_eq!(
            index.check(&digest, upload.path()).unwrap(),
            DedupOutcome::Duplicate(id)
        );
    }

    #[test]
    fn test_same_digest_different_bytes_is_collision() {
        let (_dir, store, files) = setup();
        // Pretend "xyz" hashes like "abc".
        let digest = Hasher::digest_bytes(b"abc");
        let id = insert(&store, digest.clone());
        std::fs::create_dir_all(files.original_path(id, "png").parent().unwrap()).unwrap();
        std::fs::write(files.original_path(id, "png"), b"abc").unwrap();

        let upload = files.write_temp(b"xyz").unwrap();
        let index = DedupIndex::new(store, files);
        assert_eq!(
            index.check(&digest, upload.path()).unwrap(),
            DedupOutcome::Collision(id)
        );
    }

    #[test]
    fn test_missing_original_is_unverified() {
        let (_dir, store, files) = setup();
        let digest = Hasher::digest_bytes(b"abc");
        let id = insert(&store, digest.clone());
        let upload = files.write_temp(b"abc").unwrap();
        let index = DedupIndex::new(store, files);
        assert_eq!(
            index.check(&digest, upload.path()).unwrap(),
            DedupOutcome::Unverified(id)
        );
    }

    #[test]
    fn test_files_identical_multi_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let mut data = vec![7u8; COMPARE_CHUNK * 2 + 5];
        std::fs::write(&a, &data).unwrap();
        std::fs::write(&b, &data).unwrap();
        assert!(files_identical(&a, &b).unwrap());

        *data.last_mut().unwrap() = 8;
        std::fs::write(&b, &data).unwrap();
        assert!(!files_identical(&a, &b).unwrap());
    }
}
