//! On-disk layout for originals, thumbnails and in-flight uploads.
//!
//! ```text
//! <data_dir>/
//!   catalog.db
//!   originals/<id % 1000>/<id>.<ext>
//!   thumbnails/<id % 1000>/<id>.<ext>
//!   tmp/upload-*
//! ```
//!
//! Uploads live in `tmp/` as [`NamedTempFile`]s until the store insert
//! succeeds; dropping one removes it, which is the cleanup path for every
//! failed ingestion.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;

use crate::types::EntryId;

const TEMP_PREFIX: &str = "upload-";

/// Resolves and manages catalog file locations.
#[derive(Debug, Clone)]
pub struct FileLayout {
    root: PathBuf,
}

impl FileLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory skeleton if missing.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.originals_dir())?;
        std::fs::create_dir_all(self.thumbnails_dir())?;
        std::fs::create_dir_all(self.temp_dir())?;
        Ok(())
    }

    pub fn originals_dir(&self) -> PathBuf {
        self.root.join("originals")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.root.join("thumbnails")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn original_path(&self, id: EntryId, extension: &str) -> PathBuf {
        Self::sharded(&self.originals_dir(), id, extension)
    }

    pub fn thumbnail_path(&self, id: EntryId, extension: &str) -> PathBuf {
        Self::sharded(&self.thumbnails_dir(), id, extension)
    }

    fn sharded(dir: &Path, id: EntryId, extension: &str) -> PathBuf {
        dir.join(format!("{:03}", id.0.rem_euclid(1000)))
            .join(format!("{}.{}", id.0, extension))
    }

    /// Write bytes to a fresh temp file owned by the caller.
    pub fn write_temp(&self, bytes: &[u8]) -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(self.temp_dir())?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    }

    /// Move a temp file to its permanent location.
    pub fn persist(&self, file: NamedTempFile, destination: &Path) -> std::io::Result<()> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        file.persist(destination).map_err(|e| e.error)?;
        Ok(())
    }

    /// Remove a file, treating "already gone" as success.
    pub fn remove(path: &Path) -> std::io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Delete upload temp files older than `max_age`, left by crashed ingestions.
    ///
    /// Returns the number of files removed.
    pub fn sweep_temp(&self, max_age: Duration) -> std::io::Result<usize> {
        let dir = self.temp_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(TEMP_PREFIX) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= max_age {
                match Self::remove(&entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!("Failed to sweep {:?}: {}", entry.path(), e),
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_sharded_by_id() {
        let layout = FileLayout::new("/data");
        assert_eq!(
            layout.original_path(EntryId(12345), "png"),
            PathBuf::from("/data/originals/345/12345.png")
        );
        assert_eq!(
            layout.thumbnail_path(EntryId(7), "jpg"),
            PathBuf::from("/data/thumbnails/007/7.jpg")
        );
    }

    #[test]
    fn test_temp_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let layout = FileLayout::new(dir.path());
        layout.ensure().unwrap();

        let temp = layout.write_temp(b"pixels").unwrap();
        let path = temp.path().to_path_buf();
        assert!(path.exists());
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn test_persist_moves_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let layout = FileLayout::new(dir.path());
        layout.ensure().unwrap();

        let temp = layout.write_temp(b"pixels").unwrap();
        let temp_path = temp.path().to_path_buf();
        let dest = layout.original_path(EntryId(3), "png");
        layout.persist(temp, &dest).unwrap();

        assert!(!temp_path.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"pixels");
    }

    #[test]
    fn test_sweep_removes_only_upload_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = FileLayout::new(dir.path());
        layout.ensure().unwrap();

        let (_file, stale) = layout.write_temp(b"x").unwrap().keep().unwrap();
        let other = layout.temp_dir().join("keep-me");
        std::fs::write(&other, b"y").unwrap();

        let removed = layout.sweep_temp(Duration::ZERO).unwrap();
        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_remove_missing_is_ok() {
        assert!(FileLayout::remove(Path::new("/nonexistent/tessera/file")).is_ok());
    }
}
