//! Core data types for the Tessera catalog.
//!
//! A [`CatalogEntry`] is only ever produced by the store's row mapping layer,
//! which validates every field once. Code past that boundary can rely on the
//! fixed lengths of the palette and luminance grid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::flags::{BoardSet, PuritySet};

/// Identifier of a catalog entry (the store's row id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Lowercase `#rrggbb` form.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

/// Lowercase hex content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Length in hex characters of a BLAKE3 digest.
    pub const HEX_LEN: usize = 64;

    /// Wrap a hex string, validating length and alphabet.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == Self::HEX_LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex.to_string()))
    }

    /// Wrap hex produced by the hasher itself.
    pub(crate) fn from_trusted_hex(hex: String) -> Self {
        debug_assert_eq!(hex.len(), Self::HEX_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Perceptual descriptors derived once at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    /// Per-channel mean over all pixels, rounded
    pub average_color: Rgb,

    /// Exactly `palette_size` representative colours
    pub palette: Vec<Rgb>,

    /// Flattened `grid_size × grid_size` luminance samples in raster order
    pub luminance: Vec<u8>,
}

/// Popularity counters maintained by explicit store operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub views: u64,
    pub favorites: u64,
}

/// A validated catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: EntryId,

    /// BLAKE3 digest of the original bytes; immutable
    pub digest: Digest,

    pub width: u32,
    pub height: u32,

    /// Declared and verified mimetype (one of the allow-list)
    pub mimetype: String,

    /// Original file size in bytes
    pub file_size: u64,

    pub boards: BoardSet,
    pub purity: PuritySet,

    #[serde(flatten)]
    pub features: Features,

    pub counters: Counters,
    pub featured: bool,

    /// Attached tag names, sorted
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Width over height.
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Caller-supplied metadata for an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMetadata {
    pub boards: BoardSet,
    pub purity: PuritySet,

    /// Raw tag names; normalized before attaching
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub featured: bool,
}

impl Default for IngestMetadata {
    fn default() -> Self {
        Self {
            boards: BoardSet::only(crate::flags::Board::General),
            purity: PuritySet::only(crate::flags::Purity::Sfw),
            tags: Vec::new(),
            featured: false,
        }
    }
}

/// A fully derived upload ready to be inserted into the store.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub digest: Digest,
    pub width: u32,
    pub height: u32,
    pub mimetype: String,
    pub file_size: u64,
    pub boards: BoardSet,
    pub purity: PuritySet,
    pub features: Features,
    pub featured: bool,
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub entries: Vec<CatalogEntry>,

    /// Number of entries matching the filter across all pages
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl SearchPage {
    /// Number of pages needed to show `total` entries.
    pub fn last_page(&self) -> u32 {
        if self.total == 0 || self.page_size == 0 {
            return 1;
        }
        self.total.div_ceil(u64::from(self.page_size)) as u32
    }

    pub fn has_more(&self) -> bool {
        self.page < self.last_page()
    }
}

/// An entry paired with its similarity score against a reference entry.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredEntry {
    pub entry: CatalogEntry,

    /// In `[0, 100]`; 100 means identical luminance grids
    pub score: f64,
}

/// Outcome of a bulk feature recomputation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub updated: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_validation() {
        let hex = "a".repeat(64);
        assert!(Digest::from_hex(&hex).is_some());
        assert!(Digest::from_hex("abc").is_none());
        assert!(Digest::from_hex(&"A".repeat(64)).is_none());
        assert!(Digest::from_hex(&"g".repeat(64)).is_none());
    }

    #[test]
    fn test_rgb_hex() {
        assert_eq!(Rgb::new(255, 0, 16).to_hex(), "#ff0010");
    }

    #[test]
    fn test_search_page_math() {
        let page = SearchPage {
            entries: vec![],
            total: 50,
            page: 2,
            page_size: 24,
        };
        assert_eq!(page.last_page(), 3);
        assert!(page.has_more());

        let last = SearchPage { page: 3, ..page };
        assert!(!last.has_more());
    }
}
