//! Mapping between `entries` rows and typed [`CatalogEntry`] values.
//!
//! Rows are read into [`EntryRow`] with raw SQLite types, then validated
//! field by field exactly once in [`EntryRow::into_entry`]. Nothing past
//! this module handles untyped row data.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::error::{StoreError, StoreResult};
use crate::flags::{BoardSet, PuritySet};
use crate::pipeline::validate::AcceptedFormat;
use crate::types::{CatalogEntry, Counters, Digest, EntryId, Features, Rgb};

/// Column list shared by every query that yields entries, in
/// [`EntryRow::from_row`] order. Expects the table aliased as `e`.
pub const ENTRY_COLUMNS: &str = "e.id, e.digest, e.width, e.height, e.mimetype, e.file_size, \
     e.board, e.purity, e.average_color, e.palette, e.luminance, e.views, e.favorites, \
     e.featured, e.created_at, e.updated_at";

/// Number of columns in [`ENTRY_COLUMNS`]; extra projected columns start here.
pub const ENTRY_COLUMN_COUNT: usize = 16;

/// Fixed feature lengths every stored entry must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLayout {
    pub palette_size: usize,
    pub grid_len: usize,
}

impl From<&crate::config::FeaturesConfig> for FeatureLayout {
    fn from(config: &crate::config::FeaturesConfig) -> Self {
        Self {
            palette_size: config.palette_size,
            grid_len: config.grid_len(),
        }
    }
}

/// An `entries` row as stored, before validation.
#[derive(Debug, Clone)]
pub struct EntryRow {
    pub id: i64,
    pub digest: String,
    pub width: i64,
    pub height: i64,
    pub mimetype: String,
    pub file_size: i64,
    pub board: i64,
    pub purity: i64,
    pub average_color: Vec<u8>,
    pub palette: Vec<u8>,
    pub luminance: Vec<u8>,
    pub views: i64,
    pub favorites: i64,
    pub featured: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EntryRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            digest: row.get(1)?,
            width: row.get(2)?,
            height: row.get(3)?,
            mimetype: row.get(4)?,
            file_size: row.get(5)?,
            board: row.get(6)?,
            purity: row.get(7)?,
            average_color: row.get(8)?,
            palette: row.get(9)?,
            luminance: row.get(10)?,
            views: row.get(11)?,
            favorites: row.get(12)?,
            featured: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    /// Validate every field and build the typed entry.
    pub fn into_entry(self, tags: Vec<String>, layout: FeatureLayout) -> StoreResult<CatalogEntry> {
        let id = self.id;
        let corrupt = |message: String| StoreError::CorruptRow { id, message };

        let digest = Digest::from_hex(&self.digest)
            .ok_or_else(|| corrupt(format!("invalid digest '{}'", self.digest)))?;
        let width = positive_u32(self.width).ok_or_else(|| corrupt(format!("invalid width {}", self.width)))?;
        let height =
            positive_u32(self.height).ok_or_else(|| corrupt(format!("invalid height {}", self.height)))?;
        let format = AcceptedFormat::from_mimetype(&self.mimetype)
            .ok_or_else(|| corrupt(format!("unknown mimetype '{}'", self.mimetype)))?;
        let file_size =
            u64::try_from(self.file_size).map_err(|_| corrupt(format!("invalid file size {}", self.file_size)))?;
        let boards = u8::try_from(self.board)
            .ok()
            .and_then(BoardSet::from_bits)
            .ok_or_else(|| corrupt(format!("invalid board mask {}", self.board)))?;
        let purity = u8::try_from(self.purity)
            .ok()
            .and_then(PuritySet::from_bits)
            .ok_or_else(|| corrupt(format!("invalid purity mask {}", self.purity)))?;

        let average_color = <[u8; 3]>::try_from(self.average_color.as_slice())
            .map(Rgb)
            .map_err(|_| corrupt(format!("average colour has {} bytes", self.average_color.len())))?;
        if self.palette.len() != layout.palette_size * 3 {
            return Err(corrupt(format!(
                "palette has {} bytes, expected {}",
                self.palette.len(),
                layout.palette_size * 3
            )));
        }
        let palette = decode_palette(&self.palette);
        if self.luminance.len() != layout.grid_len {
            return Err(corrupt(format!(
                "luminance grid has {} samples, expected {}",
                self.luminance.len(),
                layout.grid_len
            )));
        }

        let views = u64::try_from(self.views).map_err(|_| corrupt("negative view count".into()))?;
        let favorites =
            u64::try_from(self.favorites).map_err(|_| corrupt("negative favorite count".into()))?;
        let created_at = timestamp(self.created_at).ok_or_else(|| corrupt("invalid created_at".into()))?;
        let updated_at = timestamp(self.updated_at).ok_or_else(|| corrupt("invalid updated_at".into()))?;

        Ok(CatalogEntry {
            id: EntryId(id),
            digest,
            width,
            height,
            mimetype: format.mimetype().to_string(),
            file_size,
            boards,
            purity,
            features: Features {
                average_color,
                palette,
                luminance: self.luminance,
            },
            counters: Counters { views, favorites },
            featured: self.featured,
            tags,
            created_at,
            updated_at,
        })
    }
}

fn positive_u32(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v > 0)
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Flatten palette colours to `[r, g, b, r, g, b, ...]`.
pub fn encode_palette(palette: &[Rgb]) -> Vec<u8> {
    palette.iter().flat_map(|c| c.0).collect()
}

fn decode_palette(bytes: &[u8]) -> Vec<Rgb> {
    bytes
        .chunks_exact(3)
        .map(|c| Rgb::new(c[0], c[1], c[2]))
        .collect()
}
