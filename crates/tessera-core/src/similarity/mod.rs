//! Visual similarity between catalog entries.
//!
//! Similarity is a pure function of two stored luminance grids:
//!
//! ```text
//! score(F, G) = 100 − 100 · mean(|F[i] − G[i]|) / 255
//! ```
//!
//! It is registered as the SQLite scalar function `luminance_similarity` so
//! ranking runs as a projection over stored grids, never re-decoding images.

mod cache;

pub use cache::{SimilarityCache, SimilarityKey};

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use serde::Serialize;

use crate::types::ScoredEntry;

/// SQL name of the registered scoring function.
pub const SQL_FUNCTION: &str = "luminance_similarity";

/// Similarity of two equal-length grids, in `[0, 100]`.
///
/// Returns `None` when the grids differ in length or are empty; the
/// positional comparison is meaningless then.
pub fn score(reference: &[u8], candidate: &[u8]) -> Option<f64> {
    if reference.is_empty() || reference.len() != candidate.len() {
        return None;
    }
    let total: u64 = reference
        .iter()
        .zip(candidate)
        .map(|(a, b)| u64::from(a.abs_diff(*b)))
        .sum();
    let max = reference.len() as u64 * 255;
    Some(100.0 - 100.0 * total as f64 / max as f64)
}

/// Register [`SQL_FUNCTION`] on a connection.
///
/// `luminance_similarity(a BLOB, b BLOB)` yields a REAL, or NULL when the
/// grids cannot be compared.
pub fn register_sql_function(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        SQL_FUNCTION,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a: Option<Vec<u8>> = ctx.get(0)?;
            let b: Option<Vec<u8>> = ctx.get(1)?;
            Ok(match (a, b) {
                (Some(a), Some(b)) => score(&a, &b),
                _ => None,
            })
        },
    )
}

/// One page of entries ranked by similarity to a reference entry.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarPage {
    /// Highest score first; the reference entry is never included
    pub entries: Vec<ScoredEntry>,

    /// Number of comparable entries across all pages
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl SimilarPage {
    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.total
    }
}
