//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root directory holding the database, originals, thumbnails and temp files
    pub data_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.tessera"),
        }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Maximum ingestions decoding/extracting/rendering at the same time
    pub parallel_workers: usize,

    /// Mimetypes accepted for upload
    pub supported_mimetypes: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            supported_mimetypes: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
            ],
        }
    }
}

/// Resource limits to protect against problematic uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum upload size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Minimum image dimension (width or height)
    pub min_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            max_image_dimension: 16384,
            min_image_dimension: 1,
        }
    }
}

/// Perceptual feature settings.
///
/// Changing either value alters the stored layout of every entry; run the
/// recompute maintenance pass afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Number of palette colours per entry
    pub palette_size: usize,

    /// Side length of the square luminance grid
    pub grid_size: u32,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            palette_size: 5,
            grid_size: 16,
        }
    }
}

impl FeaturesConfig {
    /// Number of samples in a luminance grid.
    pub fn grid_len(&self) -> usize {
        (self.grid_size as usize) * (self.grid_size as usize)
    }
}

/// Thumbnail rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Output format: "jpeg", "png" or "webp"
    pub format: String,

    /// JPEG quality (1-100)
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 300,
            height: 200,
            format: "jpeg".to_string(),
            quality: 85,
        }
    }
}

/// Ordering used for "relevancy" when the search has no free-text query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevancyFallback {
    /// Favorites added within `recent_window_days`
    RecentFavorites,
    /// All-time favorites counter
    Favorites,
    /// All-time views counter
    Views,
    /// Upload date
    Date,
}

/// Search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Allowed page sizes
    pub page_sizes: Vec<u32>,

    /// Page size used when the caller does not pick one
    pub default_page_size: u32,

    /// Relevancy ordering without a text query
    pub relevancy_fallback: RelevancyFallback,

    /// Window for the recent-favorites fallback
    pub recent_window_days: u32,

    /// Maximum length of a free-text query in characters
    pub max_query_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_sizes: vec![24, 32, 64],
            default_page_size: 24,
            relevancy_fallback: RelevancyFallback::RecentFavorites,
            recent_window_days: 7,
            max_query_len: 256,
        }
    }
}

/// Similarity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Pages held by a caller-owned similarity cache
    pub cache_capacity: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self { cache_capacity: 256 }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
