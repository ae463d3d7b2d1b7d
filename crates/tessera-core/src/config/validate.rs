//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

const THUMBNAIL_FORMATS: &[&str] = &["jpeg", "png", "webp"];
const MIMETYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.parallel_workers must be > 0".into(),
            ));
        }
        if self.processing.supported_mimetypes.is_empty() {
            return Err(ConfigError::ValidationError(
                "processing.supported_mimetypes must not be empty".into(),
            ));
        }
        if let Some(unknown) = self
            .processing
            .supported_mimetypes
            .iter()
            .find(|m| !MIMETYPES.contains(&m.as_str()))
        {
            return Err(ConfigError::ValidationError(format!(
                "processing.supported_mimetypes: unsupported mimetype '{unknown}'"
            )));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.min_image_dimension == 0
            || self.limits.min_image_dimension > self.limits.max_image_dimension
        {
            return Err(ConfigError::ValidationError(
                "limits.min_image_dimension must be > 0 and <= limits.max_image_dimension".into(),
            ));
        }
        if self.features.palette_size == 0 {
            return Err(ConfigError::ValidationError(
                "features.palette_size must be > 0".into(),
            ));
        }
        if self.features.grid_size == 0 || self.features.grid_size > 64 {
            return Err(ConfigError::ValidationError(
                "features.grid_size must be between 1 and 64".into(),
            ));
        }
        if self.thumbnail.width == 0 || self.thumbnail.height == 0 {
            return Err(ConfigError::ValidationError(
                "thumbnail.width and thumbnail.height must be > 0".into(),
            ));
        }
        if !THUMBNAIL_FORMATS.contains(&self.thumbnail.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "thumbnail.format must be one of {THUMBNAIL_FORMATS:?}"
            )));
        }
        if self.thumbnail.quality == 0 || self.thumbnail.quality > 100 {
            return Err(ConfigError::ValidationError(
                "thumbnail.quality must be between 1 and 100".into(),
            ));
        }
        if self.search.page_sizes.is_empty() || self.search.page_sizes.contains(&0) {
            return Err(ConfigError::ValidationError(
                "search.page_sizes must be non-empty and positive".into(),
            ));
        }
        if !self
            .search
            .page_sizes
            .contains(&self.search.default_page_size)
        {
            return Err(ConfigError::ValidationError(
                "search.default_page_size must be one of search.page_sizes".into(),
            ));
        }
        if self.search.recent_window_days == 0 {
            return Err(ConfigError::ValidationError(
                "search.recent_window_days must be > 0".into(),
            ));
        }
        Ok(())
    }
}
