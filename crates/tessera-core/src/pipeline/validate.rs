//! Upload validation before any hashing or decoding.

use image::ImageFormat;

use crate::config::{LimitsConfig, ProcessingConfig};
use crate::error::IngestError;

/// Image formats the catalog accepts, keyed by mimetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptedFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl AcceptedFormat {
    pub fn from_mimetype(mimetype: &str) -> Option<Self> {
        match mimetype.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn mimetype(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// File extension used for the stored original.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Gif => ImageFormat::Gif,
            Self::WebP => ImageFormat::WebP,
        }
    }

    /// Check the leading bytes against this format's signature.
    fn matches_header(self, header: &[u8]) -> bool {
        match self {
            // FF D8 FF
            Self::Jpeg => header.starts_with(&[0xFF, 0xD8, 0xFF]),
            // 89 50 4E 47
            Self::Png => header.starts_with(&[0x89, b'P', b'N', b'G']),
            // GIF87a / GIF89a
            Self::Gif => header.starts_with(b"GIF8"),
            // RIFF....WEBP
            Self::WebP => header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP",
        }
    }
}

/// Validates uploads against the allow-list and size limits.
pub struct Validator {
    limits: LimitsConfig,
    allowed: Vec<AcceptedFormat>,
}

impl Validator {
    /// Create a new validator from the processing allow-list and limits.
    pub fn new(processing: &ProcessingConfig, limits: LimitsConfig) -> Self {
        let allowed = processing
            .supported_mimetypes
            .iter()
            .filter_map(|m| AcceptedFormat::from_mimetype(m))
            .collect();
        Self { limits, allowed }
    }

    /// Perform the cheap checks that need no decoding.
    ///
    /// Checks:
    /// - The declared mimetype is on the allow-list
    /// - The payload is non-empty and within the size limit
    /// - The magic bytes match the declared mimetype
    pub fn validate(&self, bytes: &[u8], mimetype: &str) -> Result<AcceptedFormat, IngestError> {
        let format = AcceptedFormat::from_mimetype(mimetype)
            .filter(|f| self.allowed.contains(f))
            .ok_or_else(|| IngestError::Rejected {
                reason: format!("mimetype '{mimetype}' is not accepted"),
            })?;

        if bytes.is_empty() {
            return Err(IngestError::Rejected {
                reason: "upload is empty".to_string(),
            });
        }

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if bytes.len() as u64 > max_bytes {
            return Err(IngestError::Rejected {
                reason: format!(
                    "file too large ({}MB > {}MB)",
                    bytes.len() as u64 / (1024 * 1024),
                    self.limits.max_file_size_mb
                ),
            });
        }

        let header = &bytes[..bytes.len().min(12)];
        if !format.matches_header(header) {
            return Err(IngestError::Rejected {
                reason: format!("content does not look like {}", format.mimetype()),
            });
        }

        Ok(format)
    }
}
